//! GatiNav - Motion planner for a differential-drive robot
//!
//! Connects to the host middleware, then runs the 20 Hz control loop:
//! goal tracking through the dynamic-window planner, grid re-planning
//! over the local map, in-place turns and stop-point dwells.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{error, info, warn};

use gati_nav::config::NavConfig;
use gati_nav::control::ControlLoop;
use gati_nav::error::{NavError, Result};
use gati_nav::io::TcpJsonTransport;

/// Fallback config file picked up from the working directory.
const DEFAULT_CONFIG_FILE: &str = "gati.toml";

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gati_nav=info".parse().unwrap()),
        )
        .init();

    let config = configure(std::env::args().skip(1))?;

    info!("GatiNav v{}", env!("CARGO_PKG_VERSION"));
    info!("Connecting to {}", config.address());

    let timeout = Duration::from_millis(config.connection.timeout_ms);
    let transport = TcpJsonTransport::connect(&config.address(), timeout)?;

    let running = Arc::new(AtomicBool::new(true));
    let loop_running = Arc::clone(&running);
    let loop_config = config.clone();

    let handle = std::thread::Builder::new()
        .name("control".into())
        .spawn(move || {
            let mut control = ControlLoop::new(loop_config, Box::new(transport), loop_running);
            control.run();
        })
        .expect("Failed to spawn control thread");

    // Main thread: monitor the control loop
    let check_interval = Duration::from_millis(500);
    loop {
        std::thread::sleep(check_interval);

        if handle.is_finished() {
            warn!("Control loop exited");
            break;
        }
    }

    running.store(false, Ordering::Release);
    if let Err(e) = handle.join() {
        error!("Control thread panicked: {:?}", e);
    }

    info!("GatiNav finished");
    Ok(())
}

/// Resolve the configuration from the command line.
///
/// Accepts one optional positional argument (a config file path) and
/// the overrides `--host <addr>` and `--port <n>`. Without a path, a
/// `gati.toml` in the working directory is used if present, otherwise
/// the built-in defaults.
fn configure<I>(mut args: I) -> Result<NavConfig>
where
    I: Iterator<Item = String>,
{
    let mut config_path: Option<PathBuf> = None;
    let mut host_override: Option<String> = None;
    let mut port_override: Option<String> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--host" => host_override = args.next(),
            "--port" => port_override = args.next(),
            flag if flag.starts_with("--") => {
                return Err(NavError::Config(format!("Unknown argument: {}", flag)));
            }
            path if config_path.is_none() => config_path = Some(PathBuf::from(path)),
            extra => {
                return Err(NavError::Config(format!(
                    "Unexpected positional argument: {}",
                    extra
                )));
            }
        }
    }

    let mut config = match config_path {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            NavConfig::load(&path)?
        }
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            info!("Loading configuration from {}", DEFAULT_CONFIG_FILE);
            NavConfig::load(Path::new(DEFAULT_CONFIG_FILE))?
        }
        None => {
            info!("Using default configuration");
            let config = NavConfig::default();
            config.validate()?;
            config
        }
    };

    if let Some(host) = host_override {
        info!("Middleware host override: {}", host);
        config.connection.host = host;
    }
    if let Some(port) = port_override {
        let port = port
            .parse::<u16>()
            .map_err(|e| NavError::Config(format!("Bad --port value {:?}: {}", port, e)))?;
        info!("Middleware port override: {}", port);
        config.connection.port = port;
    }

    Ok(config)
}
