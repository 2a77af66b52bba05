//! Configuration loading for GatiNav

use crate::error::{NavError, Result};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Clone, Debug, Default, Deserialize)]
pub struct NavConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub robot: RobotConfig,
    #[serde(default)]
    pub local_planner: LocalPlannerConfig,
    #[serde(default)]
    pub global_planner: GlobalPlannerConfig,
    #[serde(default)]
    pub turn: TurnConfig,
    #[serde(default)]
    pub goal: GoalConfig,
    #[serde(default)]
    pub sensing: SensingConfig,
    #[serde(default)]
    pub stop_points: StopPointConfig,
    #[serde(default)]
    pub io: IoConfig,
}

/// Network connection settings
#[derive(Clone, Debug, Deserialize)]
pub struct ConnectionConfig {
    /// Host middleware address (default: 127.0.0.1)
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port number (default: 7601)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Connection timeout in milliseconds (default: 5000)
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

/// Control loop settings
#[derive(Clone, Debug, Deserialize)]
pub struct ControlConfig {
    /// Tick rate (Hz, default: 20)
    #[serde(default = "default_control_hz")]
    pub control_hz: f64,

    /// Ticks an input may go unrefreshed before it counts as stale
    #[serde(default = "default_stale_ticks")]
    pub stale_ticks: u32,

    /// Pause after reaching a goal before accepting the next (seconds)
    #[serde(default = "default_sleep_after_done")]
    pub sleep_after_done: f64,
}

/// Robot physical parameters and actuator limits
#[derive(Clone, Debug, Deserialize)]
pub struct RobotConfig {
    /// Minimum linear velocity (m/s)
    #[serde(default)]
    pub min_linear: f64,

    /// Maximum linear velocity (m/s, default: 0.8)
    #[serde(default = "default_max_linear")]
    pub max_linear: f64,

    /// Maximum angular velocity (rad/s, default: 1.0)
    #[serde(default = "default_max_angular")]
    pub max_angular: f64,

    /// Linear acceleration limit (m/s², default: 2.5)
    #[serde(default = "default_max_linear_accel")]
    pub max_linear_accel: f64,

    /// Angular acceleration limit (rad/s², default: 3.2)
    #[serde(default = "default_max_angular_accel")]
    pub max_angular_accel: f64,

    /// Robot radius for the disk footprint stand-in (m, default: 0.25)
    #[serde(default = "default_robot_radius")]
    pub robot_radius: f64,

    /// Outward padding applied to footprints on receipt (m, default: 0.01)
    #[serde(default = "default_footprint_pad")]
    pub footprint_pad: f64,

    /// Use the published polygon footprint instead of the disk
    #[serde(default)]
    pub use_footprint: bool,
}

/// Velocity-space planner settings
#[derive(Clone, Debug, Deserialize)]
pub struct LocalPlannerConfig {
    /// Rollout horizon (s, default: 3.0)
    #[serde(default = "default_predict_time")]
    pub predict_time: f64,

    /// States per rollout (default: 30)
    #[serde(default = "default_n_sim")]
    pub n_sim: usize,

    /// Linear velocity samples (default: 11)
    #[serde(default = "default_n_linear")]
    pub n_linear: usize,

    /// Angular velocity samples (default: 21)
    #[serde(default = "default_n_angular")]
    pub n_angular: usize,

    /// Below this speed, token turn rates are pushed outward (m/s)
    #[serde(default = "default_slow_linear_threshold")]
    pub slow_linear_threshold: f64,

    /// Smallest useful non-zero turn rate (rad/s)
    #[serde(default = "default_min_angular_magnitude")]
    pub min_angular_magnitude: f64,

    /// Clearance saturation for the obstacle cost (m, default: 3.5)
    #[serde(default = "default_obstacle_range")]
    pub obstacle_range: f64,

    #[serde(default = "default_weight_obstacle")]
    pub weight_obstacle: f64,

    #[serde(default = "default_weight_goal")]
    pub weight_goal: f64,

    #[serde(default = "default_weight_speed")]
    pub weight_speed: f64,

    #[serde(default = "default_weight_path")]
    pub weight_path: f64,

    /// Score endpoint distance to the reference path edge
    #[serde(default = "default_use_path_cost")]
    pub use_path_cost: bool,
}

/// Grid search settings
#[derive(Clone, Debug, Deserialize)]
pub struct GlobalPlannerConfig {
    /// Permit diagonal moves between two diagonally adjacent obstacles
    #[serde(default)]
    pub allow_corner_cut: bool,
}

/// In-place turn settings
#[derive(Clone, Debug, Deserialize)]
pub struct TurnConfig {
    /// Goal bearing beyond which the robot turns in place (rad)
    #[serde(default = "default_angle_threshold")]
    pub angle_threshold: f64,

    /// Fastest in-place turn rate (rad/s)
    #[serde(default = "default_inplace_max")]
    pub inplace_max: f64,

    /// Slowest commanded in-place turn rate (rad/s)
    #[serde(default = "default_inplace_min")]
    pub inplace_min: f64,

    /// Final heading error tolerated at the goal (rad)
    #[serde(default = "default_final_yaw_threshold")]
    pub final_yaw_threshold: f64,
}

/// Goal acceptance settings
#[derive(Clone, Debug, Deserialize)]
pub struct GoalConfig {
    /// Arrival distance (m, default: 0.1); overridable at runtime
    #[serde(default = "default_dist_threshold")]
    pub dist_threshold: f64,
}

/// Obstacle extraction settings
#[derive(Clone, Debug, Deserialize)]
pub struct SensingConfig {
    /// Build obstacles from the range scan instead of the local map
    #[serde(default)]
    pub use_scan_as_input: bool,

    /// Angular subsampling resolution (rad, default: 0.087 ≈ 5°)
    #[serde(default = "default_angle_res")]
    pub angle_res: f64,
}

/// Mission stop-point settings
#[derive(Clone, Debug, Default, Deserialize)]
pub struct StopPointConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Arrival distance at a stop waypoint (m)
    #[serde(default = "default_stop_eps")]
    pub eps: f64,

    /// Dwell duration at a stop waypoint (s)
    #[serde(default = "default_stop_hold")]
    pub hold_secs: f64,

    #[serde(default)]
    pub waypoints: Vec<StopWaypoint>,
}

/// A mission waypoint with its crossing behavior.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct StopWaypoint {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub action: WaypointAction,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WaypointAction {
    #[default]
    Drive,
    Stop,
}

/// Output channel settings
#[derive(Clone, Debug, Deserialize)]
pub struct IoConfig {
    /// Publish candidate and selected trajectories for visualization
    #[serde(default)]
    pub publish_trajectories: bool,

    /// Stable world frame name
    #[serde(default = "default_world_frame")]
    pub world_frame: String,

    /// Robot body frame name
    #[serde(default = "default_body_frame")]
    pub body_frame: String,
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    7601
}
fn default_timeout() -> u64 {
    5000
}
fn default_control_hz() -> f64 {
    20.0
}
fn default_stale_ticks() -> u32 {
    10
}
fn default_sleep_after_done() -> f64 {
    2.0
}
fn default_max_linear() -> f64 {
    0.8
}
fn default_max_angular() -> f64 {
    1.0
}
fn default_max_linear_accel() -> f64 {
    2.5
}
fn default_max_angular_accel() -> f64 {
    3.2
}
fn default_robot_radius() -> f64 {
    0.25
}
fn default_footprint_pad() -> f64 {
    0.01
}
fn default_predict_time() -> f64 {
    3.0
}
fn default_n_sim() -> usize {
    30
}
fn default_n_linear() -> usize {
    11
}
fn default_n_angular() -> usize {
    21
}
fn default_slow_linear_threshold() -> f64 {
    0.1
}
fn default_min_angular_magnitude() -> f64 {
    0.1
}
fn default_obstacle_range() -> f64 {
    3.5
}
fn default_weight_obstacle() -> f64 {
    1.0
}
fn default_weight_goal() -> f64 {
    0.8
}
fn default_weight_speed() -> f64 {
    0.4
}
fn default_weight_path() -> f64 {
    0.4
}
fn default_use_path_cost() -> bool {
    true
}
fn default_angle_threshold() -> f64 {
    0.8
}
fn default_inplace_max() -> f64 {
    0.8
}
fn default_inplace_min() -> f64 {
    0.1
}
fn default_final_yaw_threshold() -> f64 {
    0.1
}
fn default_dist_threshold() -> f64 {
    0.1
}
fn default_angle_res() -> f64 {
    0.087
}
fn default_stop_eps() -> f64 {
    0.1
}
fn default_stop_hold() -> f64 {
    10.0
}
fn default_world_frame() -> String {
    "map".to_string()
}
fn default_body_frame() -> String {
    "base_link".to_string()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_ms: default_timeout(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            control_hz: default_control_hz(),
            stale_ticks: default_stale_ticks(),
            sleep_after_done: default_sleep_after_done(),
        }
    }
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            min_linear: 0.0,
            max_linear: default_max_linear(),
            max_angular: default_max_angular(),
            max_linear_accel: default_max_linear_accel(),
            max_angular_accel: default_max_angular_accel(),
            robot_radius: default_robot_radius(),
            footprint_pad: default_footprint_pad(),
            use_footprint: false,
        }
    }
}

impl Default for LocalPlannerConfig {
    fn default() -> Self {
        Self {
            predict_time: default_predict_time(),
            n_sim: default_n_sim(),
            n_linear: default_n_linear(),
            n_angular: default_n_angular(),
            slow_linear_threshold: default_slow_linear_threshold(),
            min_angular_magnitude: default_min_angular_magnitude(),
            obstacle_range: default_obstacle_range(),
            weight_obstacle: default_weight_obstacle(),
            weight_goal: default_weight_goal(),
            weight_speed: default_weight_speed(),
            weight_path: default_weight_path(),
            use_path_cost: default_use_path_cost(),
        }
    }
}

impl Default for GlobalPlannerConfig {
    fn default() -> Self {
        Self {
            allow_corner_cut: false,
        }
    }
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            angle_threshold: default_angle_threshold(),
            inplace_max: default_inplace_max(),
            inplace_min: default_inplace_min(),
            final_yaw_threshold: default_final_yaw_threshold(),
        }
    }
}

impl Default for GoalConfig {
    fn default() -> Self {
        Self {
            dist_threshold: default_dist_threshold(),
        }
    }
}

impl Default for SensingConfig {
    fn default() -> Self {
        Self {
            use_scan_as_input: false,
            angle_res: default_angle_res(),
        }
    }
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            publish_trajectories: false,
            world_frame: default_world_frame(),
            body_frame: default_body_frame(),
        }
    }
}

impl NavConfig {
    /// Read, parse and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text),
            Err(e) => Err(NavError::Config(format!(
                "Cannot read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Parse configuration from TOML text, rejecting values the planner
    /// cannot run with.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: NavConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Middleware endpoint in `host:port` form.
    pub fn address(&self) -> String {
        let ConnectionConfig { host, port, .. } = &self.connection;
        format!("{}:{}", host, port)
    }

    /// Control tick period in seconds
    pub fn period(&self) -> f64 {
        1.0 / self.control.control_hz
    }

    /// Reject configurations the planner cannot run with.
    pub fn validate(&self) -> Result<()> {
        fn positive(name: &str, value: f64) -> Result<()> {
            if value > 0.0 {
                Ok(())
            } else {
                Err(NavError::Config(format!(
                    "{} must be positive, got {}",
                    name, value
                )))
            }
        }
        fn non_negative(name: &str, value: f64) -> Result<()> {
            if value >= 0.0 {
                Ok(())
            } else {
                Err(NavError::Config(format!(
                    "{} must not be negative, got {}",
                    name, value
                )))
            }
        }

        positive("control.control_hz", self.control.control_hz)?;
        non_negative("control.sleep_after_done", self.control.sleep_after_done)?;

        non_negative("robot.min_linear", self.robot.min_linear)?;
        positive("robot.max_linear", self.robot.max_linear)?;
        positive("robot.max_angular", self.robot.max_angular)?;
        positive("robot.max_linear_accel", self.robot.max_linear_accel)?;
        positive("robot.max_angular_accel", self.robot.max_angular_accel)?;
        positive("robot.robot_radius", self.robot.robot_radius)?;
        non_negative("robot.footprint_pad", self.robot.footprint_pad)?;
        if self.robot.min_linear > self.robot.max_linear {
            return Err(NavError::Config(
                "robot.min_linear exceeds robot.max_linear".to_string(),
            ));
        }

        if self.local_planner.n_sim == 0 {
            return Err(NavError::Config(
                "local_planner.n_sim must be at least 1".to_string(),
            ));
        }
        if self.local_planner.n_linear == 0 {
            return Err(NavError::Config(
                "local_planner.n_linear must be at least 1".to_string(),
            ));
        }
        if self.local_planner.n_angular == 0 {
            return Err(NavError::Config(
                "local_planner.n_angular must be at least 1".to_string(),
            ));
        }
        positive("local_planner.predict_time", self.local_planner.predict_time)?;
        positive("local_planner.obstacle_range", self.local_planner.obstacle_range)?;
        non_negative("local_planner.weight_obstacle", self.local_planner.weight_obstacle)?;
        non_negative("local_planner.weight_goal", self.local_planner.weight_goal)?;
        non_negative("local_planner.weight_speed", self.local_planner.weight_speed)?;
        non_negative("local_planner.weight_path", self.local_planner.weight_path)?;

        positive("turn.angle_threshold", self.turn.angle_threshold)?;
        positive("turn.inplace_max", self.turn.inplace_max)?;
        non_negative("turn.inplace_min", self.turn.inplace_min)?;
        positive("turn.final_yaw_threshold", self.turn.final_yaw_threshold)?;

        positive("goal.dist_threshold", self.goal.dist_threshold)?;
        positive("sensing.angle_res", self.sensing.angle_res)?;

        if self.stop_points.enabled {
            positive("stop_points.eps", self.stop_points.eps)?;
            non_negative("stop_points.hold_secs", self.stop_points.hold_secs)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = NavConfig::default();
        assert!(config.validate().is_ok());
        assert!((config.period() - 0.05).abs() < 1e-12);
        assert_eq!(config.address(), "127.0.0.1:7601");
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: NavConfig = toml::from_str(
            r#"
            [robot]
            max_linear = 0.5

            [local_planner]
            n_linear = 7
            "#,
        )
        .unwrap();

        assert_eq!(config.robot.max_linear, 0.5);
        assert_eq!(config.local_planner.n_linear, 7);
        assert_eq!(config.local_planner.n_angular, 21);
        assert_eq!(config.control.stale_ticks, 10);
    }

    #[test]
    fn test_zero_sample_count_is_rejected() {
        let config: NavConfig = toml::from_str(
            r#"
            [local_planner]
            n_angular = 0
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_limit_is_rejected() {
        let parsed = NavConfig::from_toml(
            r#"
            [robot]
            max_linear = -0.8
            "#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_stop_waypoints_parse() {
        let config: NavConfig = toml::from_str(
            r#"
            [stop_points]
            enabled = true

            [[stop_points.waypoints]]
            x = 1.0
            y = 0.0
            action = "stop"

            [[stop_points.waypoints]]
            x = 2.0
            y = 0.0
            action = "drive"
            "#,
        )
        .unwrap();

        assert!(config.stop_points.enabled);
        assert_eq!(config.stop_points.waypoints.len(), 2);
        assert_eq!(config.stop_points.waypoints[0].action, WaypointAction::Stop);
        assert_eq!(config.stop_points.waypoints[1].action, WaypointAction::Drive);
    }
}
