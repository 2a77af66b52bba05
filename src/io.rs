//! I/O adapter normalizing the host middleware.
//!
//! Keeps the most recent of every input channel in a single-slot
//! snapshot box the control tick consumes atomically, abstracts the
//! message transport behind a trait, and resolves named coordinate
//! frames through an external transform service.

use std::collections::{HashMap, VecDeque};
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{NavError, Result};
use crate::geometry::{Point2D, Pose2D, Velocity2D};
use crate::obstacles::{LaserScan, LocalMap};

/// Messages arriving from the host middleware.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum InputMessage {
    /// New mission goal in the world frame; supersedes any in-flight goal
    Goal(Pose2D),
    /// Current command-frame twist from odometry
    Odometry(Velocity2D),
    /// Radial range snapshot
    Scan(LaserScan),
    /// Local occupancy grid
    LocalMap(LocalMap),
    /// Robot outline polygon in the body frame, unpadded
    Footprint(Vec<Point2D>),
    /// Reference path as world-frame poses
    Path(Vec<Pose2D>),
    /// Runtime cap on the linear velocity window
    TargetVelocity(f64),
    /// Runtime override of the goal arrival distance
    GoalDistThreshold(f64),
    /// Frame relation published by the transform service
    Transform {
        parent: String,
        child: String,
        pose: Pose2D,
    },
}

/// Messages emitted toward the host middleware.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Output {
    /// Exactly one per control tick
    CmdVel(Velocity2D),
    /// Mission finished; true for one tick
    Finished,
    /// Dwelling at a stop waypoint
    Stopped,
    /// Candidate rollouts for visualization, one polyline per sample
    Trajectories(Vec<Vec<Point2D>>),
}

/// Transport trait for middleware communication
pub trait Transport: Send {
    /// Pull the next pending input, if any, without blocking
    fn try_recv(&mut self) -> Result<Option<InputMessage>>;

    /// Publish an output message
    fn send(&mut self, output: &Output) -> Result<()>;
}

/// Newline-delimited JSON over TCP.
pub struct TcpJsonTransport {
    stream: TcpStream,
    buffer: Vec<u8>,
}

impl TcpJsonTransport {
    /// Connect with timeout and switch to non-blocking reads.
    pub fn connect(addr: &str, timeout: Duration) -> Result<Self> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| NavError::Config(format!("Invalid address: {}", e)))?;
        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;

        Ok(Self {
            stream,
            buffer: Vec::with_capacity(64 * 1024),
        })
    }
}

impl Transport for TcpJsonTransport {
    fn try_recv(&mut self) -> Result<Option<InputMessage>> {
        // Drain whatever the socket has before looking for a full line.
        let mut chunk = [0u8; 4096];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    return Err(NavError::Protocol("Connection closed by peer".into()));
                }
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => return Err(NavError::Connection(e)),
            }
        }

        let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') else {
            return Ok(None);
        };
        let line: Vec<u8> = self.buffer.drain(..=newline).collect();
        let message = serde_json::from_slice(&line[..line.len() - 1])?;
        Ok(Some(message))
    }

    fn send(&mut self, output: &Output) -> Result<()> {
        let mut encoded = serde_json::to_vec(output)?;
        encoded.push(b'\n');
        self.stream.write_all(&encoded)?;
        Ok(())
    }
}

/// In-memory transport for tests and embedding.
#[derive(Clone, Default)]
pub struct MockTransport {
    incoming: Arc<Mutex<VecDeque<InputMessage>>>,
    outgoing: Arc<Mutex<Vec<Output>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an input as if the middleware had published it.
    pub fn push_input(&self, message: InputMessage) {
        self.incoming.lock().unwrap().push_back(message);
    }

    /// Everything sent so far.
    pub fn sent(&self) -> Vec<Output> {
        self.outgoing.lock().unwrap().clone()
    }

    pub fn clear_sent(&self) {
        self.outgoing.lock().unwrap().clear();
    }
}

impl Transport for MockTransport {
    fn try_recv(&mut self) -> Result<Option<InputMessage>> {
        Ok(self.incoming.lock().unwrap().pop_front())
    }

    fn send(&mut self, output: &Output) -> Result<()> {
        self.outgoing.lock().unwrap().push(output.clone());
        Ok(())
    }
}

/// Named-frame pose lookup backed by an external transform service.
pub trait TransformLookup: Send {
    /// Pose of `child` expressed in `parent`. Errors mark this tick's
    /// inputs stale.
    fn lookup(&self, parent: &str, child: &str) -> Result<Pose2D>;
}

/// Transform store fed by `InputMessage::Transform` publications.
#[derive(Clone, Default)]
pub struct SharedTransforms {
    frames: Arc<Mutex<HashMap<(String, String), Pose2D>>>,
}

impl SharedTransforms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, parent: String, child: String, pose: Pose2D) {
        self.frames.lock().unwrap().insert((parent, child), pose);
    }
}

impl TransformLookup for SharedTransforms {
    fn lookup(&self, parent: &str, child: &str) -> Result<Pose2D> {
        self.frames
            .lock()
            .unwrap()
            .get(&(parent.to_string(), child.to_string()))
            .copied()
            .ok_or_else(|| NavError::Transform(format!("{} -> {}", parent, child)))
    }
}

/// One input channel value plus its freshness in ticks.
#[derive(Clone, Debug)]
pub struct Stamped<T> {
    pub value: Option<T>,
    pub age_ticks: u32,
}

impl<T> Default for Stamped<T> {
    fn default() -> Self {
        Self {
            value: None,
            age_ticks: 0,
        }
    }
}

impl<T> Stamped<T> {
    fn refresh(&mut self, value: T) {
        self.value = Some(value);
        self.age_ticks = 0;
    }

    fn age(&mut self) {
        self.age_ticks = self.age_ticks.saturating_add(1);
    }

    /// Present and refreshed within the staleness budget.
    pub fn fresh(&self, stale_ticks: u32) -> Option<&T> {
        if self.age_ticks <= stale_ticks {
            self.value.as_ref()
        } else {
            None
        }
    }
}

/// The inputs one control tick works from.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    /// World-frame robot pose from the transform service, this tick
    pub robot_pose: Option<Pose2D>,
    pub odometry: Stamped<Velocity2D>,
    pub scan: Stamped<LaserScan>,
    pub local_map: Stamped<LocalMap>,
    pub path: Stamped<Vec<Pose2D>>,
    /// Current goal and its supersession counter
    pub goal: Option<Pose2D>,
    pub goal_seq: u64,
    /// Padded footprint polygon, if one was published
    pub footprint: Option<Vec<Point2D>>,
    pub target_linear: Option<f64>,
    pub goal_dist_threshold: Option<f64>,
}

/// Single-slot box holding the most recent of every input.
///
/// Ingress may run on another thread; each tick clones a consistent
/// snapshot under the lock and then ages every channel by one tick.
pub struct InputHub {
    state: Mutex<Snapshot>,
    /// Clamp for the target-velocity override
    max_linear: f64,
    /// Outward padding applied to footprint vertices on receipt
    footprint_pad: f64,
}

impl InputHub {
    pub fn new(max_linear: f64, footprint_pad: f64) -> Self {
        Self {
            state: Mutex::new(Snapshot::default()),
            max_linear,
            footprint_pad,
        }
    }

    /// Fold one middleware message into the latest-value box.
    pub fn apply(&self, message: InputMessage) {
        let mut state = self.state.lock().unwrap();
        match message {
            InputMessage::Goal(goal) => {
                state.goal = Some(goal);
                state.goal_seq += 1;
            }
            InputMessage::Odometry(twist) => state.odometry.refresh(twist),
            InputMessage::Scan(scan) => state.scan.refresh(scan),
            InputMessage::LocalMap(map) => state.local_map.refresh(map),
            InputMessage::Footprint(vertices) => {
                let pad = self.footprint_pad;
                state.footprint = Some(
                    vertices
                        .iter()
                        .map(|v| Point2D::new(pad_outward(v.x, pad), pad_outward(v.y, pad)))
                        .collect(),
                );
            }
            InputMessage::Path(path) => state.path.refresh(path),
            InputMessage::TargetVelocity(v) => {
                state.target_linear = Some(v.min(self.max_linear));
            }
            InputMessage::GoalDistThreshold(d) => state.goal_dist_threshold = Some(d),
            InputMessage::Transform { .. } => {
                // Routed to the transform store before reaching the hub
            }
        }
    }

    /// Clone this tick's snapshot, then advance every freshness counter.
    pub fn take_snapshot(&self) -> Snapshot {
        let mut state = self.state.lock().unwrap();
        let snapshot = state.clone();
        state.odometry.age();
        state.scan.age();
        state.local_map.age();
        state.path.age();
        snapshot
    }
}

/// Pad a footprint coordinate outward, componentwise by sign.
fn pad_outward(value: f64, pad: f64) -> f64 {
    if value > 0.0 {
        value + pad
    } else if value < 0.0 {
        value - pad
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hub_keeps_latest_goal_and_counts_supersessions() {
        let hub = InputHub::new(0.8, 0.01);
        hub.apply(InputMessage::Goal(Pose2D::new(1.0, 0.0, 0.0)));
        hub.apply(InputMessage::Goal(Pose2D::new(2.0, 0.0, 0.0)));

        let snap = hub.take_snapshot();
        assert_eq!(snap.goal.unwrap().x, 2.0);
        assert_eq!(snap.goal_seq, 2);
    }

    #[test]
    fn test_hub_ages_channels_per_tick() {
        let hub = InputHub::new(0.8, 0.01);
        hub.apply(InputMessage::Odometry(Velocity2D::new(0.1, 0.0)));

        let first = hub.take_snapshot();
        assert_eq!(first.odometry.age_ticks, 0);
        assert!(first.odometry.fresh(10).is_some());

        for _ in 0..12 {
            hub.take_snapshot();
        }
        let late = hub.take_snapshot();
        assert!(late.odometry.fresh(10).is_none());

        // A fresh message resets the counter
        hub.apply(InputMessage::Odometry(Velocity2D::new(0.2, 0.0)));
        let refreshed = hub.take_snapshot();
        assert_eq!(refreshed.odometry.age_ticks, 0);
    }

    #[test]
    fn test_footprint_padded_on_receipt() {
        let hub = InputHub::new(0.8, 0.01);
        hub.apply(InputMessage::Footprint(vec![
            Point2D::new(0.3, 0.2),
            Point2D::new(-0.3, 0.2),
            Point2D::new(-0.3, -0.2),
            Point2D::new(0.3, -0.2),
        ]));

        let snap = hub.take_snapshot();
        let padded = snap.footprint.unwrap();
        assert!((padded[0].x - 0.31).abs() < 1e-12);
        assert!((padded[0].y - 0.21).abs() < 1e-12);
        assert!((padded[2].x + 0.31).abs() < 1e-12);
        assert!((padded[2].y + 0.21).abs() < 1e-12);
    }

    #[test]
    fn test_target_velocity_clamped() {
        let hub = InputHub::new(0.8, 0.01);
        hub.apply(InputMessage::TargetVelocity(2.0));
        assert_eq!(hub.take_snapshot().target_linear, Some(0.8));

        hub.apply(InputMessage::TargetVelocity(0.3));
        assert_eq!(hub.take_snapshot().target_linear, Some(0.3));
    }

    #[test]
    fn test_transform_store_lookup() {
        let transforms = SharedTransforms::new();
        assert!(transforms.lookup("map", "base_link").is_err());

        transforms.update("map".into(), "base_link".into(), Pose2D::new(1.0, 2.0, 0.5));
        let pose = transforms.lookup("map", "base_link").unwrap();
        assert_eq!(pose.x, 1.0);
        assert_eq!(pose.y, 2.0);
    }

    #[test]
    fn test_mock_transport_round_trip() {
        let mock = MockTransport::new();
        mock.push_input(InputMessage::Odometry(Velocity2D::new(0.1, 0.2)));

        let mut transport = mock.clone();
        let received = transport.try_recv().unwrap();
        assert!(matches!(received, Some(InputMessage::Odometry(_))));
        assert!(transport.try_recv().unwrap().is_none());

        transport.send(&Output::Finished).unwrap();
        assert_eq!(mock.sent().len(), 1);
    }

    #[test]
    fn test_wire_format_round_trips() {
        let message = InputMessage::Goal(Pose2D::new(1.5, -0.5, 0.2));
        let encoded = serde_json::to_string(&message).unwrap();
        let decoded: InputMessage = serde_json::from_str(&encoded).unwrap();
        match decoded {
            InputMessage::Goal(pose) => assert_eq!(pose.x, 1.5),
            other => panic!("unexpected message: {:?}", other),
        }

        let output = Output::CmdVel(Velocity2D::new(0.125, 0.0));
        let encoded = serde_json::to_string(&output).unwrap();
        assert!(encoded.contains("cmd_vel"));
    }
}
