//! 20 Hz cooperative control loop.
//!
//! One tick: drain transport ingress into the snapshot hub, resolve the
//! robot pose, run one mission update, publish exactly one velocity
//! command. All planning completes inside the tick; the only suspension
//! points are the end-of-tick sleep and the bounded dwells the mission
//! requests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::config::NavConfig;
use crate::geometry::Velocity2D;
use crate::io::{InputHub, InputMessage, Output, SharedTransforms, Transport, TransformLookup};
use crate::mission::{MissionController, MissionStep, Throttle};

pub struct ControlLoop {
    config: NavConfig,
    transport: Box<dyn Transport>,
    transforms: SharedTransforms,
    hub: InputHub,
    mission: MissionController,
    running: Arc<AtomicBool>,
    recv_warn: Throttle,
    send_warn: Throttle,
}

impl ControlLoop {
    pub fn new(config: NavConfig, transport: Box<dyn Transport>, running: Arc<AtomicBool>) -> Self {
        let hub = InputHub::new(config.robot.max_linear, config.robot.footprint_pad);
        let mission = MissionController::new(config.clone());
        Self {
            transport,
            transforms: SharedTransforms::new(),
            hub,
            mission,
            config,
            running,
            recv_warn: Throttle::new(Duration::from_secs(1)),
            send_warn: Throttle::new(Duration::from_secs(1)),
        }
    }

    /// Run ticks until the shutdown flag clears.
    pub fn run(&mut self) {
        tracing::info!(
            "Control loop started at {:.0} Hz",
            self.config.control.control_hz
        );
        let period = Duration::from_secs_f64(self.config.period());

        while self.running.load(Ordering::Acquire) {
            let tick_start = Instant::now();

            let step = self.tick();
            if let Some(dwell) = step.dwell {
                std::thread::sleep(dwell);
            }

            let elapsed = tick_start.elapsed();
            if elapsed < period {
                std::thread::sleep(period - elapsed);
            }
        }

        // Leave the base stopped on the way out
        let _ = self.transport.send(&Output::CmdVel(Velocity2D::ZERO));
        tracing::info!("Control loop exited");
    }

    /// One control tick. Publishes its command before returning; the
    /// caller handles any requested dwell.
    pub fn tick(&mut self) -> MissionStep {
        self.drain_ingress();

        let mut snapshot = self.hub.take_snapshot();
        snapshot.robot_pose = self
            .transforms
            .lookup(&self.config.io.world_frame, &self.config.io.body_frame)
            .ok();

        let step = self.mission.update(&snapshot);
        self.publish(&step);
        step
    }

    /// Serialize pending middleware messages into the snapshot box.
    fn drain_ingress(&mut self) {
        loop {
            match self.transport.try_recv() {
                Ok(Some(InputMessage::Transform {
                    parent,
                    child,
                    pose,
                })) => self.transforms.update(parent, child, pose),
                Ok(Some(message)) => self.hub.apply(message),
                Ok(None) => break,
                Err(e) => {
                    if self.recv_warn.ready() {
                        tracing::warn!("Transport receive failed: {}", e);
                    }
                    break;
                }
            }
        }
    }

    fn publish(&mut self, step: &MissionStep) {
        if let Err(e) = self.transport.send(&Output::CmdVel(step.command)) {
            if self.send_warn.ready() {
                tracing::error!("Failed to publish command: {}", e);
            }
            return;
        }
        if step.finished {
            let _ = self.transport.send(&Output::Finished);
        }
        if step.stopped {
            let _ = self.transport.send(&Output::Stopped);
        }
        if self.config.io.publish_trajectories
            && let Some(decision) = &step.decision
        {
            let polylines = decision
                .candidates
                .iter()
                .map(|candidate| {
                    candidate
                        .trajectory
                        .states
                        .iter()
                        .map(|state| state.pose.position())
                        .collect()
                })
                .collect();
            let _ = self.transport.send(&Output::Trajectories(polylines));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Pose2D;
    use crate::io::MockTransport;

    fn transform_msg(config: &NavConfig, pose: Pose2D) -> InputMessage {
        InputMessage::Transform {
            parent: config.io.world_frame.clone(),
            child: config.io.body_frame.clone(),
            pose,
        }
    }

    #[test]
    fn test_tick_without_inputs_publishes_zero() {
        let config = NavConfig::default();
        let mock = MockTransport::new();
        let running = Arc::new(AtomicBool::new(true));
        let mut control = ControlLoop::new(config, Box::new(mock.clone()), running);

        control.tick();

        let sent = mock.sent();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            Output::CmdVel(cmd) => assert_eq!(*cmd, Velocity2D::ZERO),
            other => panic!("unexpected output: {:?}", other),
        }
    }

    #[test]
    fn test_tick_routes_messages_and_drives() {
        let config = NavConfig::default();
        let mock = MockTransport::new();
        let running = Arc::new(AtomicBool::new(true));

        mock.push_input(transform_msg(&config, Pose2D::default()));
        mock.push_input(InputMessage::Goal(Pose2D::new(5.0, 0.0, 0.0)));
        mock.push_input(InputMessage::Odometry(Velocity2D::ZERO));
        mock.push_input(InputMessage::LocalMap(
            crate::obstacles::LocalMap::filled(
                160,
                160,
                0.05,
                crate::geometry::Point2D::new(-4.0, -4.0),
                0,
            ),
        ));
        mock.push_input(InputMessage::Path(vec![
            Pose2D::default(),
            Pose2D::new(5.0, 0.0, 0.0),
        ]));

        let mut control = ControlLoop::new(config, Box::new(mock.clone()), running);
        control.tick();

        let sent = mock.sent();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            Output::CmdVel(cmd) => {
                assert!((cmd.linear - 0.125).abs() < 1e-9);
                assert!(cmd.angular.abs() < 1e-9);
            }
            other => panic!("unexpected output: {:?}", other),
        }
    }
}
