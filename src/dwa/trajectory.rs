//! Forward rollout of candidate velocity commands.

use serde::{Deserialize, Serialize};

use crate::geometry::{Pose2D, Velocity2D, normalize_angle};

/// Robot state at one instant of a rolled-out trajectory.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct MotionState {
    pub pose: Pose2D,
    pub velocity: Velocity2D,
}

/// A fixed-horizon forward rollout in the body frame.
///
/// Index 0 is the state one integration step after "now"; the trajectory
/// is owned by the planning tick that produced it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Trajectory {
    pub states: Vec<MotionState>,
}

impl Trajectory {
    /// Roll a unicycle model forward from the body origin at a constant
    /// command, integrating with explicit Euler (heading first).
    pub fn rollout(command: Velocity2D, steps: usize, horizon: f64) -> Self {
        let dt = horizon / steps.max(1) as f64;
        let mut pose = Pose2D::default();
        let mut states = Vec::with_capacity(steps);

        for _ in 0..steps {
            pose.theta = normalize_angle(pose.theta + command.angular * dt);
            pose.x += command.linear * pose.theta.cos() * dt;
            pose.y += command.linear * pose.theta.sin() * dt;
            states.push(MotionState {
                pose,
                velocity: command,
            });
        }

        Self { states }
    }

    /// Rollout of a pure rotation, used to screen a proposed in-place
    /// turn for collisions before commanding it.
    pub fn turn_in_place(angular: f64, steps: usize, horizon: f64) -> Self {
        Self::rollout(Velocity2D::new(0.0, angular), steps, horizon)
    }

    /// The stationary trajectory emitted when no candidate is admissible.
    pub fn halted() -> Self {
        Self { states: Vec::new() }
    }

    pub fn end(&self) -> Option<&MotionState> {
        self.states.last()
    }

    /// The command to emit: the velocity of the first state, or zero for
    /// the halted trajectory.
    pub fn first_command(&self) -> Velocity2D {
        self.states
            .first()
            .map(|s| s.velocity)
            .unwrap_or(Velocity2D::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_straight_rollout_advances_x() {
        let traj = Trajectory::rollout(Velocity2D::new(0.5, 0.0), 30, 3.0);

        assert_eq!(traj.states.len(), 30);
        let end = traj.end().unwrap();
        assert!((end.pose.x - 1.5).abs() < 1e-9);
        assert!(end.pose.y.abs() < 1e-9);
        assert!(end.pose.theta.abs() < 1e-9);
    }

    #[test]
    fn test_rollout_starts_one_step_out() {
        let traj = Trajectory::rollout(Velocity2D::new(0.3, 0.0), 30, 3.0);
        let first = &traj.states[0];
        // dt = 0.1, so the first state already moved
        assert!((first.pose.x - 0.03).abs() < 1e-9);
        assert_eq!(first.velocity.linear, 0.3);
    }

    #[test]
    fn test_turn_in_place_stays_at_origin() {
        let traj = Trajectory::turn_in_place(0.8, 30, 3.0);

        for state in &traj.states {
            assert!(state.pose.x.abs() < 1e-12);
            assert!(state.pose.y.abs() < 1e-12);
            assert_eq!(state.velocity.linear, 0.0);
        }
        let end = traj.end().unwrap();
        assert!((end.pose.theta - normalize_angle(0.8 * 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_curved_rollout_bends_left() {
        let traj = Trajectory::rollout(Velocity2D::new(0.5, 0.5), 30, 3.0);
        let end = traj.end().unwrap();

        assert!(end.pose.y > 0.1);
        assert!(end.pose.theta > 0.0 && end.pose.theta <= PI);
    }

    #[test]
    fn test_halted_trajectory_commands_zero() {
        let traj = Trajectory::halted();
        assert_eq!(traj.first_command(), Velocity2D::ZERO);
        assert!(traj.end().is_none());
    }
}
