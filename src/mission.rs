//! Mission state machine.
//!
//! Drives one control tick: gates on input freshness, tracks the active
//! goal through drive / in-place-turn / stop-dwell / final-orientation
//! phases, and delegates velocity selection to the dynamic-window
//! planner over obstacles extracted this tick.

use std::time::{Duration, Instant};

use crate::config::{NavConfig, WaypointAction};
use crate::dwa::{DwaConfig, DwaDecision, DwaPlanner, Footprint, Trajectory};
use crate::geometry::{Point2D, Pose2D, Velocity2D, normalize_angle};
use crate::io::Snapshot;
use crate::obstacles::ObstacleExtractor;
use crate::planning::{GridCell, GridPlanner};

/// Rate limiter for per-tick fault logging.
pub(crate) struct Throttle {
    last: Option<Instant>,
    interval: Duration,
}

impl Throttle {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            last: None,
            interval,
        }
    }

    /// True at most once per interval.
    pub(crate) fn ready(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// Phase of the active mission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissionState {
    /// Tracking the goal through the velocity planner
    Drive,
    /// Rotating in place toward the goal bearing
    TurnInPlace,
    /// Dwelling at a stop waypoint
    StopDwell,
    /// Rotating into the goal heading after arrival
    FinalOrient,
    /// Mission finished, waiting for the next goal
    Done,
}

/// Result of one mission tick.
#[derive(Clone, Debug)]
pub struct MissionStep {
    pub state: MissionState,
    /// Velocity command for this tick; exactly one per tick
    pub command: Velocity2D,
    /// True for the single tick the mission completes
    pub finished: bool,
    /// True when entering a stop-waypoint dwell
    pub stopped: bool,
    /// Bounded sleep the caller should honor after publishing
    pub dwell: Option<Duration>,
    /// Planner outcome when the tick ran the velocity planner
    pub decision: Option<DwaDecision>,
}

impl MissionStep {
    fn hold(state: MissionState) -> Self {
        Self {
            state,
            command: Velocity2D::ZERO,
            finished: false,
            stopped: false,
            dwell: None,
            decision: None,
        }
    }

    fn command(state: MissionState, command: Velocity2D) -> Self {
        Self {
            state,
            command,
            finished: false,
            stopped: false,
            dwell: None,
            decision: None,
        }
    }
}

/// Per-tick mission controller.
///
/// Owns only configuration, the planners, and short-lived tracking
/// state; everything else arrives in the tick's snapshot.
pub struct MissionController {
    config: NavConfig,
    dwa: DwaPlanner,
    grid_planner: GridPlanner,
    extractor: ObstacleExtractor,
    state: MissionState,
    /// Latched once the goal distance threshold is crossed
    reached: bool,
    /// Supersession counter of the goal currently being tracked
    active_goal_seq: Option<u64>,
    /// Next mission waypoint to cross
    next_stop: usize,
    gate_warn: Throttle,
    infeasible_warn: Throttle,
}

impl MissionController {
    pub fn new(config: NavConfig) -> Self {
        let dwa = DwaPlanner::new(dwa_config(&config));
        let extractor = ObstacleExtractor::new(config.sensing.angle_res);
        Self {
            config,
            dwa,
            grid_planner: GridPlanner::new(),
            extractor,
            state: MissionState::Drive,
            reached: false,
            active_goal_seq: None,
            next_stop: 0,
            gate_warn: Throttle::new(Duration::from_secs(1)),
            infeasible_warn: Throttle::new(Duration::from_secs(1)),
        }
    }

    pub fn state(&self) -> MissionState {
        self.state
    }

    /// Run one control tick against this tick's input snapshot.
    pub fn update(&mut self, snapshot: &Snapshot) -> MissionStep {
        let stale_ticks = self.config.control.stale_ticks;

        // A new goal supersedes whatever was in flight.
        if snapshot.goal.is_some() && self.active_goal_seq != Some(snapshot.goal_seq) {
            self.active_goal_seq = Some(snapshot.goal_seq);
            self.reached = false;
            self.next_stop = 0;
            self.state = MissionState::Drive;
            if let Some(goal) = snapshot.goal {
                tracing::info!(
                    "New goal ({:.2}, {:.2}, {:.1}°)",
                    goal.x,
                    goal.y,
                    goal.theta.to_degrees()
                );
            }
        }

        // Input gate: anything essential missing or stale holds the
        // robot in place without touching the state machine.
        let Some(robot_pose) = snapshot.robot_pose else {
            return self.gated("robot pose");
        };
        let Some(goal) = snapshot.goal else {
            return self.gated("goal");
        };
        let Some(&twist) = snapshot.odometry.fresh(stale_ticks) else {
            return self.gated("odometry");
        };
        let Some(footprint) = self.footprint(snapshot) else {
            return self.gated("footprint");
        };
        let obstacles = if self.config.sensing.use_scan_as_input {
            match snapshot.scan.fresh(stale_ticks) {
                Some(scan) => self.extractor.from_scan(scan),
                None => return self.gated("scan"),
            }
        } else {
            match snapshot.local_map.fresh(stale_ticks) {
                Some(map) => self.extractor.from_map(map),
                None => return self.gated("local map"),
            }
        };

        // Goal into the body frame
        let to_body = robot_pose.inverse();
        let body_goal = to_body.transform_point(goal.position());
        let goal_yaw_error = normalize_angle(goal.theta - robot_pose.theta);
        let distance = body_goal.norm();
        let bearing = body_goal.y.atan2(body_goal.x);

        let Some(path_edge) = self.resolve_path_edge(snapshot, &to_body, body_goal) else {
            return self.gated("reference path");
        };

        // Stop waypoints interleave with driving
        if self.config.stop_points.enabled
            && !self.reached
            && let Some(step) = self.cross_waypoints(&robot_pose)
        {
            return step;
        }

        let threshold = snapshot
            .goal_dist_threshold
            .unwrap_or(self.config.goal.dist_threshold);

        if distance > threshold && !self.reached {
            // Large bearing errors are cheaper to remove in place, if
            // the rotation itself is collision-free.
            if bearing.abs() > self.config.turn.angle_threshold {
                let angular = self.turn_rate(bearing);
                let screen = Trajectory::turn_in_place(
                    angular,
                    self.config.local_planner.n_sim,
                    self.config.local_planner.predict_time,
                );
                if !footprint.collides_along(&screen, &obstacles) {
                    self.state = MissionState::TurnInPlace;
                    return MissionStep::command(self.state, Velocity2D::new(0.0, angular));
                }
            }

            if let Some(target) = snapshot.target_linear {
                self.dwa.set_target_linear(target);
            }
            let decision = self
                .dwa
                .plan(twist, body_goal, &obstacles, &footprint, Some(path_edge));
            self.state = MissionState::Drive;

            if !decision.admissible {
                if self.infeasible_warn.ready() {
                    tracing::error!("No admissible command this tick, holding");
                }
                let mut step = MissionStep::hold(self.state);
                step.decision = Some(decision);
                return step;
            }

            let mut step = MissionStep::command(self.state, decision.command);
            step.decision = Some(decision);
            return step;
        }

        // Arrived: settle the final heading, then finish.
        self.reached = true;
        if goal_yaw_error.abs() > self.config.turn.final_yaw_threshold {
            self.state = MissionState::FinalOrient;
            return MissionStep::command(self.state, Velocity2D::new(0.0, self.turn_rate(goal_yaw_error)));
        }

        if self.state != MissionState::Done {
            self.state = MissionState::Done;
            tracing::info!("Goal reached");
            let mut step = MissionStep::hold(self.state);
            step.finished = true;
            step.dwell = Some(Duration::from_secs_f64(self.config.control.sleep_after_done));
            return step;
        }

        MissionStep::hold(self.state)
    }

    /// Hold in place because an essential input is missing or stale.
    fn gated(&mut self, reason: &str) -> MissionStep {
        if self.gate_warn.ready() {
            tracing::warn!("Inputs not ready ({}), holding", reason);
        }
        MissionStep::hold(self.state)
    }

    /// The collision outline for this tick.
    fn footprint(&self, snapshot: &Snapshot) -> Option<Footprint> {
        if self.config.robot.use_footprint {
            snapshot
                .footprint
                .as_ref()
                .filter(|vertices| vertices.len() >= 3)
                .map(|vertices| Footprint::from_polygon(vertices.clone()))
        } else {
            Some(Footprint::disk(
                self.config.robot.robot_radius + self.config.robot.footprint_pad,
            ))
        }
    }

    /// The body-frame line the path cost measures against: the fresh
    /// published path if one exists, otherwise a grid plan from the
    /// robot cell to the goal cell over the local map.
    fn resolve_path_edge(
        &mut self,
        snapshot: &Snapshot,
        to_body: &Pose2D,
        body_goal: Point2D,
    ) -> Option<(Point2D, Point2D)> {
        let stale_ticks = self.config.control.stale_ticks;

        if let Some(path) = snapshot.path.fresh(stale_ticks)
            && path.len() >= 2
        {
            let first = to_body.transform_point(path.first().unwrap().position());
            let last = to_body.transform_point(path.last().unwrap().position());
            return Some((first, last));
        }

        let map = snapshot.local_map.fresh(stale_ticks)?;
        let (sx, sy) = map.point_to_cell(Point2D::ZERO);
        let (ex, ey) = map.point_to_cell(body_goal);
        let start = GridCell::new(sx, sy);
        let end = GridCell::new(ex, ey);
        if start == end {
            return Some((Point2D::ZERO, body_goal));
        }

        let cells = self.grid_planner.find(
            map.width,
            map.height,
            |cell| !map.is_occupied(cell.x, cell.y),
            start,
            end,
            self.config.global_planner.allow_corner_cut,
        );
        let last = cells.last()?;
        Some((map.cell_to_point(sx, sy), map.cell_to_point(last.x, last.y)))
    }

    /// Advance past mission waypoints the robot has reached; a stop
    /// waypoint buys one dwell tick.
    fn cross_waypoints(&mut self, robot_pose: &Pose2D) -> Option<MissionStep> {
        let eps = self.config.stop_points.eps;
        let hold = self.config.stop_points.hold_secs;
        while self.next_stop < self.config.stop_points.waypoints.len() {
            let waypoint = self.config.stop_points.waypoints[self.next_stop];
            let distance = robot_pose
                .position()
                .distance(&Point2D::new(waypoint.x, waypoint.y));
            if distance > eps {
                return None;
            }
            self.next_stop += 1;
            if waypoint.action == WaypointAction::Stop {
                tracing::info!(
                    "Stop waypoint ({:.2}, {:.2}) reached, dwelling {:.1}s",
                    waypoint.x,
                    waypoint.y,
                    hold
                );
                self.state = MissionState::StopDwell;
                let mut step = MissionStep::hold(self.state);
                step.stopped = true;
                step.dwell = Some(Duration::from_secs_f64(hold));
                return Some(step);
            }
        }
        None
    }

    /// In-place turn rate for a heading error: clamped to the turn
    /// ceiling, floored to the minimum useful rate, in the error's sign.
    fn turn_rate(&self, angle: f64) -> f64 {
        let turn = &self.config.turn;
        let clamped = angle.clamp(-turn.inplace_max, turn.inplace_max);
        if clamped.abs() < turn.inplace_min {
            turn.inplace_min * angle.signum()
        } else {
            clamped
        }
    }
}

/// Map the crate configuration onto the velocity planner's own.
fn dwa_config(config: &NavConfig) -> DwaConfig {
    DwaConfig {
        min_linear: config.robot.min_linear,
        max_linear: config.robot.max_linear,
        max_angular: config.robot.max_angular,
        max_linear_accel: config.robot.max_linear_accel,
        max_angular_accel: config.robot.max_angular_accel,
        period: config.period(),
        predict_time: config.local_planner.predict_time,
        n_sim: config.local_planner.n_sim,
        n_linear: config.local_planner.n_linear,
        n_angular: config.local_planner.n_angular,
        slow_linear_threshold: config.local_planner.slow_linear_threshold,
        min_angular_magnitude: config.local_planner.min_angular_magnitude,
        obstacle_range: config.local_planner.obstacle_range,
        weight_obstacle: config.local_planner.weight_obstacle,
        weight_goal: config.local_planner.weight_goal,
        weight_speed: config.local_planner.weight_speed,
        weight_path: config.local_planner.weight_path,
        use_path_cost: config.local_planner.use_path_cost,
    }
}
