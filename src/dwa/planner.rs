//! Dynamic Window Approach velocity planner.
//!
//! Samples the (linear, angular) command rectangle reachable within one
//! control period, rolls each sample forward, scores the rollouts, and
//! picks the cheapest admissible one.

use std::f64::consts::FRAC_PI_4;

use crate::geometry::{Point2D, Velocity2D, point_to_line_distance};

use super::footprint::Footprint;
use super::trajectory::Trajectory;

/// Planner parameters. Defaults suit a ~0.5m wheelbase indoor robot.
#[derive(Clone, Debug)]
pub struct DwaConfig {
    /// Lowest commandable linear velocity (m/s)
    pub min_linear: f64,
    /// Actuator linear velocity limit (m/s)
    pub max_linear: f64,
    /// Actuator angular velocity limit (rad/s)
    pub max_angular: f64,
    /// Linear acceleration limit (m/s²)
    pub max_linear_accel: f64,
    /// Angular acceleration limit (rad/s²)
    pub max_angular_accel: f64,
    /// Control period over which the window opens (s)
    pub period: f64,
    /// Rollout horizon (s)
    pub predict_time: f64,
    /// States per rollout
    pub n_sim: usize,
    /// Linear velocity samples across the window
    pub n_linear: usize,
    /// Angular velocity samples across the window
    pub n_angular: usize,
    /// Below this linear speed, tiny turn rates are pushed outward
    pub slow_linear_threshold: f64,
    /// Smallest useful non-zero turn rate (rad/s)
    pub min_angular_magnitude: f64,
    /// Clearance saturation for the obstacle term (m)
    pub obstacle_range: f64,
    pub weight_obstacle: f64,
    pub weight_goal: f64,
    pub weight_speed: f64,
    pub weight_path: f64,
    /// Score distance to the reference path edge
    pub use_path_cost: bool,
}

impl Default for DwaConfig {
    fn default() -> Self {
        Self {
            min_linear: 0.0,
            max_linear: 0.8,
            max_angular: 1.0,
            max_linear_accel: 2.5,
            max_angular_accel: 3.2,
            period: 0.05,
            predict_time: 3.0,
            n_sim: 30,
            n_linear: 11,
            n_angular: 21,
            slow_linear_threshold: 0.1,
            min_angular_magnitude: 0.1,
            obstacle_range: 3.5,
            weight_obstacle: 1.0,
            weight_goal: 0.8,
            weight_speed: 0.4,
            weight_path: 0.4,
            use_path_cost: true,
        }
    }
}

/// Admissible command rectangle for one tick.
#[derive(Clone, Copy, Debug)]
pub struct DynamicWindow {
    pub min_linear: f64,
    pub max_linear: f64,
    pub min_angular: f64,
    pub max_angular: f64,
}

impl DynamicWindow {
    pub fn contains(&self, command: Velocity2D) -> bool {
        command.linear >= self.min_linear - 1e-12
            && command.linear <= self.max_linear + 1e-12
            && command.angular >= self.min_angular - 1e-12
            && command.angular <= self.max_angular + 1e-12
    }
}

/// Per-sample cost terms. `obstacle` is infinite for colliding rollouts;
/// the terms are overwritten with their normalized values before `total`
/// is assigned.
#[derive(Clone, Copy, Debug, Default)]
pub struct Cost {
    pub obstacle: f64,
    pub goal: f64,
    pub speed: f64,
    pub path: f64,
    pub total: f64,
}

/// One evaluated velocity sample, kept for visualization.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub command: Velocity2D,
    pub trajectory: Trajectory,
    pub cost: Cost,
}

/// Outcome of one planning tick.
#[derive(Clone, Debug)]
pub struct DwaDecision {
    /// Command to emit: the first rollout state's velocity, or zero when
    /// nothing was admissible
    pub command: Velocity2D,
    pub trajectory: Trajectory,
    /// False when every sample collided
    pub admissible: bool,
    pub window: DynamicWindow,
    pub candidates: Vec<Candidate>,
}

pub struct DwaPlanner {
    config: DwaConfig,
    /// Runtime cap on the linear window, ≤ `config.max_linear`
    target_linear: f64,
    /// One-tick mode preferring slower samples, set when the goal
    /// bearing exceeds π/4 at the tick boundary
    prefer_slow: bool,
}

impl DwaPlanner {
    pub fn new(config: DwaConfig) -> Self {
        let target_linear = config.max_linear;
        Self {
            config,
            target_linear,
            prefer_slow: false,
        }
    }

    /// Cap the linear window. Values above the actuator limit are
    /// clamped; values below `min_linear` collapse the window.
    pub fn set_target_linear(&mut self, target: f64) {
        self.target_linear = target.min(self.config.max_linear);
    }

    /// The command rectangle reachable from `current` within one period.
    pub fn window(&self, current: Velocity2D) -> DynamicWindow {
        let cfg = &self.config;
        let reach_linear = cfg.max_linear_accel * cfg.period;
        let reach_angular = cfg.max_angular_accel * cfg.period;

        let min_linear = (current.linear - reach_linear).max(cfg.min_linear);
        let max_linear = (current.linear + reach_linear)
            .min(self.target_linear)
            .max(min_linear);

        DynamicWindow {
            min_linear,
            max_linear,
            min_angular: (current.angular - reach_angular).max(-cfg.max_angular),
            max_angular: (current.angular + reach_angular).min(cfg.max_angular),
        }
    }

    /// Evaluate the window and pick the cheapest admissible command.
    ///
    /// `goal`, `obstacles` and `path_edge` are all body-frame; the
    /// obstacle list must be the one built this tick.
    pub fn plan(
        &mut self,
        current: Velocity2D,
        goal: Point2D,
        obstacles: &[Point2D],
        footprint: &Footprint,
        path_edge: Option<(Point2D, Point2D)>,
    ) -> DwaDecision {
        let bearing = goal.y.atan2(goal.x);
        self.prefer_slow = bearing.abs() > FRAC_PI_4;

        let window = self.window(current);
        let n_linear = self.config.n_linear.max(1);
        let n_angular = self.config.n_angular.max(1);
        let linear_step = ((window.max_linear - window.min_linear)
            / n_linear.saturating_sub(1).max(1) as f64)
            .max(f64::EPSILON);
        let angular_step = ((window.max_angular - window.min_angular)
            / n_angular.saturating_sub(1).max(1) as f64)
            .max(f64::EPSILON);

        let mut candidates = Vec::with_capacity(n_linear * (n_angular + 1));
        for i in 0..n_linear {
            let linear = (window.min_linear + i as f64 * linear_step).min(window.max_linear);
            for j in 0..n_angular {
                let raw = (window.min_angular + j as f64 * angular_step).min(window.max_angular);
                let angular = self.spread_slow_turn(linear, raw, &window);
                candidates.push(self.evaluate(
                    Velocity2D::new(linear, angular),
                    &window,
                    goal,
                    obstacles,
                    footprint,
                    path_edge,
                ));
            }
            // "Drive straight" is always a candidate when the angular
            // window straddles zero.
            if window.min_angular < 0.0 && window.max_angular > 0.0 {
                candidates.push(self.evaluate(
                    Velocity2D::new(linear, 0.0),
                    &window,
                    goal,
                    obstacles,
                    footprint,
                    path_edge,
                ));
            }
        }

        let speed_enabled = self.prefer_slow;
        let path_enabled = self.config.use_path_cost && path_edge.is_some();
        normalize_costs(&mut candidates, speed_enabled, path_enabled);

        for candidate in candidates.iter_mut() {
            let cost = &mut candidate.cost;
            if !cost.obstacle.is_finite() {
                cost.total = f64::INFINITY;
                continue;
            }
            cost.total = self.config.weight_obstacle * cost.obstacle
                + self.config.weight_goal * cost.goal
                + if speed_enabled {
                    self.config.weight_speed * cost.speed
                } else {
                    0.0
                }
                + if path_enabled {
                    self.config.weight_path * cost.path
                } else {
                    0.0
                };
        }

        // Strict comparison keeps the earliest sample on ties
        let mut best: Option<usize> = None;
        for (i, candidate) in candidates.iter().enumerate() {
            if !candidate.cost.obstacle.is_finite() {
                continue;
            }
            if best.map_or(true, |b: usize| candidate.cost.total < candidates[b].cost.total) {
                best = Some(i);
            }
        }

        self.prefer_slow = false;

        match best {
            Some(i) => DwaDecision {
                command: candidates[i].trajectory.first_command(),
                trajectory: candidates[i].trajectory.clone(),
                admissible: true,
                window,
                candidates,
            },
            None => DwaDecision {
                command: Velocity2D::ZERO,
                trajectory: Trajectory::halted(),
                admissible: false,
                window,
                candidates,
            },
        }
    }

    /// At crawl speeds a near-zero turn rate accomplishes nothing; push
    /// non-zero samples outward to the minimum useful rate, staying
    /// inside the window.
    fn spread_slow_turn(&self, linear: f64, angular: f64, window: &DynamicWindow) -> f64 {
        if linear < self.config.slow_linear_threshold
            && angular != 0.0
            && angular.abs() < self.config.min_angular_magnitude
        {
            (self.config.min_angular_magnitude * angular.signum())
                .clamp(window.min_angular, window.max_angular)
        } else {
            angular
        }
    }

    fn evaluate(
        &self,
        command: Velocity2D,
        window: &DynamicWindow,
        goal: Point2D,
        obstacles: &[Point2D],
        footprint: &Footprint,
        path_edge: Option<(Point2D, Point2D)>,
    ) -> Candidate {
        let trajectory =
            Trajectory::rollout(command, self.config.n_sim, self.config.predict_time);

        let mut min_clearance = self.config.obstacle_range;
        let mut collided = false;
        'states: for state in &trajectory.states {
            for &obstacle in obstacles {
                if footprint.contains(&state.pose, obstacle) {
                    collided = true;
                    break 'states;
                }
                let clearance = footprint
                    .clearance(&state.pose, obstacle)
                    .clamp(0.0, self.config.obstacle_range);
                if clearance < min_clearance {
                    min_clearance = clearance;
                }
            }
        }

        let obstacle = if collided {
            f64::INFINITY
        } else {
            self.config.obstacle_range - min_clearance
        };

        let endpoint = trajectory
            .end()
            .map(|s| s.pose.position())
            .unwrap_or(Point2D::ZERO);
        let goal_cost = endpoint.distance(&goal);

        let speed = if self.prefer_slow {
            window.max_linear - command.linear
        } else {
            0.0
        };

        let path = match (self.config.use_path_cost, path_edge) {
            (true, Some((a, b))) => point_to_line_distance(endpoint, a, b),
            _ => 0.0,
        };

        Candidate {
            command,
            trajectory,
            cost: Cost {
                obstacle,
                goal: goal_cost,
                speed,
                path,
                total: 0.0,
            },
        }
    }
}

/// Min–max normalize each enabled cost term to [0, 1] across the
/// feasible samples, in place. Infeasible samples are left untouched and
/// take no part in the statistics.
fn normalize_costs(candidates: &mut [Candidate], speed_enabled: bool, path_enabled: bool) {
    fn normalize_term(
        candidates: &mut [Candidate],
        get: fn(&Cost) -> f64,
        set: fn(&mut Cost, f64),
    ) {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for candidate in candidates.iter() {
            if !candidate.cost.obstacle.is_finite() {
                continue;
            }
            let value = get(&candidate.cost);
            min = min.min(value);
            max = max.max(value);
        }
        if !min.is_finite() {
            return;
        }
        for candidate in candidates.iter_mut() {
            if !candidate.cost.obstacle.is_finite() {
                continue;
            }
            let value = get(&candidate.cost);
            set(&mut candidate.cost, (value - min) / (max - min + f64::EPSILON));
        }
    }

    normalize_term(candidates, |c| c.obstacle, |c, v| c.obstacle = v);
    normalize_term(candidates, |c| c.goal, |c, v| c.goal = v);
    if speed_enabled {
        normalize_term(candidates, |c| c.speed, |c, v| c.speed = v);
    }
    if path_enabled {
        normalize_term(candidates, |c| c.path, |c, v| c.path = v);
    }
}
