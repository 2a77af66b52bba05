//! Dynamic Window Approach local planner.
//!
//! This module provides:
//! - Forward trajectory rollout for candidate commands
//! - Footprint collision and clearance tests
//! - The velocity-space sampling planner itself

mod footprint;
mod planner;
mod trajectory;

pub use footprint::Footprint;
pub use planner::{Candidate, Cost, DwaConfig, DwaDecision, DwaPlanner, DynamicWindow};
pub use trajectory::{MotionState, Trajectory};
