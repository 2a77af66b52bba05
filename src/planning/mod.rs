//! Global path planning.
//!
//! This module provides:
//! - A fixed-size-class block pool for search nodes
//! - The 8-connected grid A* planner consuming it

mod astar;
mod pool;

pub use astar::{DIAG_COST, GridCell, GridPlanner, STEP_COST};
pub use pool::BlockPool;
