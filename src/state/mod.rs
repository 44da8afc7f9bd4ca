//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `RunState`: lifecycle of the whole run (idle, running, draining, completed, aborted)
//! - `StopReason`: why a run stopped taking new work
//! - `TaskOutcome`: what happened to a single claimed task

mod run_state;
mod task_outcome;

pub use run_state::{RunState, StopReason};
pub use task_outcome::TaskOutcome;
