//! Run lifecycle states
//!
//! A run moves `Idle → Running → Draining → Completed`; `Aborted` is reachable
//! from `Running` and `Draining` when a systemic failure ends the run early.
use serde::Serialize;
use std::fmt;

/// Lifecycle state of a whole crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Components built, no worker started
    Idle,

    /// Workers are claiming and processing tasks
    Running,

    /// No new work will be started; in-flight tasks are finishing
    Draining,

    /// Run finished normally and the final flush succeeded
    Completed,

    /// Run ended because of a systemic failure
    Aborted,
}

impl RunState {
    /// Returns true if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }

    /// Returns true if the transition `self -> to` is allowed
    pub fn can_transition_to(&self, to: RunState) -> bool {
        matches!(
            (self, to),
            (Self::Idle, Self::Running)
                | (Self::Running, Self::Draining)
                | (Self::Running, Self::Aborted)
                | (Self::Draining, Self::Completed)
                | (Self::Draining, Self::Aborted)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a run stopped taking new work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Nothing pending and nothing in flight
    FrontierExhausted,

    /// `max-pages` records were produced
    PageLimit,

    /// `run-timeout-seconds` elapsed
    RunTimeout,

    /// External stop signal (Ctrl-C)
    Interrupted,

    /// `max-consecutive-failures` fetches failed in a row
    FailureThreshold,

    /// The result sink could not persist records
    PersistenceFailure,
}

impl StopReason {
    /// Returns true if this reason ends the run as `Aborted`
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::FailureThreshold | Self::PersistenceFailure)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FrontierExhausted => "frontier_exhausted",
            Self::PageLimit => "page_limit",
            Self::RunTimeout => "run_timeout",
            Self::Interrupted => "interrupted",
            Self::FailureThreshold => "failure_threshold",
            Self::PersistenceFailure => "persistence_failure",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
