use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a single check-task.
///
/// ```text
/// Pending -> Dispatched -> Running -> Succeeded
///                 ^           |  \--> FailedPermanently
///                 |           v
///                 +------ Retrying
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Dispatched,
    Running,
    Retrying,
    Succeeded,
    FailedPermanently,
}

impl TaskState {
    /// States from which no further automatic transition occurs.
    pub const TERMINAL: [TaskState; 2] = [TaskState::Succeeded, TaskState::FailedPermanently];

    pub fn is_terminal(self) -> bool {
        Self::TERMINAL.contains(&self)
    }

    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Pending, Dispatched)
                | (Dispatched, Running)
                | (Running, Succeeded)
                | (Running, Retrying)
                | (Running, FailedPermanently)
                | (Retrying, Dispatched)
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Dispatched => "dispatched",
            TaskState::Running => "running",
            TaskState::Retrying => "retrying",
            TaskState::Succeeded => "succeeded",
            TaskState::FailedPermanently => "failed_permanently",
        };
        f.write_str(s)
    }
}

/// Pipeline stage a failure was observed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    /// Monitored record could not be turned into a task.
    Ingest,
    /// No adapter for the product's retailer.
    Route,
    /// No proxy available.
    Proxy,
    /// Retailer page fetch or price extraction.
    Fetch,
    /// Sample append.
    Store,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureStage::Ingest => "ingest",
            FailureStage::Route => "route",
            FailureStage::Proxy => "proxy",
            FailureStage::Fetch => "fetch",
            FailureStage::Store => "store",
        };
        f.write_str(s)
    }
}
