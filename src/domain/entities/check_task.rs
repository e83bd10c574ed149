use crate::domain::entities::monitored_product::MonitoredProduct;
use crate::domain::values::task_state::{FailureStage, TaskState};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Why a task ended in `FailedPermanently`.
#[derive(Debug, Clone, Serialize)]
pub struct TaskFailure {
    pub stage: FailureStage,
    pub cause: String,
    pub attempts: u32,
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} failed after {} attempt(s): {}",
            self.stage, self.attempts, self.cause
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Transition {
    pub state: TaskState,
    pub at: DateTime<Utc>,
}

/// Coordination record for one price check. Lives only for one run.
#[derive(Debug, Clone, Serialize)]
pub struct CheckTask {
    pub id: String,
    pub product: MonitoredProduct,
    pub state: TaskState,
    pub attempts: u32,
    pub failure: Option<TaskFailure>,
    pub history: Vec<Transition>,
}

impl CheckTask {
    pub fn new(product: MonitoredProduct) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            product,
            state: TaskState::Pending,
            attempts: 0,
            failure: None,
            history: vec![Transition {
                state: TaskState::Pending,
                at: Utc::now(),
            }],
        }
    }

    /// Applies a lifecycle transition. Illegal transitions are rejected and
    /// leave the task unchanged.
    pub fn transition(&mut self, next: TaskState) -> Result<(), String> {
        if !self.state.can_transition_to(next) {
            return Err(format!(
                "task {}: illegal transition {} -> {}",
                self.id, self.state, next
            ));
        }
        if next == TaskState::Running {
            self.attempts += 1;
        }
        self.state = next;
        self.history.push(Transition {
            state: next,
            at: Utc::now(),
        });
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
