use crate::domain::entities::check_task::{CheckTask, TaskFailure};
use crate::domain::values::task_state::{FailureStage, TaskState};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, error};

/// Live view of every check-task in one run.
///
/// A watchdog can poll [`snapshot`](Self::snapshot) or
/// [`outstanding`](Self::outstanding) while the run waits on its barrier;
/// [`TaskState::TERMINAL`] lists the states that count as done.
#[derive(Debug, Default)]
pub struct TaskBoard {
    run_id: String,
    tasks: Mutex<HashMap<String, CheckTask>>,
}

impl TaskBoard {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn insert(&self, task: CheckTask) {
        self.tasks.lock().insert(task.id.clone(), task);
    }

    pub fn transition(&self, task_id: &str, next: TaskState) {
        let mut tasks = self.tasks.lock();
        if let Some(task) = tasks.get_mut(task_id) {
            match task.transition(next) {
                Ok(()) => debug!(task_id, state = %next, attempts = task.attempts, "task transition"),
                Err(e) => error!("{e}"),
            }
        }
    }

    pub fn fail(&self, task_id: &str, failure: TaskFailure) {
        let mut tasks = self.tasks.lock();
        if let Some(task) = tasks.get_mut(task_id) {
            task.failure = Some(failure);
            if let Err(e) = task.transition(TaskState::FailedPermanently) {
                error!("{e}");
            }
        }
    }

    /// Fails a task that stopped without reaching a terminal state, walking
    /// the legal path to `FailedPermanently`. Terminal tasks are left alone.
    pub fn abandon(&self, task_id: &str, cause: &str) {
        let mut tasks = self.tasks.lock();
        let Some(task) = tasks.get_mut(task_id) else {
            return;
        };
        if task.is_terminal() {
            return;
        }
        let attempts = task.attempts;
        let stage = FailureStage::Fetch;
        let path: &[TaskState] = match task.state {
            TaskState::Pending | TaskState::Retrying => &[TaskState::Dispatched, TaskState::Running],
            TaskState::Dispatched => &[TaskState::Running],
            _ => &[],
        };
        for next in path.iter().copied().chain([TaskState::FailedPermanently]) {
            if let Err(e) = task.transition(next) {
                error!("{e}");
                return;
            }
        }
        // Walking through Running is bookkeeping, not another attempt.
        task.attempts = attempts;
        task.failure = Some(TaskFailure {
            stage,
            cause: cause.to_string(),
            attempts,
        });
        error!(task_id, %stage, attempts, "check task abandoned: {cause}");
    }

    pub fn get(&self, task_id: &str) -> Option<CheckTask> {
        self.tasks.lock().get(task_id).cloned()
    }

    pub fn snapshot(&self) -> Vec<CheckTask> {
        let mut tasks: Vec<CheckTask> = self.tasks.lock().values().cloned().collect();
        tasks.sort_by_key(|t| t.product.id);
        tasks
    }

    /// Tasks not yet in a terminal state.
    pub fn outstanding(&self) -> usize {
        self.tasks
            .lock()
            .values()
            .filter(|t| !t.is_terminal())
            .count()
    }

    pub fn count_in(&self, state: TaskState) -> usize {
        self.tasks
            .lock()
            .values()
            .filter(|t| t.state == state)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::monitored_product::MonitoredProduct;
    use crate::domain::values::ids::{RegionId, RetailerId, VariantId};

    fn task() -> CheckTask {
        CheckTask::new(MonitoredProduct {
            id: 7,
            url: "https://amazon.example/x".into(),
            variant_id: VariantId::parse("v1").unwrap(),
            retailer_id: Some(RetailerId::parse("amazon").unwrap()),
            region_id: RegionId::parse("r1").unwrap(),
        })
    }

    #[test]
    fn test_abandon_running_task_fails_it() {
        let board = TaskBoard::new("run");
        let t = task();
        let id = t.id.clone();
        board.insert(t);
        board.transition(&id, TaskState::Dispatched);
        board.transition(&id, TaskState::Running);

        board.abandon(&id, "worker panicked");
        let t = board.get(&id).unwrap();
        assert_eq!(t.state, TaskState::FailedPermanently);
        assert_eq!(t.attempts, 1);
        let failure = t.failure.unwrap();
        assert_eq!(failure.stage, FailureStage::Fetch);
        assert_eq!(failure.cause, "worker panicked");
        assert_eq!(board.outstanding(), 0);
    }

    #[test]
    fn test_abandon_walks_legal_path_from_retrying() {
        let board = TaskBoard::new("run");
        let t = task();
        let id = t.id.clone();
        board.insert(t);
        for next in [TaskState::Dispatched, TaskState::Running, TaskState::Retrying] {
            board.transition(&id, next);
        }

        board.abandon(&id, "aborted");
        let t = board.get(&id).unwrap();
        assert_eq!(t.state, TaskState::FailedPermanently);
        assert_eq!(t.attempts, 1);
        let states: Vec<TaskState> = t.history.iter().map(|h| h.state).collect();
        assert_eq!(
            &states[4..],
            &[TaskState::Dispatched, TaskState::Running, TaskState::FailedPermanently]
        );
    }

    #[test]
    fn test_abandon_leaves_terminal_task_alone() {
        let board = TaskBoard::new("run");
        let t = task();
        let id = t.id.clone();
        board.insert(t);
        for next in [TaskState::Dispatched, TaskState::Running, TaskState::Succeeded] {
            board.transition(&id, next);
        }

        board.abandon(&id, "late");
        let t = board.get(&id).unwrap();
        assert_eq!(t.state, TaskState::Succeeded);
        assert!(t.failure.is_none());
    }
}
