//! Task and execution state machines.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a task.
///
/// State transitions:
/// - Submitted -> Running (claim)
/// - Running -> Succeeded
/// - Running -> Failed -> Running (claim again while attempts remain)
/// - Submitted | Failed -> Cancelled (fenced cancel while attempts remain)
///
/// Failed is only a resting state: it becomes terminal in practice once the
/// retry budget is spent, which is tracked on the task, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Submitted,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskState {
    /// No execution can ever be created again, whatever the budget says.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Cancelled)
    }
}

/// State of a single execution attempt.
///
/// Created -> Succeeded, or Created -> Failed. Exactly one transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    Created,
    Succeeded,
    Failed,
}

impl ExecutionState {
    pub fn is_finished(self) -> bool {
        !matches!(self, ExecutionState::Created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::submitted(TaskState::Submitted, false)]
    #[case::running(TaskState::Running, false)]
    #[case::failed(TaskState::Failed, false)]
    #[case::succeeded(TaskState::Succeeded, true)]
    #[case::cancelled(TaskState::Cancelled, true)]
    fn terminal_states(#[case] state: TaskState, #[case] terminal: bool) {
        assert_eq!(state.is_terminal(), terminal);
    }

    #[test]
    fn states_serialize_as_screaming_snake_case() {
        let s = serde_json::to_string(&TaskState::Cancelled).unwrap();
        assert_eq!(s, "\"CANCELLED\"");

        let s = serde_json::to_string(&ExecutionState::Created).unwrap();
        assert_eq!(s, "\"CREATED\"");
    }

    #[test]
    fn only_created_execution_is_unfinished() {
        assert!(!ExecutionState::Created.is_finished());
        assert!(ExecutionState::Succeeded.is_finished());
        assert!(ExecutionState::Failed.is_finished());
    }
}
