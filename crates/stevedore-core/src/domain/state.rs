//! Task status state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::TaskError;

/// Lifecycle status of a task record.
///
/// State transitions:
/// - Pending -> Running -> Finished
/// - Pending -> Running -> Failed
///
/// Finished and Failed are terminal. A task runs at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Created, waiting for someone to run it.
    Pending,

    /// A task subprocess is performing it.
    Running,

    /// Completed successfully.
    Finished,

    /// Completed with an error (recorded on the task record).
    Failed,
}

impl TaskStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Finished | TaskStatus::Failed)
    }

    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Finished)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }

    /// Validate a transition and return the new state.
    pub fn transition(self, next: TaskStatus) -> Result<TaskStatus, TaskError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TaskError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Finished => "FINISHED",
            TaskStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TaskStatus::Pending, TaskStatus::Running, true)]
    #[case(TaskStatus::Running, TaskStatus::Finished, true)]
    #[case(TaskStatus::Running, TaskStatus::Failed, true)]
    #[case(TaskStatus::Pending, TaskStatus::Finished, false)]
    #[case(TaskStatus::Pending, TaskStatus::Failed, false)]
    #[case(TaskStatus::Running, TaskStatus::Pending, false)]
    #[case(TaskStatus::Finished, TaskStatus::Running, false)]
    #[case(TaskStatus::Failed, TaskStatus::Pending, false)]
    #[case(TaskStatus::Finished, TaskStatus::Failed, false)]
    fn transition_table(
        #[case] from: TaskStatus,
        #[case] to: TaskStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
        assert_eq!(from.transition(to).is_ok(), allowed);
    }

    #[test]
    fn terminal_states() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Finished.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }

    #[test]
    fn status_serializes_as_screaming_snake_case() {
        let s = serde_json::to_string(&TaskStatus::Finished).unwrap();
        assert_eq!(s, "\"FINISHED\"");
        assert_eq!(TaskStatus::Pending.to_string(), "PENDING");
    }
}
