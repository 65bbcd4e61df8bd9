use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::TaskError;
use super::ids::TaskId;
use super::state::TaskStatus;

/// Type tag of a task (`install`, `upgrade`, ...). Selects the handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskType(String);

impl TaskType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Request-time "create task" blob: type tag + type-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    #[serde(rename = "type")]
    pub task_type: TaskType,

    #[serde(default = "empty_object")]
    pub payload: serde_json::Value,
}

impl TaskMetadata {
    pub fn new(task_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            task_type: TaskType::new(task_type),
            payload,
        }
    }
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Persisted state of one queued operation.
///
/// Design:
/// - Stored as one element of the task document (see `JsonTaskStore`).
/// - Status changes go through [`TaskStatus::transition`], so an illegal
///   sequence is rejected before anything is written back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,

    #[serde(rename = "type")]
    pub task_type: TaskType,

    pub status: TaskStatus,

    #[serde(default = "empty_object")]
    pub payload: serde_json::Value,

    /// Output accumulated while the task ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Error message recorded when the task failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Package changes recorded by the installation log.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_log: Option<serde_json::Value>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    pub fn new(
        id: TaskId,
        task_type: TaskType,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            task_type,
            status: TaskStatus::Pending,
            payload,
            output: None,
            error: None,
            install_log: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    /// Mark as running.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), TaskError> {
        self.transition(TaskStatus::Running, now)?;
        self.started_at = Some(now);
        Ok(())
    }

    /// Mark as finished.
    pub fn finish(&mut self, now: DateTime<Utc>) -> Result<(), TaskError> {
        self.transition(TaskStatus::Finished, now)?;
        self.finished_at = Some(now);
        Ok(())
    }

    /// Mark as failed and keep the error message.
    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> Result<(), TaskError> {
        self.transition(TaskStatus::Failed, now)?;
        self.error = Some(error.into());
        self.finished_at = Some(now);
        Ok(())
    }

    pub fn append_output(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match &mut self.output {
            Some(output) => {
                if !output.is_empty() && !output.ends_with('\n') {
                    output.push('\n');
                }
                output.push_str(text);
            }
            None => self.output = Some(text.to_string()),
        }
    }

    fn transition(&mut self, next: TaskStatus, now: DateTime<Utc>) -> Result<(), TaskError> {
        self.status = self.status.transition(next)?;
        self.updated_at = now;
        Ok(())
    }
}
