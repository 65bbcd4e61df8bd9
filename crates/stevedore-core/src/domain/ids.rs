//! Domain identifiers.
//!
//! # ULID ベースの TaskId
//! Generated ids look like `task-01HV...` so that they sort by creation time
//! and can be produced by several processes without coordination.
//!
//! Ids read back from the store or passed on the command line are taken
//! verbatim. The only rules are: not empty, no whitespace, no path
//! separators (the id is part of the per-run log file name).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Identifier of a task record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

/// IdError は TaskId のパース失敗
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("task id must not be empty")]
    Empty,

    #[error("task id '{0}' contains whitespace or a path separator")]
    InvalidCharacter(String),
}

impl TaskId {
    /// Display で使うプレフィックス
    pub const PREFIX: &'static str = "task-";

    /// ULID から TaskId を作成
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(format!("{}{}", Self::PREFIX, ulid))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for TaskId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }
        if s.chars().any(|c| c.is_whitespace() || c == '/' || c == '\\') {
            return Err(IdError::InvalidCharacter(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for TaskId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
