//! Errors - エラー型と分類
//!
//! Errors shared across layers live here. Layer-local errors (registry,
//! builder, lock, runner, config) are defined next to the code raising them
//! and report the same [`ErrorKind`] classification.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::ids::TaskId;
use super::state::TaskStatus;

/// ErrorKind は運用上の分類
///
/// - Configuration: 事前に検出されるべき設定エラー（オペレーターに通知、リトライ無意味）
/// - Busy: run lock が保持されている（呼び出し側が後でリトライ可能）
/// - Spawn: OS レベルでサブプロセス作成に失敗
/// - NotFound: 未知の task id
/// - Execution: タスク本体の失敗（タスクレコードに記録される）
/// - Storage: タスクストアの I/O / パース失敗
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Busy,
    Spawn,
    NotFound,
    Execution,
    Storage,
}

/// Failure of the package manager the tasks drive.
#[derive(Debug, Error)]
pub enum PackageManagerError {
    #[error("package manager binary '{0}' not found")]
    NotFound(String),

    #[error("failed to launch package manager: {0}")]
    Launch(#[source] std::io::Error),

    #[error("package manager exited with status {code:?}")]
    ExitStatus { code: Option<i32>, output: String },
}

impl PackageManagerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PackageManagerError::NotFound(_) => ErrorKind::Configuration,
            PackageManagerError::Launch(_) | PackageManagerError::ExitStatus { .. } => {
                ErrorKind::Execution
            }
        }
    }
}

/// Raised by an installation manager operation.
#[derive(Debug, Error)]
#[error("installation step failed for {package}: {message}")]
pub struct InstallationError {
    pub package: String,
    pub message: String,
}

/// Task-level error. Recorded on the task record, never thrown past `perform`.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("invalid payload for task type '{task_type}': {message}")]
    InvalidPayload { task_type: String, message: String },

    #[error("no handler registered for task type '{0}'")]
    UnknownType(String),

    #[error(transparent)]
    PackageManager(#[from] PackageManagerError),

    #[error(transparent)]
    Installation(#[from] InstallationError),

    #[error("{action} {path}: {source}")]
    Filesystem {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl TaskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskError::PackageManager(e) => e.kind(),
            _ => ErrorKind::Execution,
        }
    }

    /// Text written to the task record when the task fails.
    ///
    /// A failing package manager run keeps its captured output.
    pub fn record_message(&self) -> String {
        match self {
            TaskError::PackageManager(PackageManagerError::ExitStatus { output, .. })
                if !output.trim().is_empty() =>
            {
                format!("{self}\n{}", output.trim_end())
            }
            _ => self.to_string(),
        }
    }
}

/// TaskStore の操作エラー
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("task {0} already exists")]
    DuplicateId(TaskId),

    #[error("task store I/O failed on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("task store document {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("update rejected: {0}")]
    Rejected(#[from] TaskError),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::Rejected(e) => e.kind(),
            _ => ErrorKind::Storage,
        }
    }
}
