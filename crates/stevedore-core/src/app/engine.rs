//! Engine - 組み立て済みのタスクエンジン
//!
//! Entry point for callers: create tasks, read them back, and get the
//! executor (inside the `run-task` subprocess) or the runner (on the
//! enqueuing side).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use super::executor::TaskExecutor;
use super::runner::{LaunchSpec, TaskRunner};
use crate::domain::{ErrorKind, StoreError, TaskId, TaskMetadata, TaskRecord, TaskStatus};
use crate::ports::{Clock, IdGenerator, TaskStore};
use crate::typed::{RegistryError, TypedRegistry};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    #[error("task {id} has already been run (status {status})")]
    AlreadyRun { id: TaskId, status: TaskStatus },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::TaskNotFound(_) => ErrorKind::NotFound,
            EngineError::AlreadyRun { .. } => ErrorKind::Execution,
            EngineError::Store(e) => e.kind(),
            EngineError::Registry(RegistryError::InvalidPayload(e)) => e.kind(),
            EngineError::Registry(_) => ErrorKind::Configuration,
        }
    }
}

pub struct Engine {
    registry: Arc<TypedRegistry>,
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    home: PathBuf,
}

impl Engine {
    pub(crate) fn new(
        registry: Arc<TypedRegistry>,
        store: Arc<dyn TaskStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        home: PathBuf,
    ) -> Self {
        Self {
            registry,
            store,
            clock,
            ids,
            home,
        }
    }

    /// Create and persist a PENDING task.
    ///
    /// `Ok(None)` means no handler is registered for the tag and nothing was stored.
    pub fn create_task(&self, metadata: TaskMetadata) -> Result<Option<TaskRecord>, EngineError> {
        let Some(record) = self
            .registry
            .create(metadata, self.ids.as_ref(), self.clock.as_ref())?
        else {
            return Ok(None);
        };
        self.store.add(record.clone())?;
        info!(task_id = %record.id, task_type = %record.task_type, "task created");
        Ok(Some(record))
    }

    /// `Ok(None)` for an unknown id.
    pub fn get_task(&self, id: &TaskId) -> Result<Option<TaskRecord>, EngineError> {
        Ok(self.store.get_task(id)?)
    }

    pub fn ids(&self) -> Result<Vec<TaskId>, EngineError> {
        Ok(self.store.ids()?)
    }

    pub fn tasks(&self) -> Result<Vec<TaskRecord>, EngineError> {
        Ok(self.store.tasks()?)
    }

    pub fn registered_types(&self) -> Vec<String> {
        self.registry.registered_types()
    }

    pub fn executor(&self) -> TaskExecutor {
        TaskExecutor::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            self.home.clone(),
        )
    }

    /// Runner guarded by the run lock at `lock_path`.
    pub fn runner(&self, lock_path: impl Into<PathBuf>, launch: LaunchSpec) -> TaskRunner {
        TaskRunner::new(
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            lock_path.into(),
            launch,
        )
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub fn home(&self) -> &Path {
        &self.home
    }
}
