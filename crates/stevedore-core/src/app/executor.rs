//! TaskExecutor - 1 タスクの実行 (`perform`)
//!
//! # フロー
//! 1. TaskStore から record を取得（未知の id → TaskNotFound、store は変更しない）
//! 2. PENDING 以外 → AlreadyRun（再実行は呼び出し側のエラー）
//! 3. RUNNING を永続化
//! 4. Handler 実行
//! 5. FINISHED（output, install_log）または FAILED（エラーメッセージ）を永続化
//!
//! Task-level errors end up on the record; only infrastructure errors
//! (lookup, store I/O) are returned.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use super::engine::EngineError;
use crate::domain::{StoreError, TaskError, TaskId, TaskRecord, TaskStatus};
use crate::ports::{Clock, TaskStore};
use crate::typed::{TaskContext, TaskOutput, TypedRegistry};

pub struct TaskExecutor {
    registry: Arc<TypedRegistry>,
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    home: PathBuf,
}

impl TaskExecutor {
    pub(crate) fn new(
        registry: Arc<TypedRegistry>,
        store: Arc<dyn TaskStore>,
        clock: Arc<dyn Clock>,
        home: PathBuf,
    ) -> Self {
        Self {
            registry,
            store,
            clock,
            home,
        }
    }

    /// Run a PENDING task to completion and return the final record.
    pub async fn perform(&self, id: &TaskId) -> Result<TaskRecord, EngineError> {
        let Some(record) = self.store.get_task(id)? else {
            return Err(EngineError::TaskNotFound(id.clone()));
        };
        if record.status != TaskStatus::Pending {
            return Err(EngineError::AlreadyRun {
                id: id.clone(),
                status: record.status,
            });
        }

        let now = self.clock.now();
        let record = match self.store.update(id, &mut |r| r.start(now)) {
            Ok(record) => record,
            // another process started it between our read and the update
            Err(StoreError::Rejected(TaskError::InvalidTransition { from, .. })) => {
                return Err(EngineError::AlreadyRun {
                    id: id.clone(),
                    status: from,
                });
            }
            Err(StoreError::NotFound(id)) => return Err(EngineError::TaskNotFound(id)),
            Err(e) => return Err(e.into()),
        };
        info!(task_id = %id, task_type = %record.task_type, status = %record.status, "task started");

        match self.run_handler(&record).await {
            Ok(output) => self.finish(id, output),
            Err(err) => self.fail(id, &err),
        }
    }

    async fn run_handler(&self, record: &TaskRecord) -> Result<TaskOutput, TaskError> {
        let handler = self
            .registry
            .get(record.task_type.as_str())
            .ok_or_else(|| TaskError::UnknownType(record.task_type.to_string()))?;
        let ctx = TaskContext {
            task_id: record.id.clone(),
            home: self.home.clone(),
        };
        handler.handle_dyn(record.payload.clone(), &ctx).await
    }

    fn finish(&self, id: &TaskId, output: TaskOutput) -> Result<TaskRecord, EngineError> {
        let now = self.clock.now();
        let record = self.store.update(id, &mut |r| {
            r.append_output(&output.output);
            if output.install_log.is_some() {
                r.install_log = output.install_log.clone();
            }
            r.finish(now)
        })?;
        info!(task_id = %id, task_type = %record.task_type, status = %record.status, "task finished");
        Ok(record)
    }

    fn fail(&self, id: &TaskId, err: &TaskError) -> Result<TaskRecord, EngineError> {
        let now = self.clock.now();
        let message = err.record_message();
        let record = self.store.update(id, &mut |r| r.fail(message.as_str(), now))?;
        warn!(
            task_id = %id,
            task_type = %record.task_type,
            status = %record.status,
            error = %err,
            "task failed"
        );
        Ok(record)
    }
}
