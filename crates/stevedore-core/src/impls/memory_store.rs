//! InMemoryTaskStore - 開発用・テスト用のタスクストア

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::{StoreError, TaskId, TaskRecord};
use crate::ports::{RecordUpdate, TaskStore};

/// Keeps records in a `Vec` behind a mutex (insertion order preserved).
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: Mutex<Vec<TaskRecord>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tasks_guard(&self) -> MutexGuard<'_, Vec<TaskRecord>> {
        // a panicking writer never leaves a half-applied record behind
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TaskStore for InMemoryTaskStore {
    fn get_task(&self, id: &TaskId) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self.tasks_guard().iter().find(|t| &t.id == id).cloned())
    }

    fn ids(&self) -> Result<Vec<TaskId>, StoreError> {
        Ok(self.tasks_guard().iter().map(|t| t.id.clone()).collect())
    }

    fn tasks(&self) -> Result<Vec<TaskRecord>, StoreError> {
        Ok(self.tasks_guard().clone())
    }

    fn add(&self, record: TaskRecord) -> Result<(), StoreError> {
        let mut tasks = self.tasks_guard();
        if tasks.iter().any(|t| t.id == record.id) {
            return Err(StoreError::DuplicateId(record.id));
        }
        tasks.push(record);
        Ok(())
    }

    fn update(&self, id: &TaskId, f: RecordUpdate<'_>) -> Result<TaskRecord, StoreError> {
        let mut tasks = self.tasks_guard();
        let slot = tasks
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let mut record = slot.clone();
        f(&mut record)?;
        *slot = record.clone();
        Ok(record)
    }
}
