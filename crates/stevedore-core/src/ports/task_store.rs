//! TaskStore port - タスクレコードの正本（source of truth）
//!
//! The web process enqueues, task subprocesses execute and polling requests
//! read: all of them go through this trait.

use crate::domain::{StoreError, TaskError, TaskId, TaskRecord};

/// Closure applied to a record inside a read-modify-write.
///
/// Returning an error aborts the update; nothing is written.
pub type RecordUpdate<'a> = &'a mut dyn FnMut(&mut TaskRecord) -> Result<(), TaskError>;

/// TaskStore はタスクレコードの永続化を担当
///
/// # 設計原則
/// - ids are unique; listing keeps insertion order
/// - every mutation is persisted before the call returns, so a concurrently
///   reading process observes the new state
pub trait TaskStore: Send + Sync {
    /// Look a task up. Unknown ids yield `Ok(None)`.
    fn get_task(&self, id: &TaskId) -> Result<Option<TaskRecord>, StoreError>;

    /// All ids in insertion order. Re-reads the backing store on every call.
    fn ids(&self) -> Result<Vec<TaskId>, StoreError>;

    /// All records in insertion order.
    fn tasks(&self) -> Result<Vec<TaskRecord>, StoreError>;

    /// Append a new record. Fails with `DuplicateId` if the id is taken.
    fn add(&self, record: TaskRecord) -> Result<(), StoreError>;

    /// Read-modify-write one record and return the persisted result.
    fn update(&self, id: &TaskId, f: RecordUpdate<'_>) -> Result<TaskRecord, StoreError>;
}
