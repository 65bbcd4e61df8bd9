//! JsonTaskStore - JSON ファイルに保存するタスクストア
//!
//! # 実装詳細
//! - One document `{"tasks": [...]}`; the array keeps insertion order.
//! - A sibling `<file>.lock` is locked with `fs2`: shared for reads,
//!   exclusive for read-modify-write. Concurrent enqueues from several
//!   processes are serialized this way.
//! - Writes go to `<file>.tmp` first and are renamed over the document, so a
//!   reader never sees a half-written file.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{StoreError, TaskId, TaskRecord};
use crate::ports::{RecordUpdate, TaskStore};

#[derive(Debug, Default, Serialize, Deserialize)]
struct TaskDocument {
    #[serde(default)]
    tasks: Vec<TaskRecord>,
}

impl TaskDocument {
    fn position(&self, id: &TaskId) -> Option<usize> {
        self.tasks.iter().position(|t| &t.id == id)
    }
}

#[derive(Debug, Clone)]
pub struct JsonTaskStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonTaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = sibling(&path, "lock");
        Self { path, lock_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Take the advisory lock. Released when the returned file is dropped.
    fn lock(&self, exclusive: bool) -> Result<File, StoreError> {
        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent).map_err(|e| Self::io_error(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|e| Self::io_error(&self.lock_path, e))?;
        let locked = if exclusive {
            FileExt::lock_exclusive(&file)
        } else {
            FileExt::lock_shared(&file)
        };
        locked.map_err(|e| Self::io_error(&self.lock_path, e))?;
        Ok(file)
    }

    fn read_document(&self) -> Result<TaskDocument, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(TaskDocument::default());
            }
            Err(e) => return Err(Self::io_error(&self.path, e)),
        };
        if content.trim().is_empty() {
            return Ok(TaskDocument::default());
        }
        serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn write_document(&self, document: &TaskDocument) -> Result<(), StoreError> {
        let content =
            serde_json::to_string_pretty(document).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        let tmp = sibling(&self.path, "tmp");
        fs::write(&tmp, content).map_err(|e| Self::io_error(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| Self::io_error(&self.path, e))?;
        debug!(path = %self.path.display(), tasks = document.tasks.len(), "task document written");
        Ok(())
    }

    fn read_locked(&self) -> Result<TaskDocument, StoreError> {
        let _guard = self.lock(false)?;
        self.read_document()
    }
}

/// `tasks.json` -> `tasks.json.<suffix>`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

impl TaskStore for JsonTaskStore {
    fn get_task(&self, id: &TaskId) -> Result<Option<TaskRecord>, StoreError> {
        let document = self.read_locked()?;
        Ok(document.tasks.into_iter().find(|t| &t.id == id))
    }

    fn ids(&self) -> Result<Vec<TaskId>, StoreError> {
        let document = self.read_locked()?;
        Ok(document.tasks.into_iter().map(|t| t.id).collect())
    }

    fn tasks(&self) -> Result<Vec<TaskRecord>, StoreError> {
        Ok(self.read_locked()?.tasks)
    }

    fn add(&self, record: TaskRecord) -> Result<(), StoreError> {
        let _guard = self.lock(true)?;
        let mut document = self.read_document()?;
        if document.position(&record.id).is_some() {
            return Err(StoreError::DuplicateId(record.id));
        }
        debug!(task_id = %record.id, task_type = %record.task_type, "adding task");
        document.tasks.push(record);
        self.write_document(&document)
    }

    fn update(&self, id: &TaskId, f: RecordUpdate<'_>) -> Result<TaskRecord, StoreError> {
        let _guard = self.lock(true)?;
        let mut document = self.read_document()?;
        let index = document
            .position(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        let mut record = document.tasks[index].clone();
        f(&mut record)?;
        document.tasks[index] = record.clone();
        self.write_document(&document)?;
        Ok(record)
    }
}
