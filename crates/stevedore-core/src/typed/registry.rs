//! TypedRegistry - Handler の登録と管理
//!
//! Maps a type tag to its handler. This is where a "create task" request
//! turns into a task record: the tag picks the handler, the handler checks
//! the payload, and an unknown tag simply creates nothing.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::handler::{DynHandler, Handler, TypedHandler};
use super::task::Task;
use crate::domain::{TaskError, TaskMetadata, TaskRecord};
use crate::ports::{Clock, IdGenerator};

/// TypedRegistry は型付き Handler を登録・管理
///
/// # 使用例
/// ```ignore
/// let mut registry = TypedRegistry::new();
/// registry.register::<InstallTask, _>(InstallHandler::new(pm))?;
///
/// let handler = registry.get("install");
/// ```
///
/// # 内部実装
/// - 内部的に TypedHandler でラップして DynHandler に変換
/// - HashMap<String, Arc<dyn DynHandler>> で管理
pub struct TypedRegistry {
    handlers: HashMap<String, Arc<dyn DynHandler>>,
}

/// RegistryError は TypedRegistry の操作エラー
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Handler for task type '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("Task type '{0}' is not a valid tag")]
    InvalidTag(String),

    #[error(transparent)]
    InvalidPayload(#[from] TaskError),
}

impl TypedRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register<T: Task, H: Handler<T> + 'static>(
        &mut self,
        handler: H,
    ) -> Result<(), RegistryError> {
        let task_type = T::TYPE.to_string();
        if task_type.is_empty() || task_type.chars().any(char::is_whitespace) {
            return Err(RegistryError::InvalidTag(task_type));
        }
        if self.handlers.contains_key(&task_type) {
            return Err(RegistryError::AlreadyRegistered(task_type));
        }
        let typed_handler = TypedHandler::new(handler);
        self.handlers.insert(task_type, Arc::new(typed_handler));
        Ok(())
    }

    pub fn get(&self, task_type: &str) -> Option<Arc<dyn DynHandler>> {
        self.handlers.get(task_type).cloned()
    }

    /// Registered tags, sorted.
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    /// Build a PENDING record for `metadata`.
    ///
    /// Returns `Ok(None)` when no handler knows the tag.
    pub fn create(
        &self,
        metadata: TaskMetadata,
        ids: &dyn IdGenerator,
        clock: &dyn Clock,
    ) -> Result<Option<TaskRecord>, RegistryError> {
        let Some(handler) = self.get(metadata.task_type.as_str()) else {
            debug!(task_type = %metadata.task_type, "no handler for task type, nothing created");
            return Ok(None);
        };
        handler.check_payload(&metadata.payload)?;

        Ok(Some(TaskRecord::new(
            ids.generate_task_id(),
            metadata.task_type,
            metadata.payload,
            clock.now(),
        )))
    }
}

impl Default for TypedRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskStatus;
    use crate::ports::{SystemClock, UlidGenerator};
    use crate::typed::handler::testing::{EchoHandler, NoopHandler};
    use crate::typed::task::testing::{EchoTask, NoopTask};
    use serde_json::json;

    fn registry() -> TypedRegistry {
        let mut registry = TypedRegistry::new();
        registry.register::<EchoTask, _>(EchoHandler).unwrap();
        registry.register::<NoopTask, _>(NoopHandler).unwrap();
        registry
    }

    #[test]
    fn test_register_and_get() {
        let registry = registry();
        assert!(registry.get(EchoTask::TYPE).is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_double_registration() {
        let mut registry = registry();
        let result = registry.register::<EchoTask, _>(EchoHandler);
        assert!(matches!(result, Err(RegistryError::AlreadyRegistered(_))));
    }

    #[test]
    fn test_registered_types() {
        assert_eq!(
            registry().registered_types(),
            vec![EchoTask::TYPE.to_string(), NoopTask::TYPE.to_string()]
        );
    }

    #[test]
    fn create_builds_pending_record() {
        let ids = UlidGenerator::new(SystemClock);
        let record = registry()
            .create(
                TaskMetadata::new(EchoTask::TYPE, json!({ "message": "hi" })),
                &ids,
                &SystemClock,
            )
            .unwrap()
            .unwrap();

        assert_eq!(record.status, TaskStatus::Pending);
        assert_eq!(record.task_type.as_str(), EchoTask::TYPE);
        assert_eq!(record.payload["message"], "hi");
    }

    #[test]
    fn unknown_tag_creates_nothing() {
        let ids = UlidGenerator::new(SystemClock);
        let created = registry()
            .create(TaskMetadata::new("frobnicate", json!({})), &ids, &SystemClock)
            .unwrap();
        assert!(created.is_none());
    }

    #[test]
    fn invalid_payload_is_rejected_at_creation() {
        let ids = UlidGenerator::new(SystemClock);
        let result = registry().create(
            TaskMetadata::new(EchoTask::TYPE, json!({ "message": "" })),
            &ids,
            &SystemClock,
        );
        assert!(matches!(result, Err(RegistryError::InvalidPayload(_))));
    }
}
