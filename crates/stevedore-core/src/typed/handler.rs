//! Handler trait - Task を実行する Handler の定義
//!
//! # 学習ポイント
//! - ジェネリック trait (Handler<T>)
//! - Object-safe trait (DynHandler)
//! - Type erasure パターン (TypedHandler<T, H> → DynHandler)

use std::marker::PhantomData;
use std::path::PathBuf;

use async_trait::async_trait;

use super::task::Task;
use crate::domain::{TaskError, TaskId};

/// What a handler needs to know about the run besides its payload.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task_id: TaskId,
    /// Home directory of the managed project.
    pub home: PathBuf,
}

/// Result of a successful handler run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskOutput {
    pub output: String,
    pub install_log: Option<serde_json::Value>,
}

impl TaskOutput {
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            install_log: None,
        }
    }
}

/// Handler は Task を実行して TaskOutput を返す
///
/// # ジェネリクスによる型安全性
/// - `Handler<InstallTask>` は `InstallTask` しか受け取れない
/// - コンパイル時に Task と Handler の対応が保証される
#[async_trait]
pub trait Handler<T: Task>: Send + Sync {
    async fn handle(&self, task: T, ctx: &TaskContext) -> Result<TaskOutput, TaskError>;
}

/// DynHandler は object-safe な Handler の抽象化
///
/// TypedHandler<T> を DynHandler に変換することで、
/// HashMap<String, Arc<dyn DynHandler>> に格納可能にします。
#[async_trait]
pub trait DynHandler: Send + Sync {
    /// Decode and validate a payload without running anything.
    fn check_payload(&self, payload: &serde_json::Value) -> Result<(), TaskError>;

    async fn handle_dyn(
        &self,
        payload: serde_json::Value,
        ctx: &TaskContext,
    ) -> Result<TaskOutput, TaskError>;

    fn task_type(&self) -> &str;
}

pub struct TypedHandler<T: Task, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<T>,
}

impl<T: Task, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }

    fn decode(payload: serde_json::Value) -> Result<T, TaskError> {
        let task: T = serde_json::from_value(payload).map_err(|e| T::invalid(e.to_string()))?;
        task.validate()?;
        Ok(task)
    }
}

#[async_trait]
impl<T: Task, H: Handler<T>> DynHandler for TypedHandler<T, H> {
    fn check_payload(&self, payload: &serde_json::Value) -> Result<(), TaskError> {
        Self::decode(payload.clone()).map(|_| ())
    }

    async fn handle_dyn(
        &self,
        payload: serde_json::Value,
        ctx: &TaskContext,
    ) -> Result<TaskOutput, TaskError> {
        let task = Self::decode(payload)?;
        self.handler.handle(task, ctx).await
    }

    fn task_type(&self) -> &str {
        T::TYPE
    }
}
