//! Task trait - 型付き Task の定義
//!
//! # 学習ポイント
//! - Associated Constants (`const TYPE`)
//! - Trait bounds の組み合わせ (Serialize + DeserializeOwned + Send + Sync + 'static)

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::TaskError;

/// Task は type tag とペイロード型を対応付ける
///
/// # 使用例
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct InstallTask {
///     package: String,
///     version: String,
/// }
///
/// impl Task for InstallTask {
///     const TYPE: &'static str = "install";
/// }
/// ```
///
/// # Trait Bounds
/// - `Serialize`: ペイロードをタスクレコードに保存するため
/// - `DeserializeOwned`: タスクレコードから復元するため
/// - `Send + Sync + 'static`: Arc<dyn DynHandler> に格納できるため
pub trait Task: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Type tag stored in the task record.
    const TYPE: &'static str;

    /// Semantic payload checks beyond what decoding guarantees.
    ///
    /// Runs when the task is created and again before it is handled.
    fn validate(&self) -> Result<(), TaskError> {
        Ok(())
    }

    fn invalid(message: impl Into<String>) -> TaskError {
        TaskError::InvalidPayload {
            task_type: Self::TYPE.to_string(),
            message: message.into(),
        }
    }
}
