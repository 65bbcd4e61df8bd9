//! App - アプリケーション層
//!
//! ports を組み合わせてタスクエンジンを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: 構築とワイヤリング（起動時検証）
//! - **Engine**: タスクの作成・参照
//! - **TaskExecutor**: 1 タスクの実行（PENDING → RUNNING → FINISHED/FAILED）
//! - **RunLock**: 同時に 1 タスクだけを実行させるファイルロック
//! - **TaskRunner**: `run-task <id>` サブプロセスの起動

pub mod builder;
pub mod engine;
pub mod executor;
pub mod run_lock;
pub mod runner;

pub use self::builder::{AppBuilder, BuildError};
pub use self::engine::{Engine, EngineError};
pub use self::executor::TaskExecutor;
pub use self::run_lock::{LockError, RunLock};
pub use self::runner::{INHERITED_LOCK_FLAG, LaunchSpec, RunnerError, SpawnReport, TaskRunner};
