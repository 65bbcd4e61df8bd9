//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」。各 trait は外部リソース
//! （JSON ファイル、パッケージマネージャー、時計）へのインターフェースを提供し、
//! 実装の詳細を隠蔽します。

pub mod clock;
pub mod id_generator;
pub mod installation_manager;
pub mod package_manager;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::installation_manager::InstallationManager;
pub use self::package_manager::PackageManager;
pub use self::task_store::{RecordUpdate, TaskStore};
