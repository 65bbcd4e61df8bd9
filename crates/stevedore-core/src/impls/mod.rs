//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **JsonTaskStore**: 本番用、JSON ファイルのタスクストア
//! - **InMemoryTaskStore**: テスト用のタスクストア
//! - **ComposerCli**: composer 実行ファイルを呼ぶ PackageManager
//! - **LazyPackageManager**: PackageManager の遅延構築

pub mod composer;
pub mod json_store;
pub mod lazy;
pub mod memory_store;

pub use self::composer::ComposerCli;
pub use self::json_store::JsonTaskStore;
pub use self::lazy::LazyPackageManager;
pub use self::memory_store::InMemoryTaskStore;
