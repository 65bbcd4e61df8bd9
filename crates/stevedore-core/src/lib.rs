//! stevedore-core
//!
//! Task engine for package-management operations: tasks are persisted as
//! JSON records and each one runs in its own `run-task <id>` subprocess,
//! one at a time per data directory.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, state, task record, package operations, errors）
//! - **ports**: 抽象化レイヤー（TaskStore, PackageManager, InstallationManager, Clock, IdGenerator）
//! - **typed**: 型付き Task API（Task trait, Handler trait, TypedRegistry）
//! - **tasks**: 組み込みタスク（install, upgrade, require-package, remove-package）
//! - **app**: アプリケーションロジック（builder, engine, executor, run lock, runner）
//! - **impls**: 実装（JsonTaskStore, ComposerCli, LazyPackageManager など）
//! - **install_log**: インストールログ（JsonArray, LoggingInstallationManager）
//! - **config**: ホームディレクトリ、設定ファイル、capability probe

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod install_log;
pub mod ports;
pub mod tasks;
pub mod typed;
