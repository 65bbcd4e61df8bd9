//! Domain model (ids, status, task records, package operations, errors).

pub mod errors;
pub mod ids;
pub mod package;
pub mod state;
pub mod task;

pub use self::errors::{ErrorKind, InstallationError, PackageManagerError, StoreError, TaskError};
pub use self::ids::{IdError, TaskId};
pub use self::package::{
    BasicPool, InstallOperation, Operation, Package, Pool, Reason, Rule, RuleKind,
    UninstallOperation, UpdateOperation,
};
pub use self::state::TaskStatus;
pub use self::task::{TaskMetadata, TaskRecord, TaskType};
