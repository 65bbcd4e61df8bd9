//! Built-in package-management tasks.
//!
//! | tag               | package-manager call |
//! |-------------------|----------------------|
//! | `install`         | `create_project`     |
//! | `upgrade`         | `update`             |
//! | `require-package` | `require`            |
//! | `remove-package`  | `remove`             |

mod install;
mod remove_package;
mod require_package;
mod upgrade;

use std::sync::Arc;

use tracing::debug;

pub use self::install::{InstallHandler, InstallTask};
pub use self::remove_package::{RemovePackageHandler, RemovePackageTask};
pub use self::require_package::{RequirePackageHandler, RequirePackageTask};
pub use self::upgrade::{UpgradeHandler, UpgradeTask};

use crate::app::AppBuilder;
use crate::domain::TaskError;
use crate::impls::LazyPackageManager;
use crate::install_log::{ChangeSummary, LoggingInstallationManager, parse_operations};
use crate::ports::InstallationManager;
use crate::typed::{RegistryError, Task, TaskOutput};

/// Tags of every built-in task.
pub const BUILTIN_TASK_TYPES: [&str; 4] = [
    InstallTask::TYPE,
    UpgradeTask::TYPE,
    RequirePackageTask::TYPE,
    RemovePackageTask::TYPE,
];

/// Register the built-in handlers, all sharing one lazily built package manager.
pub fn register_builtin_tasks(
    builder: AppBuilder,
    package_manager: Arc<LazyPackageManager>,
) -> Result<AppBuilder, RegistryError> {
    builder
        .register::<InstallTask, _>(InstallHandler::new(Arc::clone(&package_manager)))?
        .register::<UpgradeTask, _>(UpgradeHandler::new(Arc::clone(&package_manager)))?
        .register::<RequirePackageTask, _>(RequirePackageHandler::new(Arc::clone(
            &package_manager,
        )))?
        .register::<RemovePackageTask, _>(RemovePackageHandler::new(package_manager))
}

/// Turn package-manager output into the task output plus installation log.
pub(crate) fn record_changes(output: String) -> Result<TaskOutput, TaskError> {
    let operations = parse_operations(&output);
    if operations.is_empty() {
        return Ok(TaskOutput::text(output));
    }

    let mut manager = LoggingInstallationManager::new(ChangeSummary::new());
    for operation in &operations {
        manager.execute(operation)?;
    }
    let (summary, log) = manager.into_parts();
    debug!(changes = summary.lines().len(), "package changes recorded");

    let mut text = output;
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text.push_str(&summary.render());

    Ok(TaskOutput {
        output: text,
        install_log: Some(log.into_value()),
    })
}

/// Package arguments must be non-empty and look like `vendor/name[:constraint]`.
pub(crate) fn check_packages<T: Task>(packages: &[String], allow_empty: bool) -> Result<(), TaskError> {
    if packages.is_empty() && !allow_empty {
        return Err(T::invalid("at least one package is required"));
    }
    for package in packages {
        let name = package.split(':').next().unwrap_or_default();
        if !is_package_name(name) {
            return Err(T::invalid(format!("'{package}' is not a valid package name")));
        }
    }
    Ok(())
}

pub(crate) fn is_package_name(name: &str) -> bool {
    match name.split_once('/') {
        Some((vendor, project)) => {
            !vendor.is_empty()
                && !project.is_empty()
                && !project.contains('/')
                && name.chars().all(|c| !c.is_whitespace())
        }
        None => false,
    }
}
