use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{is_package_name, record_changes};
use crate::config::Paths;
use crate::domain::TaskError;
use crate::impls::LazyPackageManager;
use crate::typed::{Handler, Task, TaskContext, TaskOutput};

/// Install `package` at `version` as a new project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallTask {
    pub package: String,
    pub version: String,
    /// Defaults to the home directory, via a staging directory since
    /// composer only creates projects in empty ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<PathBuf>,
}

impl Task for InstallTask {
    const TYPE: &'static str = "install";

    fn validate(&self) -> Result<(), TaskError> {
        if !is_package_name(&self.package) {
            return Err(Self::invalid(format!(
                "'{}' is not a valid package name",
                self.package
            )));
        }
        if self.version.trim().is_empty() {
            return Err(Self::invalid("version must not be empty"));
        }
        Ok(())
    }
}

pub struct InstallHandler {
    package_manager: Arc<LazyPackageManager>,
}

impl InstallHandler {
    pub fn new(package_manager: Arc<LazyPackageManager>) -> Self {
        Self { package_manager }
    }
}

#[async_trait]
impl Handler<InstallTask> for InstallHandler {
    async fn handle(&self, task: InstallTask, ctx: &TaskContext) -> Result<TaskOutput, TaskError> {
        let package_manager = self.package_manager.get().await?;
        let output = match &task.destination {
            Some(destination) => {
                info!(
                    task_id = %ctx.task_id,
                    package = %task.package,
                    version = %task.version,
                    destination = %destination.display(),
                    "installing project"
                );
                package_manager
                    .create_project(&task.package, &task.version, destination)
                    .await?
            }
            None => {
                // home always holds the data directory, so build next to it
                let staging = Paths::new(&ctx.home).staging_dir(&ctx.task_id);
                info!(
                    task_id = %ctx.task_id,
                    package = %task.package,
                    version = %task.version,
                    staging = %staging.display(),
                    "installing project into home"
                );
                empty_dir(&staging)?;
                let result = match package_manager
                    .create_project(&task.package, &task.version, &staging)
                    .await
                {
                    Ok(output) => move_entries(&staging, &ctx.home).map(|()| output),
                    Err(e) => Err(e.into()),
                };
                if let Err(e) = fs::remove_dir_all(&staging) {
                    warn!(path = %staging.display(), error = %e, "could not remove staging directory");
                }
                result?
            }
        };
        record_changes(output)
    }
}

/// Fresh empty `dir`, clearing what an interrupted run left behind.
fn empty_dir(dir: &Path) -> Result<(), TaskError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => debug!(path = %dir.display(), "removed stale staging directory"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(source) => return Err(fs_error("cannot clear", dir, source)),
    }
    fs::create_dir_all(dir).map_err(|e| fs_error("cannot create", dir, e))
}

/// Move everything in `from` into `to`. Nothing moves if any name is taken.
fn move_entries(from: &Path, to: &Path) -> Result<(), TaskError> {
    let read = |e| fs_error("cannot read", from, e);
    let mut names = Vec::new();
    for entry in fs::read_dir(from).map_err(read)? {
        names.push(entry.map_err(read)?.file_name());
    }
    if let Some(taken) = names.iter().find(|name| to.join(name).exists()) {
        let target = to.join(taken);
        return Err(fs_error(
            "refusing to overwrite",
            &target,
            io::Error::from(io::ErrorKind::AlreadyExists),
        ));
    }
    for name in &names {
        let (source, target) = (from.join(name), to.join(name));
        fs::rename(&source, &target).map_err(|e| fs_error("cannot move into", &target, e))?;
    }
    debug!(from = %from.display(), to = %to.display(), entries = names.len(), "project moved");
    Ok(())
}

fn fs_error(action: &'static str, path: &Path, source: io::Error) -> TaskError {
    TaskError::Filesystem {
        action,
        path: path.to_path_buf(),
        source,
    }
}
