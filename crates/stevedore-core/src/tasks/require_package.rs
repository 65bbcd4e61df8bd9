use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{check_packages, record_changes};
use crate::domain::TaskError;
use crate::impls::LazyPackageManager;
use crate::typed::{Handler, Task, TaskContext, TaskOutput};

/// Add requirements, e.g. `["vendor/package:^1.0"]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirePackageTask {
    pub packages: Vec<String>,
}

impl Task for RequirePackageTask {
    const TYPE: &'static str = "require-package";

    fn validate(&self) -> Result<(), TaskError> {
        check_packages::<Self>(&self.packages, false)
    }
}

pub struct RequirePackageHandler {
    package_manager: Arc<LazyPackageManager>,
}

impl RequirePackageHandler {
    pub fn new(package_manager: Arc<LazyPackageManager>) -> Self {
        Self { package_manager }
    }
}

#[async_trait]
impl Handler<RequirePackageTask> for RequirePackageHandler {
    async fn handle(
        &self,
        task: RequirePackageTask,
        ctx: &TaskContext,
    ) -> Result<TaskOutput, TaskError> {
        info!(task_id = %ctx.task_id, packages = ?task.packages, "requiring packages");
        let package_manager = self.package_manager.get().await?;
        let output = package_manager.require(&task.packages).await?;
        record_changes(output)
    }
}
