use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{check_packages, record_changes};
use crate::domain::TaskError;
use crate::impls::LazyPackageManager;
use crate::typed::{Handler, Task, TaskContext, TaskOutput};

/// Update the listed packages (everything when the list is empty).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpgradeTask {
    #[serde(default)]
    pub packages: Vec<String>,
}

impl Task for UpgradeTask {
    const TYPE: &'static str = "upgrade";

    fn validate(&self) -> Result<(), TaskError> {
        check_packages::<Self>(&self.packages, true)
    }
}

pub struct UpgradeHandler {
    package_manager: Arc<LazyPackageManager>,
}

impl UpgradeHandler {
    pub fn new(package_manager: Arc<LazyPackageManager>) -> Self {
        Self { package_manager }
    }
}

#[async_trait]
impl Handler<UpgradeTask> for UpgradeHandler {
    async fn handle(&self, task: UpgradeTask, ctx: &TaskContext) -> Result<TaskOutput, TaskError> {
        info!(task_id = %ctx.task_id, packages = ?task.packages, "upgrading packages");
        let package_manager = self.package_manager.get().await?;
        let output = package_manager.update(&task.packages).await?;
        record_changes(output)
    }
}
