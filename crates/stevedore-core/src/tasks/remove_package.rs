use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{check_packages, record_changes};
use crate::domain::TaskError;
use crate::impls::LazyPackageManager;
use crate::typed::{Handler, Task, TaskContext, TaskOutput};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovePackageTask {
    pub packages: Vec<String>,
}

impl Task for RemovePackageTask {
    const TYPE: &'static str = "remove-package";

    fn validate(&self) -> Result<(), TaskError> {
        check_packages::<Self>(&self.packages, false)
    }
}

pub struct RemovePackageHandler {
    package_manager: Arc<LazyPackageManager>,
}

impl RemovePackageHandler {
    pub fn new(package_manager: Arc<LazyPackageManager>) -> Self {
        Self { package_manager }
    }
}

#[async_trait]
impl Handler<RemovePackageTask> for RemovePackageHandler {
    async fn handle(
        &self,
        task: RemovePackageTask,
        ctx: &TaskContext,
    ) -> Result<TaskOutput, TaskError> {
        info!(task_id = %ctx.task_id, packages = ?task.packages, "removing packages");
        let package_manager = self.package_manager.get().await?;
        let output = package_manager.remove(&task.packages).await?;
        record_changes(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::testing::FakePackageManager;
    use std::path::PathBuf;

    #[tokio::test]
    async fn removal_is_logged_without_reason() {
        let fake = FakePackageManager::ok("  - Removing vendor/old (0.9.0)\n");
        let handler = RemovePackageHandler::new(fake.lazy());
        let ctx = TaskContext {
            task_id: "T1".parse().unwrap(),
            home: PathBuf::from("."),
        };

        let task = RemovePackageTask {
            packages: vec!["vendor/old".into()],
        };
        let out = handler.handle(task, &ctx).await.unwrap();
        assert_eq!(fake.calls(), vec!["remove vendor/old"]);

        let entry = out.install_log.unwrap()["vendor/old"].clone();
        assert_eq!(entry["type"], "uninstall");
        assert!(entry.get("reason").is_none());
    }
}
