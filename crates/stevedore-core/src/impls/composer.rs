//! ComposerCli - PackageManager backed by the `composer` executable.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::domain::PackageManagerError;
use crate::ports::PackageManager;

#[derive(Debug, Clone)]
pub struct ComposerCli {
    binary: PathBuf,
    working_dir: PathBuf,
    environment: BTreeMap<String, String>,
}

impl ComposerCli {
    pub fn new(binary: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            working_dir: working_dir.into(),
            environment: BTreeMap::new(),
        }
    }

    /// Resolve `binary` (a name on `PATH` or a path) before building the client.
    pub fn locate(
        binary: &str,
        working_dir: impl Into<PathBuf>,
    ) -> Result<Self, PackageManagerError> {
        let resolved =
            which::which(binary).map_err(|_| PackageManagerError::NotFound(binary.to_string()))?;
        Ok(Self::new(resolved, working_dir))
    }

    pub fn with_environment(mut self, environment: BTreeMap<String, String>) -> Self {
        self.environment = environment;
        self
    }

    async fn run(&self, args: Vec<String>) -> Result<String, PackageManagerError> {
        info!(binary = %self.binary.display(), ?args, "running package manager");
        let output = Command::new(&self.binary)
            .args(&args)
            .arg("--no-interaction")
            .current_dir(&self.working_dir)
            .envs(&self.environment)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(PackageManagerError::Launch)?;

        // composer reports progress on stderr
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        debug!(status = ?output.status.code(), bytes = text.len(), "package manager exited");

        if output.status.success() {
            Ok(text)
        } else {
            Err(PackageManagerError::ExitStatus {
                code: output.status.code(),
                output: text,
            })
        }
    }
}

#[async_trait]
impl PackageManager for ComposerCli {
    async fn create_project(
        &self,
        package: &str,
        version: &str,
        destination: &Path,
    ) -> Result<String, PackageManagerError> {
        self.run(vec![
            "create-project".to_string(),
            package.to_string(),
            destination.display().to_string(),
            version.to_string(),
        ])
        .await
    }

    async fn require(&self, packages: &[String]) -> Result<String, PackageManagerError> {
        let mut args = vec!["require".to_string()];
        args.extend(packages.iter().cloned());
        self.run(args).await
    }

    async fn remove(&self, packages: &[String]) -> Result<String, PackageManagerError> {
        let mut args = vec!["remove".to_string()];
        args.extend(packages.iter().cloned());
        self.run(args).await
    }

    async fn update(&self, packages: &[String]) -> Result<String, PackageManagerError> {
        let mut args = vec!["update".to_string(), "--with-dependencies".to_string()];
        args.extend(packages.iter().cloned());
        self.run(args).await
    }
}
