//! PackageManager port - the wrapped package manager (composer).
//!
//! Dependency resolution itself is entirely the package manager's business;
//! tasks only tell it what to do and keep the textual output.

use std::path::Path;

use async_trait::async_trait;

use crate::domain::PackageManagerError;

#[async_trait]
pub trait PackageManager: Send + Sync {
    /// Create a project from `package` at `version` inside `destination`.
    async fn create_project(
        &self,
        package: &str,
        version: &str,
        destination: &Path,
    ) -> Result<String, PackageManagerError>;

    /// Add requirements (`vendor/pkg` or `vendor/pkg:^1.0`).
    async fn require(&self, packages: &[String]) -> Result<String, PackageManagerError>;

    async fn remove(&self, packages: &[String]) -> Result<String, PackageManagerError>;

    /// Update the given packages, or everything when `packages` is empty.
    async fn update(&self, packages: &[String]) -> Result<String, PackageManagerError>;
}
