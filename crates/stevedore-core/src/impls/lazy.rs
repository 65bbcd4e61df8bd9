//! LazyPackageManager - builds the package manager on first use.
//!
//! Task handlers share one instance. Constructing it may fail (binary not
//! installed), and only tasks that actually need it should see that error.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::debug;

use crate::domain::PackageManagerError;
use crate::ports::PackageManager;

type Factory =
    Box<dyn Fn() -> Result<Arc<dyn PackageManager>, PackageManagerError> + Send + Sync>;

pub struct LazyPackageManager {
    factory: Factory,
    cell: OnceCell<Arc<dyn PackageManager>>,
}

impl LazyPackageManager {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn PackageManager>, PackageManagerError> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            cell: OnceCell::new(),
        }
    }

    /// Wrap an already constructed instance.
    pub fn ready(package_manager: Arc<dyn PackageManager>) -> Self {
        Self {
            factory: Box::new(|| Err(PackageManagerError::NotFound("<prebuilt>".to_string()))),
            cell: OnceCell::new_with(Some(package_manager)),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    /// A failed construction is not cached; the next call tries again.
    pub async fn get(&self) -> Result<Arc<dyn PackageManager>, PackageManagerError> {
        let package_manager = self
            .cell
            .get_or_try_init(|| async {
                debug!("constructing package manager");
                (self.factory)()
            })
            .await?;
        Ok(Arc::clone(package_manager))
    }
}
