//! LoggingInstallationManager - records every package change before
//! handing it to the wrapped installation manager.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::debug;

use super::json_array::JsonArray;
use crate::domain::{
    InstallOperation, InstallationError, Pool, Reason, RuleKind, UninstallOperation,
    UpdateOperation,
};
use crate::ports::InstallationManager;

/// Decorator adding a change log entry per operation.
///
/// Entries are keyed by the package's pretty name:
/// - install: `{type, reason, package}`
/// - update: `{type, reason, package, target}` (filed under the initial package)
/// - uninstall: `{type, package}`
///
/// The wrapped manager always runs and its result is returned untouched.
pub struct LoggingInstallationManager<M> {
    inner: M,
    pool: Option<Arc<dyn Pool>>,
    log: JsonArray,
}

impl<M: InstallationManager> LoggingInstallationManager<M> {
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            pool: None,
            log: JsonArray::new(),
        }
    }

    /// Supply the resolution context used to explain rule reasons.
    pub fn set_pool(&mut self, pool: Option<Arc<dyn Pool>>) {
        self.pool = pool;
    }

    pub fn log(&self) -> &JsonArray {
        &self.log
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }

    pub fn into_parts(self) -> (M, JsonArray) {
        (self.inner, self.log)
    }

    fn resolve_reason(&self, reason: Option<&Reason>) -> Option<String> {
        let pool = self.pool.as_deref()?;
        let Some(Reason::Rule(rule)) = reason else {
            return None;
        };
        match rule.kind() {
            RuleKind::RootRequire => Some(format!(
                "Required by the root package: {}",
                rule.pretty_string(pool)
            )),
            RuleKind::PackageRequires => Some(rule.pretty_string(pool)),
            RuleKind::Conflict | RuleKind::Other => None,
        }
    }

    fn record(&mut self, pretty_name: &str, entry: Value) {
        debug!(package = pretty_name, "recording package operation");
        self.log.set(&JsonArray::escape(pretty_name), entry);
    }
}

impl<M: InstallationManager> InstallationManager for LoggingInstallationManager<M> {
    fn install(&mut self, operation: &InstallOperation) -> Result<(), InstallationError> {
        let reason = self.resolve_reason(operation.reason.as_ref());
        self.record(
            &operation.package.pretty_name,
            json!({
                "type": "install",
                "reason": reason,
                "package": operation.package.dump(),
            }),
        );
        self.inner.install(operation)
    }

    fn update(&mut self, operation: &UpdateOperation) -> Result<(), InstallationError> {
        let reason = self.resolve_reason(operation.reason.as_ref());
        self.record(
            &operation.initial.pretty_name,
            json!({
                "type": "update",
                "reason": reason,
                "package": operation.initial.dump(),
                "target": operation.target.dump(),
            }),
        );
        self.inner.update(operation)
    }

    fn uninstall(&mut self, operation: &UninstallOperation) -> Result<(), InstallationError> {
        self.record(
            &operation.package.pretty_name,
            json!({
                "type": "uninstall",
                "package": operation.package.dump(),
            }),
        );
        self.inner.uninstall(operation)
    }
}
