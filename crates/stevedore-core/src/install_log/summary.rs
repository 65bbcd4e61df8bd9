//! ChangeSummary - innermost installation manager of a task run.
//!
//! The package manager has already applied the changes out of process by
//! the time a task replays them, so this manager only keeps one line per
//! operation for the task output.

use crate::domain::{InstallOperation, InstallationError, UninstallOperation, UpdateOperation};
use crate::ports::InstallationManager;

#[derive(Debug, Default, Clone)]
pub struct ChangeSummary {
    lines: Vec<String>,
}

impl ChangeSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// `Changes:` block appended to the task output.
    pub fn render(&self) -> String {
        let mut out = String::from("Changes:");
        for line in &self.lines {
            out.push_str("\n  ");
            out.push_str(line);
        }
        out
    }
}

impl InstallationManager for ChangeSummary {
    fn install(&mut self, op: &InstallOperation) -> Result<(), InstallationError> {
        self.lines.push(format!(
            "installed {} ({})",
            op.package.pretty_name, op.package.pretty_version
        ));
        Ok(())
    }

    fn update(&mut self, op: &UpdateOperation) -> Result<(), InstallationError> {
        self.lines.push(format!(
            "updated {} ({} => {})",
            op.initial.pretty_name, op.initial.pretty_version, op.target.pretty_version
        ));
        Ok(())
    }

    fn uninstall(&mut self, op: &UninstallOperation) -> Result<(), InstallationError> {
        self.lines.push(format!(
            "removed {} ({})",
            op.package.pretty_name, op.package.pretty_version
        ));
        Ok(())
    }
}
