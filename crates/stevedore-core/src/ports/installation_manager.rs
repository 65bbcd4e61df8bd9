//! InstallationManager port - the mutation surface of an install run.

use crate::domain::{
    InstallOperation, InstallationError, Operation, UninstallOperation, UpdateOperation,
};

pub trait InstallationManager: Send {
    fn install(&mut self, operation: &InstallOperation) -> Result<(), InstallationError>;

    fn update(&mut self, operation: &UpdateOperation) -> Result<(), InstallationError>;

    fn uninstall(&mut self, operation: &UninstallOperation) -> Result<(), InstallationError>;

    /// Dispatch one operation to the matching method.
    fn execute(&mut self, operation: &Operation) -> Result<(), InstallationError> {
        match operation {
            Operation::Install(op) => self.install(op),
            Operation::Update(op) => self.update(op),
            Operation::Uninstall(op) => self.uninstall(op),
        }
    }
}
