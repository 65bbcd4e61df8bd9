//! Reads package operations back out of package-manager output.
//!
//! Understood lines (the lock-file section repeats them, duplicates are dropped):
//! - `  - Installing vendor/pkg (1.0.0): Extracting archive`
//! - `  - Upgrading vendor/pkg (1.0.0 => 1.1.0)` (also `Downgrading`, `Updating`)
//! - `  - Removing vendor/pkg (1.0.0)` (also `Uninstalling`)

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::domain::{Operation, Package};

static OPERATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*-\s+(Installing|Upgrading|Downgrading|Updating|Removing|Uninstalling)\s+(\S+)\s+\(([^)]*)\)",
    )
    .expect("operation regex pattern is hardcoded and must be valid")
});

pub fn parse_operations(output: &str) -> Vec<Operation> {
    let mut seen = HashSet::new();
    let mut operations = Vec::new();

    for line in output.lines() {
        let Some(caps) = OPERATION_RE.captures(line) else {
            continue;
        };
        let verb = &caps[1];
        let name = &caps[2];
        let versions = caps[3].trim();

        let operation = match verb {
            "Installing" => Operation::install(Package::new(name, versions)),
            "Removing" | "Uninstalling" => Operation::uninstall(Package::new(name, versions)),
            _ => {
                let Some((from, to)) = versions.split_once("=>") else {
                    continue;
                };
                Operation::update(
                    Package::new(name, from.trim()),
                    Package::new(name, to.trim()),
                )
            }
        };

        if seen.insert((operation.job_type(), name.to_lowercase())) {
            operations.push(operation);
        }
    }

    operations
}
