//! Installation log: which packages a task run installed, updated or removed.

pub mod decorator;
pub mod json_array;
pub mod parse;
pub mod summary;

pub use self::decorator::LoggingInstallationManager;
pub use self::json_array::JsonArray;
pub use self::parse::parse_operations;
pub use self::summary::ChangeSummary;
