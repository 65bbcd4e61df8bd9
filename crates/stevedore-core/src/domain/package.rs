//! Package - パッケージ操作のモデル
//!
//! The package manager reports what it changed as a list of operations.
//! An operation may carry the resolver's reason for it, which the
//! installation log turns into human readable text.

use serde_json::{Map, Value, json};

/// A package as seen by the installation manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    /// Lower-cased name used for lookups.
    pub name: String,
    pub pretty_name: String,
    /// Normalized version (`1.0.0.0`).
    pub version: String,
    pub pretty_version: String,
    pub package_type: String,
    pub description: Option<String>,
}

impl Package {
    pub fn new(pretty_name: impl Into<String>, pretty_version: impl Into<String>) -> Self {
        let pretty_name = pretty_name.into();
        let pretty_version = pretty_version.into();
        Self {
            name: pretty_name.to_lowercase(),
            version: normalize_version(&pretty_version),
            pretty_name,
            pretty_version,
            package_type: "library".to_string(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Dump the package metadata the way the package manager's array dumper does.
    pub fn dump(&self) -> Value {
        let mut map = Map::new();
        map.insert("name".into(), json!(self.pretty_name));
        map.insert("version".into(), json!(self.pretty_version));
        map.insert("version_normalized".into(), json!(self.version));
        map.insert("type".into(), json!(self.package_type));
        if let Some(description) = &self.description {
            map.insert("description".into(), json!(description));
        }
        Value::Object(map)
    }
}

/// `v1.2` -> `1.2.0.0`. Anything that is not a plain numeric version
/// (`dev-master`, `1.0.x-dev`) is kept as-is.
pub fn normalize_version(version: &str) -> String {
    let trimmed = version.trim();
    let bare = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    let (numeric, suffix) = match bare.split_once('-') {
        Some((n, s)) => (n, Some(s)),
        None => (bare, None),
    };
    let parts: Vec<&str> = numeric.split('.').collect();
    if parts.is_empty()
        || parts.len() > 4
        || parts
            .iter()
            .any(|p| p.is_empty() || !p.chars().all(|c| c.is_ascii_digit()))
    {
        return trimmed.to_string();
    }
    let mut normalized: Vec<&str> = parts;
    while normalized.len() < 4 {
        normalized.push("0");
    }
    let mut out = normalized.join(".");
    if let Some(suffix) = suffix {
        out.push('-');
        out.push_str(suffix);
    }
    out
}

/// Kind of resolver rule behind an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// A requirement of the root package (install job).
    RootRequire,
    /// A requirement declared by another package.
    PackageRequires,
    Conflict,
    Other,
}

/// Resolver rule: why the resolver decided on an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    kind: RuleKind,
    /// The package declaring the requirement (absent for root rules).
    source: Option<String>,
    /// Requirement text, e.g. `vendor/b ^1.0`.
    requirement: String,
}

impl Rule {
    pub fn new(kind: RuleKind, source: Option<String>, requirement: impl Into<String>) -> Self {
        Self {
            kind,
            source,
            requirement: requirement.into(),
        }
    }

    pub fn root_require(requirement: impl Into<String>) -> Self {
        Self::new(RuleKind::RootRequire, None, requirement)
    }

    pub fn package_requires(source: impl Into<String>, requirement: impl Into<String>) -> Self {
        Self::new(RuleKind::PackageRequires, Some(source.into()), requirement)
    }

    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn requirement(&self) -> &str {
        &self.requirement
    }

    pub fn pretty_string(&self, pool: &dyn Pool) -> String {
        pool.pretty_string(self)
    }
}

/// Resolution context able to render rules for humans.
pub trait Pool: Send + Sync {
    fn pretty_string(&self, rule: &Rule) -> String;
}

/// Renders rules from their own data only.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicPool;

impl Pool for BasicPool {
    fn pretty_string(&self, rule: &Rule) -> String {
        match (rule.kind(), rule.source()) {
            (RuleKind::PackageRequires, Some(source)) => {
                format!("{source} requires {}", rule.requirement())
            }
            (RuleKind::Conflict, Some(source)) => {
                format!("{source} conflicts with {}", rule.requirement())
            }
            _ => rule.requirement().to_string(),
        }
    }
}

/// Why an operation happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    Rule(Rule),
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOperation {
    pub package: Package,
    pub reason: Option<Reason>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOperation {
    pub initial: Package,
    pub target: Package,
    pub reason: Option<Reason>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UninstallOperation {
    pub package: Package,
    pub reason: Option<Reason>,
}

/// One change applied by the package manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Install(InstallOperation),
    Update(UpdateOperation),
    Uninstall(UninstallOperation),
}

impl Operation {
    pub fn install(package: Package) -> Self {
        Operation::Install(InstallOperation {
            package,
            reason: None,
        })
    }

    pub fn update(initial: Package, target: Package) -> Self {
        Operation::Update(UpdateOperation {
            initial,
            target,
            reason: None,
        })
    }

    pub fn uninstall(package: Package) -> Self {
        Operation::Uninstall(UninstallOperation {
            package,
            reason: None,
        })
    }

    pub fn with_reason(mut self, reason: Reason) -> Self {
        match &mut self {
            Operation::Install(op) => op.reason = Some(reason),
            Operation::Update(op) => op.reason = Some(reason),
            Operation::Uninstall(op) => op.reason = Some(reason),
        }
        self
    }

    pub fn job_type(&self) -> &'static str {
        match self {
            Operation::Install(_) => "install",
            Operation::Update(_) => "update",
            Operation::Uninstall(_) => "uninstall",
        }
    }

    /// The package the operation is filed under (initial package for updates).
    pub fn package(&self) -> &Package {
        match self {
            Operation::Install(op) => &op.package,
            Operation::Update(op) => &op.initial,
            Operation::Uninstall(op) => &op.package,
        }
    }
}
