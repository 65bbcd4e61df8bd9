//! Configuration - 起動時に一度だけ解決される設定
//!
//! - [`HomeLocator`]: `--home`, `STEVEDORE_HOME`, or the working directory
//! - [`Paths`]: file layout below `<home>/stevedore`
//! - [`EngineConfig`]: `stevedore.json`
//! - [`Capabilities`]: what the runner may do on this host
//!
//! Everything here is resolved once and passed down explicitly.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::{ErrorKind, TaskId};

pub const HOME_ENV: &str = "STEVEDORE_HOME";
pub const EXECUTABLE_ENV: &str = "STEVEDORE_EXECUTABLE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot determine the working directory: {0}")]
    WorkingDir(#[source] io::Error),

    #[error("cannot determine the executable to re-invoke: {0}")]
    Executable(#[source] io::Error),

    #[error("config I/O failed on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("config file {path} is invalid: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Configuration
    }
}

/// HomeLocator はホームディレクトリを解決
pub struct HomeLocator;

impl HomeLocator {
    pub fn locate(flag: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
        Self::resolve(flag, std::env::var_os(HOME_ENV), std::env::current_dir)
    }

    /// Relative paths are anchored at the working directory so that spawned
    /// subprocesses see the same home.
    fn resolve(
        flag: Option<PathBuf>,
        env: Option<OsString>,
        current_dir: impl FnOnce() -> io::Result<PathBuf>,
    ) -> Result<PathBuf, ConfigError> {
        let cwd = current_dir().map_err(ConfigError::WorkingDir)?;
        let chosen = flag
            .filter(|p| !p.as_os_str().is_empty())
            .or_else(|| env.filter(|v| !v.is_empty()).map(PathBuf::from));
        Ok(match chosen {
            Some(path) if path.is_absolute() => path,
            Some(path) => cwd.join(path),
            None => cwd,
        })
    }
}

/// File layout below the data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    home: PathBuf,
    data_dir: PathBuf,
}

impl Paths {
    pub const DATA_DIR: &'static str = "stevedore";

    pub fn new(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let data_dir = home.join(Self::DATA_DIR);
        Self { home, data_dir }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("stevedore.json")
    }

    pub fn tasks_file(&self) -> PathBuf {
        self.data_dir.join("tasks.json")
    }

    pub fn run_lock(&self) -> PathBuf {
        self.data_dir.join("task-run")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    /// Scratch directory where `id` builds a project before it is moved home.
    pub fn staging_dir(&self, id: &TaskId) -> PathBuf {
        self.data_dir.join("staging").join(id.as_str())
    }

    pub fn ensure(&self) -> Result<(), ConfigError> {
        for dir in [self.data_dir.clone(), self.log_dir()] {
            fs::create_dir_all(&dir).map_err(|source| ConfigError::Io { path: dir, source })?;
        }
        Ok(())
    }
}

/// `stevedore.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// Binary the runner re-invokes with `run-task <id>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,

    /// Arguments placed before the subcommand.
    pub executable_args: Vec<String>,

    /// Extra environment for task subprocesses.
    pub environment: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_fork: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_background: Option<bool>,

    pub package_manager: String,

    /// Run logs kept per task.
    pub max_run_logs: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            secret: None,
            executable: None,
            executable_args: Vec::new(),
            environment: BTreeMap::new(),
            can_fork: None,
            force_background: None,
            package_manager: "composer".to_string(),
            max_run_logs: 10,
        }
    }
}

impl EngineConfig {
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let text = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        // readers never see a half-written file; the pid keeps concurrent writers apart
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".{}.tmp", std::process::id()));
        let tmp = path.with_file_name(name);
        fs::write(&tmp, text + "\n").map_err(|source| ConfigError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, path).map_err(io_error)
    }

    /// Generate a secret if none is set. Returns whether one was generated.
    pub fn ensure_secret(&mut self) -> bool {
        if self.secret.is_some() {
            return false;
        }
        let bytes: [u8; 32] = rand::thread_rng().r#gen();
        self.secret = Some(bytes.iter().map(|b| format!("{b:02x}")).collect());
        true
    }

    /// Probed capabilities with this file's overrides applied.
    pub fn capabilities(&self) -> Capabilities {
        Capabilities::probe().with_overrides(self)
    }

    /// Configured executable, else `STEVEDORE_EXECUTABLE`, else the running binary.
    pub fn resolve_executable(&self) -> Result<PathBuf, ConfigError> {
        pick_executable(
            self.executable.clone(),
            std::env::var_os(EXECUTABLE_ENV),
            std::env::current_exe,
        )
    }

    /// Copy with the secret masked, for display.
    pub fn redacted(&self) -> Self {
        Self {
            secret: self.secret.as_ref().map(|_| "********".to_string()),
            ..self.clone()
        }
    }
}

fn pick_executable(
    configured: Option<PathBuf>,
    env: Option<OsString>,
    current_exe: impl FnOnce() -> io::Result<PathBuf>,
) -> Result<PathBuf, ConfigError> {
    if let Some(path) = configured.filter(|p| !p.as_os_str().is_empty()) {
        return Ok(path);
    }
    if let Some(value) = env.filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(value));
    }
    current_exe().map_err(ConfigError::Executable)
}

/// What the runner may do on this host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    /// Spawn and return without waiting for the child.
    pub can_fork: bool,
    /// Put the child in its own process group.
    pub force_background: bool,
    pub extra_args: Vec<String>,
}

impl Capabilities {
    pub fn probe() -> Self {
        Self {
            can_fork: cfg!(unix),
            force_background: cfg!(target_os = "macos"),
            extra_args: Vec::new(),
        }
    }

    pub fn with_overrides(mut self, config: &EngineConfig) -> Self {
        if let Some(can_fork) = config.can_fork {
            self.can_fork = can_fork;
        }
        if let Some(force_background) = config.force_background {
            self.force_background = force_background;
        }
        if !config.executable_args.is_empty() {
            self.extra_args = config.executable_args.clone();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn cwd() -> io::Result<PathBuf> {
        Ok(PathBuf::from("/work"))
    }

    #[rstest]
    #[case(Some("/flag"), Some("/env"), "/flag")]
    #[case(None, Some("/env"), "/env")]
    #[case(None, Some(""), "/work")]
    #[case(None, None, "/work")]
    #[case(Some("rel"), None, "/work/rel")]
    fn home_resolution_order(
        #[case] flag: Option<&str>,
        #[case] env: Option<&str>,
        #[case] expected: &str,
    ) {
        let home =
            HomeLocator::resolve(flag.map(PathBuf::from), env.map(OsString::from), cwd).unwrap();
        assert_eq!(home, PathBuf::from(expected));
    }

    #[test]
    fn paths_live_under_data_dir() {
        let paths = Paths::new("/srv/app");
        assert_eq!(paths.data_dir(), Path::new("/srv/app/stevedore"));
        assert_eq!(paths.tasks_file(), PathBuf::from("/srv/app/stevedore/tasks.json"));
        assert_eq!(paths.run_lock(), PathBuf::from("/srv/app/stevedore/task-run"));
        assert_eq!(paths.log_dir(), PathBuf::from("/srv/app/stevedore/logs"));
        assert_eq!(
            paths.staging_dir(&"T1".parse().unwrap()),
            PathBuf::from("/srv/app/stevedore/staging/T1")
        );
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig::load(&dir.path().join("stevedore.json")).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.package_manager, "composer");
        assert_eq!(config.max_run_logs, 10);
    }

    #[test]
    fn save_then_load_keeps_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/stevedore.json");
        let mut config = EngineConfig {
            can_fork: Some(false),
            package_manager: "/opt/composer".into(),
            ..EngineConfig::default()
        };
        config.environment.insert("COMPOSER_HOME".into(), "/tmp/c".into());
        assert!(config.ensure_secret());
        assert!(!config.ensure_secret());

        config.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn readers_never_see_a_partial_save() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stevedore.json");
        let mut config = EngineConfig::default();
        config.ensure_secret();
        config.save(&path).unwrap();

        let writer = {
            let path = path.clone();
            let config = config.clone();
            std::thread::spawn(move || {
                for _ in 0..200 {
                    config.save(&path).unwrap();
                }
            })
        };
        for _ in 0..200 {
            assert_eq!(EngineConfig::load(&path).unwrap(), config);
        }
        writer.join().unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![OsString::from("stevedore.json")]);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stevedore.json");
        fs::write(&path, r#"{"force_background": true}"#).unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.force_background, Some(true));
        assert_eq!(config.max_run_logs, 10);
        assert!(config.capabilities().force_background);
    }

    #[test]
    fn invalid_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stevedore.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            EngineConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn secret_is_redacted() {
        let mut config = EngineConfig::default();
        config.ensure_secret();
        let shown = config.redacted();
        assert_eq!(shown.secret.as_deref(), Some("********"));
        assert_ne!(config.secret, shown.secret);
    }

    #[test]
    fn executable_resolution_order() {
        let exe = || Ok(PathBuf::from("/usr/bin/stevedore"));
        assert_eq!(
            pick_executable(Some("/opt/a".into()), Some("/opt/b".into()), exe).unwrap(),
            PathBuf::from("/opt/a")
        );
        assert_eq!(
            pick_executable(None, Some("/opt/b".into()), exe).unwrap(),
            PathBuf::from("/opt/b")
        );
        assert_eq!(
            pick_executable(None, None, exe).unwrap(),
            PathBuf::from("/usr/bin/stevedore")
        );
    }

    #[test]
    fn overrides_replace_probed_values() {
        let config = EngineConfig {
            can_fork: Some(false),
            force_background: Some(true),
            executable_args: vec!["-q".into()],
            ..EngineConfig::default()
        };
        let caps = Capabilities::probe().with_overrides(&config);
        assert_eq!(
            caps,
            Capabilities {
                can_fork: false,
                force_background: true,
                extra_args: vec!["-q".into()],
            }
        );
    }
}
