//! TaskRunner - `run-task <id>` サブプロセスの起動
//!
//! # フロー
//! 1. run lock を試す（取れなければ Busy、何も起動しない）
//! 2. task の存在と PENDING を確認
//! 3. 実行ファイルを検証（Configuration）
//! 4. ログをローテートして新しいログファイルを開く
//! 5. spawn。lock のファイルを子の stdin として渡す（unix）。子は
//!    `--inherited-lock` でそれを引き継ぎ、終了まで保持する
//! 6. can_fork なら待たない、そうでなければ終了を待つ
//!
//! The lock is never free between the probe and the child taking it over.
//! Elsewhere than unix the runner keeps the lock itself and always waits.
//!
//! The runner reports whether the spawn worked. The task outcome is read
//! from the record later.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::run_lock::{LockError, RunLock};
use crate::config::Capabilities;
use crate::domain::{ErrorKind, StoreError, TaskId, TaskStatus};
use crate::ports::{Clock, TaskStore};

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("another task is running")]
    Busy,

    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    #[error("task {id} is {status}, only pending tasks can be run")]
    NotPending { id: TaskId, status: TaskStatus },

    #[error("runner is misconfigured: {0}")]
    Configuration(String),

    #[error("failed to spawn {executable}: {source}")]
    Spawn {
        executable: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write run log {path}: {source}")]
    Log {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed waiting for the task process: {0}")]
    Wait(#[source] io::Error),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RunnerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RunnerError::Busy => ErrorKind::Busy,
            RunnerError::TaskNotFound(_) => ErrorKind::NotFound,
            RunnerError::NotPending { .. } => ErrorKind::Execution,
            RunnerError::Configuration(_) => ErrorKind::Configuration,
            RunnerError::Spawn { .. } | RunnerError::Wait(_) => ErrorKind::Spawn,
            RunnerError::Log { .. } => ErrorKind::Storage,
            RunnerError::Lock(e) => e.kind(),
            RunnerError::Store(e) => e.kind(),
        }
    }
}

/// How to re-invoke the program, computed once from configuration.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub executable: PathBuf,
    /// Passed as `--home`, so the child opens the same store.
    pub home: PathBuf,
    pub environment: BTreeMap<String, String>,
    pub capabilities: Capabilities,
    pub log_dir: PathBuf,
    pub max_run_logs: usize,
}

/// Tells `run-task` that the run lock arrives on stdin.
pub const INHERITED_LOCK_FLAG: &str = "--inherited-lock";

impl LaunchSpec {
    /// `<extra-args…> --home <home> run-task --inherited-lock <id>`
    pub fn args(&self, id: &TaskId) -> Vec<String> {
        let mut args = self.capabilities.extra_args.clone();
        args.extend([
            "--home".to_string(),
            self.home.display().to_string(),
            "run-task".to_string(),
            INHERITED_LOCK_FLAG.to_string(),
            id.to_string(),
        ]);
        args
    }

    /// Whether `run` returns without waiting for the child.
    pub fn detaches(&self) -> bool {
        cfg!(unix) && self.capabilities.can_fork
    }

    /// Resolve the executable, failing if it cannot be run.
    pub fn validate(&self) -> Result<PathBuf, RunnerError> {
        which::which(&self.executable).map_err(|e| {
            RunnerError::Configuration(format!(
                "executable {} is not usable: {e}",
                self.executable.display()
            ))
        })
    }
}

/// What happened to the spawned process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnReport {
    /// Running in the background.
    Detached { pid: Option<u32>, log_file: PathBuf },
    /// Waited for; `exit_code` is `None` when killed by a signal.
    Completed {
        exit_code: Option<i32>,
        log_file: PathBuf,
    },
}

impl SpawnReport {
    pub fn log_file(&self) -> &Path {
        match self {
            SpawnReport::Detached { log_file, .. } | SpawnReport::Completed { log_file, .. } => {
                log_file
            }
        }
    }
}

pub struct TaskRunner {
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    lock_path: PathBuf,
    launch: LaunchSpec,
}

impl TaskRunner {
    pub(crate) fn new(
        store: Arc<dyn TaskStore>,
        clock: Arc<dyn Clock>,
        lock_path: PathBuf,
        launch: LaunchSpec,
    ) -> Self {
        Self {
            store,
            clock,
            lock_path,
            launch,
        }
    }

    pub async fn run(&self, id: &TaskId) -> Result<SpawnReport, RunnerError> {
        let mut lock = RunLock::at(&self.lock_path);
        if !lock.try_acquire()? {
            warn!(task_id = %id, "run lock busy, not spawning");
            return Err(RunnerError::Busy);
        }

        let record = self
            .store
            .get_task(id)?
            .ok_or_else(|| RunnerError::TaskNotFound(id.clone()))?;
        if record.status != TaskStatus::Pending {
            return Err(RunnerError::NotPending {
                id: id.clone(),
                status: record.status,
            });
        }

        let executable = self.launch.validate()?;
        let (log_path, log) = self.open_log(id)?;

        #[cfg(unix)]
        let stdin = lock.hand_off().map_or_else(Stdio::null, Stdio::from);
        #[cfg(not(unix))]
        let stdin = Stdio::null();
        let mut child = self.spawn(&executable, id, stdin, log, &log_path)?;
        let pid = child.id();

        if self.launch.detaches() {
            info!(task_id = %id, ?pid, log = %log_path.display(), "task process detached");
            return Ok(SpawnReport::Detached {
                pid,
                log_file: log_path,
            });
        }

        let status = child.wait().await.map_err(RunnerError::Wait)?;
        info!(task_id = %id, ?pid, exit_code = ?status.code(), "task process exited");
        Ok(SpawnReport::Completed {
            exit_code: status.code(),
            log_file: log_path,
        })
    }

    fn spawn(
        &self,
        executable: &Path,
        id: &TaskId,
        stdin: Stdio,
        log: File,
        log_path: &Path,
    ) -> Result<tokio::process::Child, RunnerError> {
        let log_error = |source| RunnerError::Log {
            path: log_path.to_path_buf(),
            source,
        };
        let stdout = log.try_clone().map_err(log_error)?;

        let mut command = Command::new(executable);
        command
            .args(self.launch.args(id))
            .envs(&self.launch.environment)
            .stdin(stdin)
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(log));

        #[cfg(unix)]
        if self.launch.capabilities.force_background {
            command.process_group(0);
        }

        debug!(task_id = %id, executable = %executable.display(), "spawning task process");
        command.spawn().map_err(|source| RunnerError::Spawn {
            executable: executable.to_path_buf(),
            source,
        })
    }

    /// Drop the oldest logs of `id` so that, with the new one, at most
    /// `max_run_logs` remain; then create the new one.
    fn open_log(&self, id: &TaskId) -> Result<(PathBuf, File), RunnerError> {
        let dir = &self.launch.log_dir;
        fs::create_dir_all(dir).map_err(|source| RunnerError::Log {
            path: dir.clone(),
            source,
        })?;

        let mut existing = run_logs(dir, id).map_err(|source| RunnerError::Log {
            path: dir.clone(),
            source,
        })?;
        existing.sort();
        let keep = self.launch.max_run_logs.max(1) - 1;
        let excess = existing.len().saturating_sub(keep);
        for old in existing.drain(..excess) {
            debug!(path = %old.display(), "removing old run log");
            if let Err(e) = fs::remove_file(&old) {
                warn!(path = %old.display(), error = %e, "could not remove old run log");
            }
        }

        let stamp = self.clock.now().format("%Y%m%dT%H%M%S%.3fZ");
        let path = dir.join(format!("{id}-{stamp}.log"));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| RunnerError::Log {
                path: path.clone(),
                source,
            })?;
        Ok((path, file))
    }
}

/// Log files of `id`: `<id>-<stamp>.log` where the stamp has no `-`.
fn run_logs(dir: &Path, id: &TaskId) -> io::Result<Vec<PathBuf>> {
    let prefix = format!("{id}-");
    let mut logs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let is_ours = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(".log"))
            .is_some_and(|stamp| !stamp.is_empty() && !stamp.contains('-'));
        if is_ours {
            logs.push(entry.path());
        }
    }
    Ok(logs)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::domain::{TaskRecord, TaskType};
    use crate::impls::InMemoryTaskStore;
    use crate::ports::FixedClock;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        store: Arc<InMemoryTaskStore>,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(InMemoryTaskStore::new());
            let record = TaskRecord::new(
                "T1".parse().unwrap(),
                TaskType::new("install"),
                json!({}),
                Utc::now(),
            );
            store.add(record).unwrap();
            let second = TaskRecord::new(
                "T2".parse().unwrap(),
                TaskType::new("install"),
                json!({}),
                Utc::now(),
            );
            store.add(second).unwrap();
            Self {
                dir: TempDir::new().unwrap(),
                store,
            }
        }

        fn script(&self, body: &str) -> PathBuf {
            let path = self.dir.path().join("fake-stevedore");
            fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn launch(&self, executable: PathBuf, can_fork: bool) -> LaunchSpec {
            LaunchSpec {
                executable,
                home: self.dir.path().to_path_buf(),
                environment: BTreeMap::from([("STEVEDORE_TEST".into(), "yes".into())]),
                capabilities: Capabilities {
                    can_fork,
                    force_background: true,
                    extra_args: vec!["--quiet".into()],
                },
                log_dir: self.dir.path().join("logs"),
                max_run_logs: 2,
            }
        }

        fn runner(&self, launch: LaunchSpec) -> TaskRunner {
            let at = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
            TaskRunner::new(
                self.store.clone(),
                Arc::new(FixedClock::new(at)),
                self.dir.path().join("task-run"),
                launch,
            )
        }
    }

    #[tokio::test]
    async fn synchronous_run_reports_exit_code_and_captures_output() {
        let fx = Fixture::new();
        let exe = fx.script("echo \"args: $*\"; echo \"env: $STEVEDORE_TEST\" >&2; exit 3");
        let runner = fx.runner(fx.launch(exe, false));

        let report = runner.run(&"T1".parse().unwrap()).await.unwrap();
        let SpawnReport::Completed { exit_code, log_file } = report else {
            panic!("expected a completed run, got {report:?}");
        };
        assert_eq!(exit_code, Some(3));

        let log = fs::read_to_string(&log_file).unwrap();
        let home = fx.dir.path().display();
        assert!(log.contains(&format!(
            "args: --quiet --home {home} run-task --inherited-lock T1"
        )));
        assert!(log.contains("env: yes"));
        assert_eq!(
            log_file.file_name().unwrap().to_str().unwrap(),
            "T1-20261018T120000.000Z.log"
        );
    }

    #[tokio::test]
    async fn detached_run_returns_pid() {
        let fx = Fixture::new();
        let exe = fx.script("exit 0");
        let runner = fx.runner(fx.launch(exe, true));

        let report = runner.run(&"T1".parse().unwrap()).await.unwrap();
        assert!(matches!(report, SpawnReport::Detached { pid: Some(_), .. }));
        assert!(report.log_file().exists());
    }

    #[tokio::test]
    async fn held_lock_means_busy_and_nothing_spawned() {
        let fx = Fixture::new();
        let exe = fx.script("exit 0");
        let runner = fx.runner(fx.launch(exe, false));

        let mut held = RunLock::at(fx.dir.path().join("task-run"));
        assert!(held.try_acquire().unwrap());

        let err = runner.run(&"T1".parse().unwrap()).await.unwrap_err();
        assert!(matches!(err, RunnerError::Busy));
        assert_eq!(err.kind(), ErrorKind::Busy);
        assert!(!fx.dir.path().join("logs").exists());
    }

    #[tokio::test]
    async fn detached_child_keeps_the_lock_until_it_exits() {
        let fx = Fixture::new();
        let exe = fx.script("sleep 1");
        let runner = fx.runner(fx.launch(exe, true));

        let first = runner.run(&"T1".parse().unwrap()).await.unwrap();
        assert!(matches!(first, SpawnReport::Detached { .. }));

        let err = runner.run(&"T2".parse().unwrap()).await.unwrap_err();
        assert!(matches!(err, RunnerError::Busy));

        let mut lock = RunLock::at(fx.dir.path().join("task-run"));
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
        while !lock.try_acquire().unwrap() {
            assert!(std::time::Instant::now() < deadline, "child never let go of the lock");
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    }

    #[tokio::test]
    async fn child_receives_the_locked_handle_on_stdin() {
        let fx = Fixture::new();
        let lock_path = fx.dir.path().join("task-run");
        // fd 0 must be the lock file itself
        let exe = fx.script(&format!(
            "[ /dev/fd/0 -ef \"{}\" ] || exit 7",
            lock_path.display()
        ));
        let runner = fx.runner(fx.launch(exe, false));

        let report = runner.run(&"T1".parse().unwrap()).await.unwrap();
        assert!(matches!(report, SpawnReport::Completed { exit_code: Some(0), .. }));
    }

    #[tokio::test]
    async fn lock_is_free_after_a_run() {
        let fx = Fixture::new();
        let exe = fx.script("exit 0");
        let runner = fx.runner(fx.launch(exe, false));

        runner.run(&"T1".parse().unwrap()).await.unwrap();
        let mut lock = RunLock::at(fx.dir.path().join("task-run"));
        assert!(lock.try_acquire().unwrap());
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let fx = Fixture::new();
        let exe = fx.script("exit 0");
        let runner = fx.runner(fx.launch(exe, false));

        let err = runner.run(&"nope".parse().unwrap()).await.unwrap_err();
        assert!(matches!(err, RunnerError::TaskNotFound(_)));
    }

    #[tokio::test]
    async fn missing_executable_is_a_configuration_error() {
        let fx = Fixture::new();
        let runner = fx.runner(fx.launch(fx.dir.path().join("missing"), false));

        let err = runner.run(&"T1".parse().unwrap()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn finished_tasks_are_not_spawned_again() {
        let fx = Fixture::new();
        let id: TaskId = "T1".parse().unwrap();
        fx.store
            .update(&id, &mut |r| {
                r.start(Utc::now())?;
                r.finish(Utc::now())
            })
            .unwrap();
        let runner = fx.runner(fx.launch(fx.script("exit 0"), false));

        let err = runner.run(&id).await.unwrap_err();
        assert!(matches!(
            err,
            RunnerError::NotPending { status: TaskStatus::Finished, .. }
        ));
    }

    #[tokio::test]
    async fn old_logs_are_rotated() {
        let fx = Fixture::new();
        let logs = fx.dir.path().join("logs");
        fs::create_dir_all(&logs).unwrap();
        for stamp in ["20260101T000000.000Z", "20260102T000000.000Z"] {
            fs::write(logs.join(format!("T1-{stamp}.log")), "old").unwrap();
        }
        // another task's log with a prefix-sharing id
        fs::write(logs.join("T1-x-20260101T000000.000Z.log"), "other").unwrap();

        let runner = fx.runner(fx.launch(fx.script("exit 0"), false));
        runner.run(&"T1".parse().unwrap()).await.unwrap();

        let mut names: Vec<String> = fs::read_dir(&logs)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "T1-20260102T000000.000Z.log",
                "T1-20261018T120000.000Z.log",
                "T1-x-20260101T000000.000Z.log",
            ]
        );
    }
}
