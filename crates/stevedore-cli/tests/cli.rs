use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};
use tempfile::TempDir;

const BIN: &str = env!("CARGO_BIN_EXE_stevedore");

struct Home {
    dir: TempDir,
}

impl Home {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn data_dir(&self) -> PathBuf {
        self.path().join("stevedore")
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::new(BIN);
        cmd.env_remove("STEVEDORE_HOME")
            .env_remove("STEVEDORE_EXECUTABLE")
            .env_remove("RUST_LOG")
            .arg("--home")
            .arg(self.path());
        cmd
    }

    fn write_config(&self, config: Value) {
        fs::create_dir_all(self.data_dir()).unwrap();
        fs::write(
            self.data_dir().join("stevedore.json"),
            serde_json::to_string_pretty(&config).unwrap(),
        )
        .unwrap();
    }

    fn add_task(&self, task_type: &str, payload: Value) -> String {
        let out = self
            .cmd()
            .args(["add-task", task_type, "--payload", &payload.to_string()])
            .output()
            .unwrap();
        assert!(out.status.success(), "add-task failed: {out:?}");
        String::from_utf8(out.stdout).unwrap().trim().to_string()
    }

    fn task(&self, id: &str) -> Value {
        let text = fs::read_to_string(self.data_dir().join("tasks.json")).unwrap();
        let doc: Value = serde_json::from_str(&text).unwrap();
        doc["tasks"]
            .as_array()
            .unwrap()
            .iter()
            .find(|t| t["id"] == id)
            .cloned()
            .unwrap()
    }
}

fn install_payload() -> Value {
    json!({"package": "vendor/package", "version": "1.0.0"})
}

#[test]
fn list_tasks_prints_id_type_and_state() {
    let home = Home::new();
    let first = home.add_task("install", install_payload());
    let second = home.add_task("upgrade", json!({}));

    home.cmd()
        .arg("list-tasks")
        .assert()
        .success()
        .stdout(predicate::str::diff(format!(
            "{first} install (state: PENDING)\n{second} upgrade (state: PENDING)\n"
        )));
}

#[test]
fn unknown_type_creates_nothing() {
    let home = Home::new();

    home.cmd()
        .args(["add-task", "self-update"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("no task created"));

    home.cmd().arg("list-tasks").assert().success().stdout("");
}

#[test]
fn invalid_payload_is_rejected() {
    let home = Home::new();

    home.cmd()
        .args(["add-task", "require-package", "--payload", r#"{"packages": []}"#])
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least one package"));
}

#[test]
fn run_task_with_unknown_id_fails_and_leaves_store_alone() {
    let home = Home::new();
    let id = home.add_task("install", install_payload());
    let before = fs::read(home.data_dir().join("tasks.json")).unwrap();

    home.cmd()
        .args(["run-task", "task-DOESNOTEXIST"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("not found"));

    assert_eq!(fs::read(home.data_dir().join("tasks.json")).unwrap(), before);
    assert_eq!(home.task(&id)["status"], "PENDING");
}

#[test]
fn config_redacts_the_secret() {
    let home = Home::new();

    home.cmd()
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"secret\": \"********\""))
        .stdout(predicate::str::contains("\"package_manager\": \"composer\""));

    let saved: Value =
        serde_json::from_str(&fs::read_to_string(home.data_dir().join("stevedore.json")).unwrap())
            .unwrap();
    assert_eq!(saved["secret"].as_str().unwrap().len(), 64);
}

#[cfg(unix)]
mod with_fake_composer {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use stevedore_core::app::RunLock;

    fn fake_composer(home: &Home, body: &str) -> PathBuf {
        let path = home.path().join("fake-composer");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn configure(home: &Home, composer_body: &str) {
        let composer = fake_composer(home, composer_body);
        home.write_config(json!({
            "package_manager": composer,
            "executable": BIN,
            "can_fork": false,
        }));
    }

    // like composer, create-project only accepts a missing or empty target
    const INSTALLS: &str = r#"if [ -n "$(ls -A "$3" 2>/dev/null)" ]; then
  echo "Project directory $3 is not empty." >&2
  exit 1
fi
mkdir -p "$3" && echo '{}' > "$3/composer.json"
echo "Installing $2 ($4)"
echo "  - Installing $2 ($4): Extracting archive" >&2"#;

    fn wait_until_done(home: &Home, id: &str) -> Value {
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(20);
        loop {
            let task = home.task(id);
            if task["status"] == "FINISHED" || task["status"] == "FAILED" {
                return task;
            }
            assert!(std::time::Instant::now() < deadline, "task {id} never finished");
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
    }

    #[test]
    fn run_task_finishes_and_records_install_log() {
        let home = Home::new();
        configure(&home, INSTALLS);
        let id = home.add_task("install", install_payload());

        home.cmd()
            .args(["run-task", &id])
            .assert()
            .success()
            .stdout(predicate::str::contains("installed vendor/package (1.0.0)"));

        let task = home.task(&id);
        assert_eq!(task["status"], "FINISHED");
        assert!(home.path().join("composer.json").is_file());
        assert!(!home.data_dir().join("staging").join(&id).exists());
        assert_eq!(task["install_log"]["vendor/package"]["type"], "install");
        assert_eq!(
            task["install_log"]["vendor/package"]["package"]["version"],
            "1.0.0"
        );

        home.cmd()
            .args(["show-task", &id])
            .assert()
            .success()
            .stdout(predicate::str::contains("status:  FINISHED"));
    }

    #[test]
    fn install_does_not_overwrite_project_files_in_home() {
        let home = Home::new();
        configure(&home, INSTALLS);
        fs::write(home.path().join("composer.json"), "mine").unwrap();
        let id = home.add_task("install", install_payload());

        home.cmd().args(["run-task", &id]).assert().success();

        let task = home.task(&id);
        assert_eq!(task["status"], "FAILED");
        assert!(task["error"].as_str().unwrap().contains("refusing to overwrite"));
        assert_eq!(fs::read_to_string(home.path().join("composer.json")).unwrap(), "mine");
    }

    #[test]
    fn failing_package_manager_marks_task_failed() {
        let home = Home::new();
        configure(&home, "echo 'Could not find package vendor/package' >&2; exit 1");
        let id = home.add_task("install", install_payload());

        // task-level failure is recorded, the process itself succeeds
        home.cmd().args(["run-task", &id]).assert().success();

        let task = home.task(&id);
        assert_eq!(task["status"], "FAILED");
        assert!(
            task["error"]
                .as_str()
                .unwrap()
                .contains("Could not find package vendor/package")
        );
    }

    #[test]
    fn tasks_run_only_once() {
        let home = Home::new();
        configure(&home, INSTALLS);
        let id = home.add_task("install", install_payload());

        home.cmd().args(["run-task", &id]).assert().success();
        home.cmd()
            .args(["run-task", &id])
            .assert()
            .failure()
            .stderr(predicate::str::contains("already been run"));
    }

    #[test]
    fn run_task_is_refused_while_another_runs() {
        let home = Home::new();
        configure(&home, INSTALLS);
        let id = home.add_task("install", install_payload());

        let mut lock = RunLock::in_dir(&home.data_dir());
        assert!(lock.try_acquire().unwrap());

        home.cmd()
            .args(["run-task", &id])
            .assert()
            .failure()
            .code(1)
            .stderr(predicate::str::contains("busy"));
        assert_eq!(home.task(&id)["status"], "PENDING");

        lock.release().unwrap();
        home.cmd().args(["run-task", &id]).assert().success();
        assert_eq!(home.task(&id)["status"], "FINISHED");
    }

    #[test]
    fn spawn_task_runs_the_task_in_a_subprocess() {
        let home = Home::new();
        configure(&home, INSTALLS);
        let id = home.add_task("install", install_payload());

        home.cmd()
            .args(["spawn-task", &id])
            .assert()
            .success()
            .stdout(predicate::str::contains("log:"));

        assert_eq!(home.task(&id)["status"], "FINISHED");

        let logs: Vec<_> = fs::read_dir(home.data_dir().join("logs"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(logs.len(), 1);
        let log = fs::read_to_string(&logs[0]).unwrap();
        assert!(log.contains("installed vendor/package (1.0.0)"));
    }

    #[test]
    fn spawn_task_reports_busy() {
        let home = Home::new();
        configure(&home, INSTALLS);
        let id = home.add_task("install", install_payload());

        let mut lock = RunLock::in_dir(&home.data_dir());
        assert!(lock.try_acquire().unwrap());

        home.cmd()
            .args(["spawn-task", &id])
            .assert()
            .failure()
            .stderr(predicate::str::contains("another task is running"));
        assert_eq!(home.task(&id)["status"], "PENDING");
    }

    #[test]
    fn concurrent_spawns_start_one_task_and_refuse_the_other() {
        let home = Home::new();
        let composer = fake_composer(&home, &format!("sleep 1\n{INSTALLS}"));
        home.write_config(json!({
            "package_manager": composer,
            "executable": BIN,
            "can_fork": true,
        }));
        let first = home.add_task("install", install_payload());
        let second = home.add_task(
            "install",
            json!({
                "package": "vendor/other",
                "version": "2.0.0",
                "destination": home.path().join("other"),
            }),
        );

        home.cmd()
            .args(["spawn-task", &first])
            .assert()
            .success()
            .stdout(predicate::str::contains("spawned task"));
        home.cmd()
            .args(["spawn-task", &second])
            .assert()
            .failure()
            .stderr(predicate::str::contains("another task is running"));

        assert_eq!(wait_until_done(&home, &first)["status"], "FINISHED");
        assert_eq!(home.task(&second)["status"], "PENDING");

        home.cmd().args(["spawn-task", &second]).assert().success();
        assert_eq!(wait_until_done(&home, &second)["status"], "FINISHED");
        assert!(home.path().join("other/composer.json").is_file());
    }

    #[test]
    fn spawn_task_with_missing_executable_is_a_configuration_error() {
        let home = Home::new();
        let composer = fake_composer(&home, INSTALLS);
        home.write_config(json!({
            "package_manager": composer,
            "executable": home.path().join("no-such-binary"),
            "can_fork": false,
        }));
        let id = home.add_task("install", install_payload());

        home.cmd()
            .args(["spawn-task", &id])
            .assert()
            .failure()
            .stderr(predicate::str::contains("misconfigured"));
    }
}
