//! stevedore CLI
//!
//! `run-task` is what the runner re-invokes in the background; the other
//! commands enqueue, inspect and spawn tasks.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context as _, bail};
use clap::{ArgAction, Parser, Subcommand};
use serde_json::json;
use stevedore_core::app::{AppBuilder, Engine, LaunchSpec, RunLock, SpawnReport};
use stevedore_core::config::{EngineConfig, HomeLocator, Paths};
use stevedore_core::domain::{TaskId, TaskMetadata, TaskRecord};
use stevedore_core::impls::{ComposerCli, JsonTaskStore, LazyPackageManager};
use stevedore_core::ports::PackageManager;
use stevedore_core::tasks::{BUILTIN_TASK_TYPES, register_builtin_tasks};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Queue and run package-management tasks
#[derive(Parser, Debug)]
#[command(name = "stevedore")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Project home (defaults to $STEVEDORE_HOME, then the working directory)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// More logging (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Perform a pending task in this process
    RunTask {
        id: TaskId,
        /// The run lock is already held and passed on stdin (set by the runner)
        #[arg(long, hide = true)]
        inherited_lock: bool,
    },
    /// List all tasks
    ListTasks,
    /// Create a pending task and print its id
    AddTask {
        /// Task type, e.g. `install`
        task_type: String,
        /// JSON payload
        #[arg(long, default_value = "{}")]
        payload: String,
    },
    /// Run a task in a background process
    SpawnTask { id: TaskId },
    /// Show a task's status and output
    ShowTask { id: TaskId },
    /// Print the effective configuration
    Config,
}

struct Context {
    paths: Paths,
    config: EngineConfig,
    engine: Engine,
}

impl Context {
    fn open(home: Option<PathBuf>) -> anyhow::Result<Self> {
        let home = HomeLocator::locate(home)?;
        let paths = Paths::new(home);
        paths
            .ensure()
            .with_context(|| format!("cannot prepare {}", paths.data_dir().display()))?;

        let mut config = EngineConfig::load(&paths.config_file())?;
        if config.ensure_secret() {
            config.save(&paths.config_file())?;
            debug!(path = %paths.config_file().display(), "generated secret");
        }

        let builder = AppBuilder::new()
            .with_store(Arc::new(JsonTaskStore::new(paths.tasks_file())))
            .with_home(paths.home());
        let engine = register_builtin_tasks(builder, package_manager(&config, &paths))?
            .expect_tasks(&BUILTIN_TASK_TYPES)
            .build()?;

        Ok(Self {
            paths,
            config,
            engine,
        })
    }

    fn launch_spec(&self) -> anyhow::Result<LaunchSpec> {
        Ok(LaunchSpec {
            executable: self.config.resolve_executable()?,
            home: self.paths.home().to_path_buf(),
            environment: self.config.environment.clone(),
            capabilities: self.config.capabilities(),
            log_dir: self.paths.log_dir(),
            max_run_logs: self.config.max_run_logs,
        })
    }

    fn task(&self, id: &TaskId) -> anyhow::Result<TaskRecord> {
        match self.engine.get_task(id)? {
            Some(record) => Ok(record),
            None => bail!("task {id} not found"),
        }
    }
}

/// Built on first use, so commands that never run a task don't need composer.
fn package_manager(config: &EngineConfig, paths: &Paths) -> Arc<LazyPackageManager> {
    let binary = config.package_manager.clone();
    let environment = config.environment.clone();
    let home = paths.home().to_path_buf();
    Arc::new(LazyPackageManager::new(move || {
        let cli = ComposerCli::locate(&binary, home.clone())?.with_environment(environment.clone());
        Ok(Arc::new(cli) as Arc<dyn PackageManager>)
    }))
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = if verbose > 0 {
        EnvFilter::new(level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };
    // stderr, so that a task subprocess' diagnostics end up in its run log
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let ctx = Context::open(args.home)?;

    match args.command {
        Command::RunTask { id, inherited_lock } => run_task(&ctx, &id, inherited_lock).await,
        Command::ListTasks => list_tasks(&ctx),
        Command::AddTask { task_type, payload } => add_task(&ctx, task_type, &payload),
        Command::SpawnTask { id } => spawn_task(&ctx, &id).await,
        Command::ShowTask { id } => show_task(&ctx, &id),
        Command::Config => show_config(&ctx),
    }
}

async fn run_task(ctx: &Context, id: &TaskId, inherited_lock: bool) -> anyhow::Result<()> {
    let mut lock = RunLock::at(ctx.paths.run_lock());
    let held = if inherited_lock {
        lock.adopt_inherited()?
    } else {
        lock.try_acquire()?
    };
    if !held {
        bail!("busy: another task is running");
    }

    let record = ctx.engine.executor().perform(id).await?;
    lock.release()?;

    if let Some(output) = &record.output {
        println!("{output}");
    }
    if let Some(error) = &record.error {
        println!("{error}");
    }
    info!(task_id = %id, status = %record.status, "task done");
    Ok(())
}

fn list_tasks(ctx: &Context) -> anyhow::Result<()> {
    for task in ctx.engine.tasks()? {
        println!("{} {} (state: {})", task.id, task.task_type, task.status);
    }
    Ok(())
}

fn add_task(ctx: &Context, task_type: String, payload: &str) -> anyhow::Result<()> {
    let payload: serde_json::Value =
        serde_json::from_str(payload).context("--payload is not valid JSON")?;

    match ctx.engine.create_task(TaskMetadata::new(task_type.clone(), payload))? {
        Some(record) => {
            println!("{}", record.id);
            Ok(())
        }
        None => bail!(
            "no task created: unknown task type '{task_type}' (known: {})",
            ctx.engine.registered_types().join(", ")
        ),
    }
}

async fn spawn_task(ctx: &Context, id: &TaskId) -> anyhow::Result<()> {
    let runner = ctx.engine.runner(ctx.paths.run_lock(), ctx.launch_spec()?);

    match runner.run(id).await? {
        SpawnReport::Detached { pid, log_file } => {
            let pid = pid.map_or_else(|| "?".to_string(), |p| p.to_string());
            println!("spawned task {id} (pid {pid}), log: {}", log_file.display());
        }
        SpawnReport::Completed {
            exit_code: Some(0),
            log_file,
        } => {
            println!("task {id} process done, log: {}", log_file.display());
        }
        SpawnReport::Completed {
            exit_code,
            log_file,
        } => bail!(
            "task process exited with status {exit_code:?}, see {}",
            log_file.display()
        ),
    }
    Ok(())
}

fn show_task(ctx: &Context, id: &TaskId) -> anyhow::Result<()> {
    let task = ctx.task(id)?;
    println!("id:      {}", task.id);
    println!("type:    {}", task.task_type);
    println!("status:  {}", task.status);
    println!("created: {}", task.created_at);
    if let Some(finished) = task.finished_at {
        println!("ended:   {finished}");
    }
    if let Some(error) = &task.error {
        println!("error:   {error}");
    }
    if let Some(output) = &task.output {
        println!("output:\n{output}");
    }
    if let Some(log) = &task.install_log {
        println!("install log:\n{}", serde_json::to_string_pretty(log)?);
    }
    Ok(())
}

fn show_config(ctx: &Context) -> anyhow::Result<()> {
    let executable = ctx
        .config
        .resolve_executable()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|e| format!("<{e}>"));
    let effective = json!({
        "home": ctx.paths.home(),
        "data_dir": ctx.paths.data_dir(),
        "executable": executable,
        "capabilities": ctx.config.capabilities(),
        "config": ctx.config.redacted(),
    });
    println!("{}", serde_json::to_string_pretty(&effective)?);
    Ok(())
}
