//! Spawning local workers and the process handles the supervisor joins

use async_trait::async_trait;
use hive_config::WorkerConfig;
use hive_ipc::{Channel, StreamChannel};
use hive_worker::{WorkerError, WorkerHooks, WorkerRuntime};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{ManagerError, ManagerResult};

/// What to run in a new local worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerLaunch {
    /// Worker kind understood by the spawner (e.g. `echo`)
    pub kind: String,
    /// Arguments handed to the worker kind (`key=value` for the built-ins)
    pub args: Vec<String>,
}

impl WorkerLaunch {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// A running local worker as the supervisor sees it
#[async_trait]
pub trait ProcessHandle: Send {
    /// OS process id, when the worker is a real process
    fn id(&self) -> Option<u32>;

    /// Wait up to `timeout` for a natural exit; `Ok(true)` once it has exited
    async fn wait_timeout(&mut self, timeout: Duration) -> ManagerResult<bool>;

    /// Terminate forcefully
    async fn kill(&mut self) -> ManagerResult<()>;
}

/// Manager end of a freshly started worker
pub struct SpawnedWorker {
    pub channel: Box<dyn Channel>,
    pub process: Box<dyn ProcessHandle>,
}

/// Strategy for starting local workers
pub trait Spawner: Send + Sync {
    fn spawn(&self, launch: &WorkerLaunch) -> ManagerResult<SpawnedWorker>;
}

/// Starts workers as child processes talking over piped stdin/stdout
#[derive(Debug, Clone)]
pub struct CommandSpawner {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandSpawner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Re-run the current executable with its `worker` subcommand
    pub fn current_exe() -> ManagerResult<Self> {
        Ok(Self::new(std::env::current_exe()?).arg("worker"))
    }

    /// Argument placed before `--kind`
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl Spawner for CommandSpawner {
    fn spawn(&self, launch: &WorkerLaunch) -> ManagerResult<SpawnedWorker> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg("--kind")
            .arg(&launch.kind)
            .arg("--")
            .args(&launch.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ManagerError::SpawnFailed(format!("{}: {}", self.program.display(), e))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ManagerError::SpawnFailed("child stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ManagerError::SpawnFailed("child stdout not captured".to_string()))?;

        let pid = child.id().unwrap_or_default();
        info!("Spawned {} worker (pid {})", launch.kind, pid);

        Ok(SpawnedWorker {
            channel: Box::new(StreamChannel::from_child(
                stdin,
                stdout,
                format!("{}-{}", launch.kind, pid),
            )),
            process: Box::new(ChildProcess { child }),
        })
    }
}

/// Handle on a child process started by [`CommandSpawner`]
pub struct ChildProcess {
    child: Child,
}

#[async_trait]
impl ProcessHandle for ChildProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait_timeout(&mut self, timeout: Duration) -> ManagerResult<bool> {
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                debug!("Worker process exited with {}", status);
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    async fn kill(&mut self) -> ManagerResult<()> {
        self.child.kill().await?;
        Ok(())
    }
}

/// Builds worker hooks for an in-process launch
pub type WorkerFactory =
    Arc<dyn Fn(&WorkerLaunch) -> Result<Box<dyn WorkerHooks>, WorkerError> + Send + Sync>;

/// Runs each worker as a tokio task over an in-memory duplex channel.
///
/// The worker still only sees its end of the channel, so it behaves exactly
/// like a child process without the cost of one.
#[derive(Clone)]
pub struct InProcessSpawner {
    factory: WorkerFactory,
    config: WorkerConfig,
}

impl InProcessSpawner {
    pub fn new<F>(factory: F, config: WorkerConfig) -> Self
    where
        F: Fn(&WorkerLaunch) -> Result<Box<dyn WorkerHooks>, WorkerError> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            config,
        }
    }

    /// Resolve launches against the built-in worker kinds
    pub fn builtin(config: WorkerConfig) -> Self {
        Self::new(
            |launch| hive_worker::builtin(&launch.kind, &launch.args),
            config,
        )
    }
}

impl Spawner for InProcessSpawner {
    fn spawn(&self, launch: &WorkerLaunch) -> ManagerResult<SpawnedWorker> {
        let hooks = (self.factory)(launch).map_err(|e| ManagerError::SpawnFailed(e.to_string()))?;

        let (ours, theirs) = StreamChannel::pair(format!("{}-task", launch.kind));
        let runtime = WorkerRuntime::new(Box::new(theirs), hooks, &self.config)
            .map_err(|e| ManagerError::SpawnFailed(e.to_string()))?;

        let task = tokio::spawn(async move { runtime.run().await.map(|_| ()) });
        debug!("Started in-process {} worker", launch.kind);

        Ok(SpawnedWorker {
            channel: Box::new(ours),
            process: Box::new(TaskProcess::new(task)),
        })
    }
}

/// Handle on a worker task started by [`InProcessSpawner`]
pub struct TaskProcess {
    task: JoinHandle<Result<(), WorkerError>>,
    finished: bool,
}

impl TaskProcess {
    pub fn new(task: JoinHandle<Result<(), WorkerError>>) -> Self {
        Self {
            task,
            finished: false,
        }
    }
}

#[async_trait]
impl ProcessHandle for TaskProcess {
    fn id(&self) -> Option<u32> {
        None
    }

    async fn wait_timeout(&mut self, timeout: Duration) -> ManagerResult<bool> {
        if self.finished {
            return Ok(true);
        }

        match tokio::time::timeout(timeout, &mut self.task).await {
            Ok(joined) => {
                self.finished = true;
                match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => debug!("In-process worker ended with error: {}", e),
                    Err(e) => debug!("In-process worker task failed: {}", e),
                }
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    async fn kill(&mut self) -> ManagerResult<()> {
        self.task.abort();
        self.finished = true;
        Ok(())
    }
}
