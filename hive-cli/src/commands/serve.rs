//! `hive serve`: run a manager in the foreground

use anyhow::{Context, Result};
use hive_config::HiveConfig;
use hive_ipc::Message;
use hive_manager::{CommandSpawner, ConnectionRegistry, Manager, ManagerHooks, WorkerLaunch};
use std::path::PathBuf;
use tokio::signal;
use tracing::{info, warn};

/// Logs worker events; the manager itself does the rest
#[derive(Debug, Default)]
pub struct ServeHooks {
    ticks: u64,
    messages: u64,
}

impl ServeHooks {
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

impl ManagerHooks for ServeHooks {
    fn on_tick(&mut self, _workers: &mut ConnectionRegistry) {
        self.ticks += 1;
    }

    fn on_new_worker(&mut self, workers: &mut ConnectionRegistry, index: usize) {
        let label = workers.label(index).unwrap_or("?");
        info!("Worker {} joined ({})", index, label);
    }

    fn on_worker_disconnect(&mut self, _workers: &mut ConnectionRegistry, index: usize) {
        warn!("Worker {} disconnected", index);
    }

    fn handle_msg(&mut self, _workers: &mut ConnectionRegistry, index: usize, msg: Message) {
        self.messages += 1;
        info!("Worker {}: {:?}", index, msg);
    }
}

pub struct ServeOptions<'a> {
    pub workers: usize,
    pub kind: &'a str,
    pub worker_args: &'a [String],
    pub ticks: Option<u64>,
    pub config_path: Option<&'a PathBuf>,
    pub log_level: Option<&'a str>,
}

/// Bind, print credentials, spawn local workers and tick until Ctrl+C or the
/// tick budget runs out
pub async fn run(config: &HiveConfig, options: ServeOptions<'_>) -> Result<()> {
    let mut spawner = CommandSpawner::current_exe()?;
    // Local workers load the same configuration as their manager
    if let Some(path) = options.config_path {
        spawner = spawner.arg("--config").arg(path.display().to_string());
    }
    if let Some(level) = options.log_level {
        spawner = spawner.arg("--log-level").arg(level);
    }

    let mut manager = Manager::bind(&config.listener, &config.manager, ServeHooks::default())
        .await
        .context("Failed to start manager")?
        .with_spawner(spawner);

    let credentials = manager.get_client_credentials();
    println!(
        "{}",
        serde_json::to_string(&credentials).context("Failed to serialize credentials")?
    );
    info!(
        "Remote workers can join with: hive worker --connect {} --auth-key <key>",
        credentials.endpoint()
    );

    for _ in 0..options.workers {
        let launch = options
            .worker_args
            .iter()
            .fold(WorkerLaunch::new(options.kind), |launch, arg| launch.arg(arg.as_str()));
        let index = manager
            .create_local_worker(launch)
            .context("Failed to spawn local worker")?;
        info!("Local worker {} started", index);
    }

    let ticks = options.ticks;
    tokio::select! {
        _ = manager.run_until(|m| ticks.is_some_and(|n| m.hooks().ticks() >= n)) => {
            info!("Tick budget reached");
        }
        result = signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            info!("Ctrl+C received");
        }
    }

    let report = manager.stop().await;
    if !report.is_clean() {
        warn!("Killed {} unresponsive workers", report.killed.len());
    }
    info!(
        "Manager handled {} messages over {} ticks",
        manager.hooks().messages,
        manager.hooks().ticks()
    );
    Ok(())
}
