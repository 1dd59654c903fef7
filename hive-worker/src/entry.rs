//! Process entry points for local and remote workers

use hive_config::WorkerConfig;
use hive_ipc::{ClientCredentials, StreamChannel};
use std::time::Duration;
use tracing::info;

use crate::error::WorkerError;
use crate::runtime::{WorkerHooks, WorkerRuntime};

/// Run a worker spawned by the manager, talking over this process' stdin/stdout
pub async fn run_local<H: WorkerHooks>(hooks: H, config: &WorkerConfig) -> Result<H, WorkerError> {
    info!("Starting local worker on stdio");
    let runtime = WorkerRuntime::new(Box::new(StreamChannel::stdio()), hooks, config)?;
    runtime.run().await
}

/// Dial a manager with its client credentials and run a worker over TCP
pub async fn run_remote<H: WorkerHooks>(
    credentials: &ClientCredentials,
    handshake_timeout: Duration,
    hooks: H,
    config: &WorkerConfig,
) -> Result<H, WorkerError> {
    let channel = hive_ipc::connect(credentials, handshake_timeout).await?;
    info!("Connected to manager at {}", credentials.endpoint());

    let runtime = WorkerRuntime::new(Box::new(channel), hooks, config)?;
    runtime.run().await
}
