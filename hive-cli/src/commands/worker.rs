//! `hive worker`: the worker side of a local or remote connection

use anyhow::{Context, Result};
use hive_config::HiveConfig;
use hive_ipc::{ClientCredentials, TransportKind};
use tracing::info;

/// Run a built-in worker until the manager stops it
pub async fn run(
    kind: &str,
    args: &[String],
    connect: Option<&str>,
    auth_key: Option<&str>,
    config: &HiveConfig,
) -> Result<()> {
    let hooks = hive_worker::builtin(kind, args)?;

    match connect {
        None => {
            hive_worker::run_local(hooks, &config.worker)
                .await
                .context("Local worker failed")?;
        }
        Some(endpoint) => {
            let credentials = credentials_for(endpoint, auth_key, config)?;
            hive_worker::run_remote(
                &credentials,
                config.listener.handshake_timeout,
                hooks,
                &config.worker,
            )
            .await
            .with_context(|| format!("Remote worker for {} failed", endpoint))?;
        }
    }

    info!("{} worker finished", kind);
    Ok(())
}

/// Credentials for `--connect HOST:PORT`, with the key from the flag or config
fn credentials_for(
    endpoint: &str,
    auth_key: Option<&str>,
    config: &HiveConfig,
) -> Result<ClientCredentials> {
    let (address, port) = endpoint
        .rsplit_once(':')
        .ok_or_else(|| anyhow::anyhow!("Expected HOST:PORT, got {}", endpoint))?;
    let port = port
        .parse::<u16>()
        .with_context(|| format!("Invalid port in {}", endpoint))?;

    Ok(ClientCredentials {
        address: address.to_string(),
        port,
        transport: TransportKind::Tcp,
        auth_key: auth_key
            .map(str::to_string)
            .unwrap_or_else(|| config.listener.auth_key.clone()),
    })
}
