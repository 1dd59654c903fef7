//! Graceful shutdown of the manager and its local workers

use hive_ipc::{Message, Opcode};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::manager::{Manager, ManagerHooks};

/// Outcome of [`Manager::stop`] for the locally spawned workers
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Workers that exited on their own within the join timeout
    pub joined: Vec<usize>,
    /// Workers that had to be killed
    pub killed: Vec<usize>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.killed.is_empty()
    }
}

impl<H: ManagerHooks> Manager<H> {
    /// Stop every worker and close the endpoint.
    ///
    /// Broadcasts `stop` and closes the local workers' channels behind it, then
    /// waits up to the join timeout for each local process and kills the ones
    /// that do not exit. Returns within `join_timeout` per local worker. Later
    /// calls do nothing.
    pub async fn stop(&mut self) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        if self.stopped {
            return report;
        }
        self.stopped = true;

        info!("Stopping {} workers", self.workers.len());
        self.broadcast(Message::from(Opcode::Stop));
        self.workers.close_local().await;

        let join_timeout = self.config.join_timeout;
        for (index, mut process) in self.workers.take_processes() {
            let exited = match process.wait_timeout(join_timeout).await {
                Ok(exited) => exited,
                Err(e) => {
                    warn!(worker = index, "Waiting for worker failed: {}", e);
                    false
                }
            };

            if exited {
                report.joined.push(index);
                continue;
            }

            error!(
                "Failed to stop local worker {} (pid {:?}) within {:?}, killing it",
                index,
                process.id(),
                join_timeout
            );
            if let Err(e) = process.kill().await {
                warn!(worker = index, "Kill failed: {}", e);
            }
            report.killed.push(index);
        }

        self.workers.close_all().await;
        self.endpoint.close();

        info!(
            joined = report.joined.len(),
            killed = report.killed.len(),
            "Manager stopped"
        );
        report
    }
}
