//! Indexed worker records owned by the manager loop

use hive_ipc::Channel;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::debug;

use crate::error::{ManagerError, ManagerResult};
use crate::lifecycle::ProcessHandle;
use crate::liveness::{LastSeen, Liveness};

/// How a worker joined the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOrigin {
    /// Spawned by this manager
    Local,
    /// Dialled in through the listening endpoint
    Remote(SocketAddr),
    /// Handed over already connected
    Attached,
}

pub(crate) struct WorkerRecord {
    pub(crate) channel: Box<dyn Channel>,
    pub(crate) last_seen: LastSeen,
    /// State as of the last receipt, failure or sweep; compared against the
    /// clock-derived classification to find Active -> Dead transitions
    pub(crate) observed: Liveness,
    pub(crate) origin: WorkerOrigin,
    pub(crate) process: Option<Box<dyn ProcessHandle>>,
}

/// Every worker ever registered, addressed by a stable 0-based index.
///
/// Records are never removed or reordered; a disconnected worker keeps its
/// index and further sends to it simply fail.
pub struct ConnectionRegistry {
    pub(crate) records: Vec<WorkerRecord>,
    pub(crate) ttl: Duration,
    pending_disconnects: Vec<usize>,
}

impl ConnectionRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            records: Vec::new(),
            ttl,
            pending_disconnects: Vec::new(),
        }
    }

    /// Append a record and return its index
    pub fn register(
        &mut self,
        channel: Box<dyn Channel>,
        origin: WorkerOrigin,
        process: Option<Box<dyn ProcessHandle>>,
    ) -> usize {
        let index = self.records.len();
        debug!(worker = index, channel = %channel.label(), ?origin, "Worker registered");

        self.records.push(WorkerRecord {
            channel,
            last_seen: LastSeen::Never,
            observed: Liveness::Unconfirmed,
            origin,
            process,
        });
        index
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn origin(&self, index: usize) -> ManagerResult<WorkerOrigin> {
        Ok(self.record(index)?.origin)
    }

    /// OS process id of a locally spawned worker, if it has one
    pub fn process_id(&self, index: usize) -> ManagerResult<Option<u32>> {
        Ok(self.record(index)?.process.as_ref().and_then(|p| p.id()))
    }

    pub fn label(&self, index: usize) -> ManagerResult<&str> {
        Ok(self.record(index)?.channel.label())
    }

    pub(crate) fn record(&self, index: usize) -> ManagerResult<&WorkerRecord> {
        let len = self.records.len();
        self.records
            .get(index)
            .ok_or(ManagerError::InvalidTarget { index, len })
    }

    pub(crate) fn check_index(&self, index: usize) -> ManagerResult<()> {
        self.record(index).map(|_| ())
    }

    /// Queue a disconnect notification for the manager to deliver
    pub(crate) fn queue_disconnect(&mut self, index: usize) {
        self.pending_disconnects.push(index);
    }

    pub(crate) fn take_disconnects(&mut self) -> Vec<usize> {
        std::mem::take(&mut self.pending_disconnects)
    }

    /// Detach every local process handle, for the supervisor
    pub(crate) fn take_processes(&mut self) -> Vec<(usize, Box<dyn ProcessHandle>)> {
        self.records
            .iter_mut()
            .enumerate()
            .filter_map(|(index, record)| record.process.take().map(|p| (index, p)))
            .collect()
    }

    /// Close the channels of locally spawned workers. Queued frames are
    /// flushed first, then the worker reads end of stream.
    pub(crate) async fn close_local(&mut self) {
        for (index, record) in self.records.iter_mut().enumerate() {
            if record.process.is_some() {
                close_record(index, record).await;
            }
        }
    }

    pub(crate) async fn close_all(&mut self) {
        for (index, record) in self.records.iter_mut().enumerate() {
            close_record(index, record).await;
        }
    }
}

async fn close_record(index: usize, record: &mut WorkerRecord) {
    if let Err(e) = record.channel.close().await {
        debug!(worker = index, "Error closing channel: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedChannel;

    #[test]
    fn test_indices_assigned_in_order() {
        let mut registry = ConnectionRegistry::new(Duration::from_secs(1));
        assert!(registry.is_empty());

        for expected in 0..3 {
            let (channel, _) = ScriptedChannel::new();
            let index = registry.register(Box::new(channel), WorkerOrigin::Attached, None);
            assert_eq!(index, expected);
        }

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.origin(1).unwrap(), WorkerOrigin::Attached);
        assert_eq!(registry.process_id(1).unwrap(), None);
    }

    #[test]
    fn test_unknown_index_is_invalid_target() {
        let registry = ConnectionRegistry::new(Duration::from_secs(1));
        assert!(matches!(
            registry.origin(0),
            Err(ManagerError::InvalidTarget { index: 0, len: 0 })
        ));
    }
}
