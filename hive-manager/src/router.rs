//! Draining inbound messages and addressed sends

use hive_ipc::Message;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{ManagerError, ManagerResult};
use crate::liveness::Liveness;
use crate::registry::ConnectionRegistry;

impl ConnectionRegistry {
    /// Drain every channel without blocking.
    ///
    /// Each drained message refreshes the sender's marker. `pong` and
    /// `register` are acknowledgements and are not returned. Workers with
    /// nothing to report have no entry.
    pub fn collect(&mut self) -> BTreeMap<usize, Vec<Message>> {
        let now = Instant::now();
        let mut inbox: BTreeMap<usize, Vec<Message>> = BTreeMap::new();

        for index in 0..self.records.len() {
            loop {
                match self.records[index].channel.try_recv() {
                    Ok(Some(message)) => {
                        self.mark_seen(index, now);
                        if message.is_acknowledgement() {
                            continue;
                        }
                        inbox.entry(index).or_default().push(message);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!(worker = index, "Read failed: {}", e);
                        self.mark_failed(index);
                        break;
                    }
                }
            }
        }

        inbox
    }

    /// Drain and discard whatever Active workers have buffered
    pub fn flush(&mut self) {
        let now = Instant::now();

        for index in 0..self.records.len() {
            if self.records[index].last_seen.classify(now, self.ttl) != Liveness::Active {
                continue;
            }
            loop {
                match self.records[index].channel.try_recv() {
                    Ok(Some(_)) => self.mark_seen(index, now),
                    Ok(None) => break,
                    Err(e) => {
                        debug!(worker = index, "Read failed while flushing: {}", e);
                        self.mark_failed(index);
                        break;
                    }
                }
            }
        }
    }

    /// Send to one worker. `Ok(false)` means the write failed and the worker
    /// went through the disconnect transition.
    pub fn send(&mut self, index: usize, message: Message) -> ManagerResult<bool> {
        self.check_index(index)?;
        Ok(self.deliver(index, message))
    }

    pub fn send_payload(&mut self, index: usize, value: impl Into<JsonValue>) -> ManagerResult<bool> {
        self.send(index, Message::payload(value))
    }

    /// Send to every worker; one failure does not stop the others
    pub fn broadcast(&mut self, message: Message) -> Vec<bool> {
        (0..self.records.len())
            .map(|index| self.deliver(index, message.clone()))
            .collect()
    }

    /// Send a batch of messages per worker, returning the last result for each.
    ///
    /// Every index is checked before anything is sent, so an invalid target
    /// rejects the whole batch without side effects.
    pub fn spread(
        &mut self,
        batches: impl IntoIterator<Item = (usize, Vec<Message>)>,
    ) -> ManagerResult<BTreeMap<usize, bool>> {
        let batches: Vec<(usize, Vec<Message>)> = batches.into_iter().collect();

        let len = self.records.len();
        if let Some(&(index, _)) = batches.iter().find(|(index, _)| *index >= len) {
            return Err(ManagerError::InvalidTarget { index, len });
        }

        let mut results = BTreeMap::new();
        for (index, messages) in batches {
            for message in messages {
                results.insert(index, self.deliver(index, message));
            }
        }
        Ok(results)
    }

    fn deliver(&mut self, index: usize, message: Message) -> bool {
        match self.records[index].channel.send(message) {
            Ok(()) => true,
            Err(e) => {
                debug!(worker = index, "Write failed: {}", e);
                self.mark_failed(index);
                false
            }
        }
    }
}
