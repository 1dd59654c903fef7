//! TTL-based liveness classification and heartbeat cadence

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::ManagerResult;
use crate::registry::ConnectionRegistry;

/// Liveness of one worker, derived from its last-seen marker and the clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    /// Never heard from, or reset after a connection failure
    Unconfirmed,
    /// Heard from within the last TTL
    Active,
    /// Last message is older than the TTL
    Dead,
}

impl fmt::Display for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Liveness::Unconfirmed => "unconfirmed",
            Liveness::Active => "active",
            Liveness::Dead => "dead",
        };
        f.write_str(name)
    }
}

/// When a worker was last heard from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastSeen {
    Never,
    At(Instant),
    /// Reset after a read or write failure
    Lost,
}

impl LastSeen {
    pub fn classify(&self, now: Instant, ttl: Duration) -> Liveness {
        match self {
            LastSeen::Never | LastSeen::Lost => Liveness::Unconfirmed,
            LastSeen::At(at) if now.saturating_duration_since(*at) < ttl => Liveness::Active,
            LastSeen::At(_) => Liveness::Dead,
        }
    }
}

/// Decides when the next `ping` broadcast is due
#[derive(Debug, Clone)]
pub struct Heartbeat {
    period: Duration,
    last_ping: Instant,
}

impl Heartbeat {
    /// The first ping falls due one period after creation
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last_ping: Instant::now(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// True (and restarts the period) when a ping is due at `now`
    pub fn poll(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_ping) >= self.period {
            self.last_ping = now;
            true
        } else {
            false
        }
    }
}

impl ConnectionRegistry {
    /// Classify one worker against the current clock
    pub fn classify(&self, index: usize) -> ManagerResult<Liveness> {
        let record = self.record(index)?;
        Ok(record.last_seen.classify(Instant::now(), self.ttl))
    }

    pub fn active_indices(&self) -> Vec<usize> {
        self.indices_in(Liveness::Active)
    }

    pub fn unconfirmed_indices(&self) -> Vec<usize> {
        self.indices_in(Liveness::Unconfirmed)
    }

    pub fn dead_indices(&self) -> Vec<usize> {
        self.indices_in(Liveness::Dead)
    }

    fn indices_in(&self, state: Liveness) -> Vec<usize> {
        let now = Instant::now();
        self.records
            .iter()
            .enumerate()
            .filter(|(_, record)| record.last_seen.classify(now, self.ttl) == state)
            .map(|(index, _)| index)
            .collect()
    }

    /// Record receipt of any message from a worker
    pub(crate) fn mark_seen(&mut self, index: usize, now: Instant) {
        if let Some(record) = self.records.get_mut(index) {
            if record.observed != Liveness::Active {
                info!(worker = index, channel = %record.channel.label(), "Worker is active");
            }
            record.last_seen = LastSeen::At(now);
            record.observed = Liveness::Active;
        }
    }

    /// Disconnect transition after a read or write failure.
    ///
    /// Queues one disconnect notification if the worker was Active right
    /// before the failure, or was last observed Active and its TTL ran out
    /// before the next sweep, then resets it to Unconfirmed. Failures on a
    /// worker already reported as gone queue nothing.
    pub(crate) fn mark_failed(&mut self, index: usize) {
        let now = Instant::now();
        let ttl = self.ttl;
        let Some(record) = self.records.get_mut(index) else {
            return;
        };

        let was_active = record.observed == Liveness::Active
            || record.last_seen.classify(now, ttl) == Liveness::Active;
        record.last_seen = LastSeen::Lost;
        record.observed = Liveness::Unconfirmed;

        if was_active {
            warn!(worker = index, channel = %record.channel.label(), "Worker disconnected");
            self.queue_disconnect(index);
        }
    }

    /// Find workers whose TTL ran out since the last sweep and queue one
    /// disconnect notification for each
    pub(crate) fn sweep(&mut self, now: Instant) {
        let ttl = self.ttl;
        let mut expired = Vec::new();

        for (index, record) in self.records.iter_mut().enumerate() {
            let current = record.last_seen.classify(now, ttl);
            if record.observed == Liveness::Active && current == Liveness::Dead {
                warn!(
                    worker = index,
                    channel = %record.channel.label(),
                    "Worker silent for longer than {:?}, marking dead",
                    ttl
                );
                expired.push(index);
            }
            record.observed = current;
        }

        for index in expired {
            self.queue_disconnect(index);
        }
    }
}
