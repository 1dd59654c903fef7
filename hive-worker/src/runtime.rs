//! The per-worker control loop

use hive_config::WorkerConfig;
use hive_ipc::{Channel, IpcError, Message, Opcode};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::WorkerError;

/// Application logic plugged into a worker.
///
/// Both hooks run on the worker's single control loop; a slow hook delays the
/// next heartbeat reply.
pub trait WorkerHooks: Send {
    /// Compute hook, called once at the start of every tick
    fn on_tick(&mut self, _link: &mut WorkerLink) {}

    /// Called for every message that is not `stop` or `ping`
    fn handle_msg(&mut self, _link: &mut WorkerLink, _msg: Message) {}
}

impl<T: WorkerHooks + ?Sized> WorkerHooks for Box<T> {
    fn on_tick(&mut self, link: &mut WorkerLink) {
        (**self).on_tick(link)
    }

    fn handle_msg(&mut self, link: &mut WorkerLink, msg: Message) {
        (**self).handle_msg(link, msg)
    }
}

/// The worker's end of its channel, as seen by hooks
pub struct WorkerLink {
    channel: Box<dyn Channel>,
}

impl WorkerLink {
    /// Send a message to the manager
    pub fn send(&mut self, message: Message) -> Result<(), IpcError> {
        self.channel.send(message)
    }

    /// Send a JSON payload to the manager
    pub fn send_payload(&mut self, value: impl Into<JsonValue>) -> Result<(), IpcError> {
        self.channel.send(Message::payload(value))
    }

    /// Peer description of the underlying channel
    pub fn label(&self) -> &str {
        self.channel.label()
    }
}

/// Runs one worker until the manager says stop
pub struct WorkerRuntime<H> {
    link: WorkerLink,
    hooks: H,
    tick_interval: Duration,
    done: bool,
}

impl<H: WorkerHooks> WorkerRuntime<H> {
    /// Create the runtime and announce the worker to the manager
    pub fn new(
        channel: Box<dyn Channel>,
        hooks: H,
        config: &WorkerConfig,
    ) -> Result<Self, WorkerError> {
        let mut link = WorkerLink { channel };
        link.send(Message::from(Opcode::Register))?;
        debug!(channel = %link.label(), "Worker registered");

        Ok(Self {
            link,
            hooks,
            tick_interval: config.tick_interval,
            done: false,
        })
    }

    /// True once `stop` has been received
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    /// One tick: compute hook, at most one message, then pace to the tick interval
    pub async fn run_once(&mut self) -> Result<(), WorkerError> {
        let started = Instant::now();

        self.hooks.on_tick(&mut self.link);

        let budget = self.tick_interval.saturating_sub(started.elapsed());
        if let Some(message) = self.link.channel.recv_timeout(budget).await? {
            match message {
                Message::Control(Opcode::Stop) => {
                    info!(channel = %self.link.label(), "Stop received, finishing");
                    self.done = true;
                }
                Message::Control(Opcode::Ping) => {
                    self.link.send(Message::from(Opcode::Pong))?;
                }
                other => self.hooks.handle_msg(&mut self.link, other),
            }
        }

        let rest = self.tick_interval.saturating_sub(started.elapsed());
        if !rest.is_zero() {
            tokio::time::sleep(rest).await;
        }

        Ok(())
    }

    /// Tick until stopped, then close the channel and hand the hooks back
    pub async fn run(mut self) -> Result<H, WorkerError> {
        while !self.done {
            self.run_once().await?;
        }

        if let Err(e) = self.link.channel.close().await {
            debug!("Error closing worker channel: {}", e);
        }

        Ok(self.hooks)
    }
}
