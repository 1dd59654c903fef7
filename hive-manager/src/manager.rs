//! The manager control loop

use hive_config::{ListenerConfig, ManagerConfig};
use hive_ipc::{Channel, ClientCredentials, Message, Opcode, TransportKind};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::endpoint::Endpoint;
use crate::error::ManagerResult;
use crate::lifecycle::{CommandSpawner, ProcessHandle, SpawnedWorker, Spawner, WorkerLaunch};
use crate::liveness::Heartbeat;
use crate::registry::{ConnectionRegistry, WorkerOrigin};

/// Application logic plugged into a manager.
///
/// Every hook gets the registry so it can send, broadcast or spread in
/// response. Disconnects caused by those sends are reported through
/// `on_worker_disconnect` once the hook returns.
pub trait ManagerHooks: Send {
    /// Called once at the start of every tick; task assignment goes here
    fn on_tick(&mut self, _workers: &mut ConnectionRegistry) {}

    fn on_new_worker(&mut self, _workers: &mut ConnectionRegistry, _index: usize) {}

    /// Called once when an Active worker fails or goes silent for a full TTL
    fn on_worker_disconnect(&mut self, _workers: &mut ConnectionRegistry, _index: usize) {}

    /// Called for every collected message, in per-worker arrival order
    fn handle_msg(&mut self, _workers: &mut ConnectionRegistry, _index: usize, _msg: Message) {}
}

/// Hooks that do nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl ManagerHooks for NoopHooks {}

/// Accepts workers, tracks their liveness and drives the per-tick loop
pub struct Manager<H> {
    pub(crate) config: ManagerConfig,
    pub(crate) endpoint: Endpoint,
    pub(crate) workers: ConnectionRegistry,
    heartbeat: Heartbeat,
    pub(crate) hooks: H,
    spawner: Option<Arc<dyn Spawner>>,
    pub(crate) stopped: bool,
}

impl<H: ManagerHooks> Manager<H> {
    /// Bind the listening endpoint and create an empty registry
    pub async fn bind(
        listener: &ListenerConfig,
        config: &ManagerConfig,
        hooks: H,
    ) -> ManagerResult<Self> {
        let endpoint = Endpoint::bind(listener, config.accept_poll).await?;
        debug!(
            "Manager ready: ttl {:?}, heartbeat every {:?}, tick {:?}",
            config.ttl,
            config.heartbeat_period(),
            config.tick_interval
        );

        Ok(Self {
            config: config.clone(),
            endpoint,
            workers: ConnectionRegistry::new(config.ttl),
            heartbeat: Heartbeat::new(config.heartbeat_period()),
            hooks,
            spawner: None,
            stopped: false,
        })
    }

    /// Replace the default child-process spawner
    pub fn with_spawner(mut self, spawner: impl Spawner + 'static) -> Self {
        self.spawner = Some(Arc::new(spawner));
        self
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    pub fn into_hooks(self) -> H {
        self.hooks
    }

    /// Read-only view of the registry (liveness queries, worker count)
    pub fn workers(&self) -> &ConnectionRegistry {
        &self.workers
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// What a remote worker needs to dial in
    pub fn get_client_credentials(&self) -> ClientCredentials {
        ClientCredentials {
            address: self.endpoint.address().to_string(),
            port: self.endpoint.port(),
            transport: TransportKind::Tcp,
            auth_key: self.endpoint.auth_key().to_string(),
        }
    }

    /// One bounded poll for a remote worker. Registers it and fires
    /// `on_new_worker` when one was accepted.
    pub async fn accept_once(&mut self) -> bool {
        match self.endpoint.accept().await {
            Some((channel, peer)) => {
                info!("Accepted remote worker from {}", peer);
                self.admit(Box::new(channel), WorkerOrigin::Remote(peer), None);
                true
            }
            None => false,
        }
    }

    /// Register a channel connected by other means
    pub fn attach(&mut self, channel: Box<dyn Channel>) -> usize {
        self.admit(channel, WorkerOrigin::Attached, None)
    }

    /// Start a local worker through the configured spawner
    pub fn create_local_worker(&mut self, launch: WorkerLaunch) -> ManagerResult<usize> {
        let spawner = match &self.spawner {
            Some(spawner) => spawner.clone(),
            None => {
                let spawner: Arc<dyn Spawner> = Arc::new(CommandSpawner::current_exe()?);
                self.spawner = Some(spawner.clone());
                spawner
            }
        };

        let SpawnedWorker { channel, process } = spawner.spawn(&launch)?;
        Ok(self.admit(channel, WorkerOrigin::Local, Some(process)))
    }

    fn admit(
        &mut self,
        channel: Box<dyn Channel>,
        origin: WorkerOrigin,
        process: Option<Box<dyn ProcessHandle>>,
    ) -> usize {
        let index = self.workers.register(channel, origin, process);
        self.hooks.on_new_worker(&mut self.workers, index);
        self.dispatch_disconnects();
        index
    }

    /// Broadcast `ping` if a heartbeat period has passed since the last one
    pub fn maybe_ping(&mut self) -> bool {
        if !self.heartbeat.poll(Instant::now()) {
            return false;
        }

        let results = self.workers.broadcast(Message::from(Opcode::Ping));
        debug!(
            period = ?self.heartbeat.period(),
            "Heartbeat sent to {}/{} workers",
            results.iter().filter(|ok| **ok).count(),
            results.len()
        );
        self.dispatch_disconnects();
        true
    }

    pub fn collect(&mut self) -> BTreeMap<usize, Vec<Message>> {
        let inbox = self.workers.collect();
        self.dispatch_disconnects();
        inbox
    }

    pub fn flush(&mut self) {
        self.workers.flush();
        self.dispatch_disconnects();
    }

    pub fn send(&mut self, index: usize, message: Message) -> ManagerResult<bool> {
        let sent = self.workers.send(index, message);
        self.dispatch_disconnects();
        sent
    }

    pub fn send_payload(&mut self, index: usize, value: impl Into<JsonValue>) -> ManagerResult<bool> {
        self.send(index, Message::payload(value))
    }

    pub fn broadcast(&mut self, message: Message) -> Vec<bool> {
        let results = self.workers.broadcast(message);
        self.dispatch_disconnects();
        results
    }

    pub fn spread(
        &mut self,
        batches: impl IntoIterator<Item = (usize, Vec<Message>)>,
    ) -> ManagerResult<BTreeMap<usize, bool>> {
        let results = self.workers.spread(batches);
        self.dispatch_disconnects();
        results
    }

    /// One tick: liveness sweep and heartbeat, tick hook, accepts, message
    /// dispatch, then sleep out the rest of the tick interval
    pub async fn run_once(&mut self) {
        let started = Instant::now();

        self.workers.sweep(started);
        self.dispatch_disconnects();
        self.maybe_ping();

        self.hooks.on_tick(&mut self.workers);
        self.dispatch_disconnects();

        while self.accept_once().await {}

        for (index, messages) in self.collect() {
            for message in messages {
                self.hooks.handle_msg(&mut self.workers, index, message);
            }
            self.dispatch_disconnects();
        }

        let rest = self.config.tick_interval.saturating_sub(started.elapsed());
        if !rest.is_zero() {
            tokio::time::sleep(rest).await;
        }
    }

    /// Tick until `done` holds; checked before every tick
    pub async fn run_until<F>(&mut self, mut done: F)
    where
        F: FnMut(&Self) -> bool,
    {
        while !done(self) {
            self.run_once().await;
        }
    }

    /// Deliver queued disconnect notifications, including any raised by the
    /// disconnect hook itself
    pub(crate) fn dispatch_disconnects(&mut self) {
        loop {
            let pending = self.workers.take_disconnects();
            if pending.is_empty() {
                break;
            }
            for index in pending {
                self.hooks.on_worker_disconnect(&mut self.workers, index);
            }
        }
    }
}
