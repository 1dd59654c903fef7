//! End-to-end manager scenarios with in-process workers
//!
//! Workers run as tokio tasks on the far end of an in-memory duplex channel,
//! so they go through the same framing, registration and heartbeat path as
//! child processes.

use anyhow::Result;
use hive_config::{ListenerConfig, ManagerConfig, WorkerConfig};
use hive_ipc::{Channel, Message, Opcode, StreamChannel};
use hive_manager::{
    ConnectionRegistry, InProcessSpawner, Manager, ManagerError, ManagerHooks, ManagerResult,
    SpawnedWorker, Spawner, TaskProcess, WorkerLaunch,
};
use hive_worker::WorkerRuntime;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::timeout;

/// Helper to keep test output readable
fn init_quiet_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_target(false)
            .without_time()
            .try_init();
    });
}

#[derive(Default)]
struct Recorder {
    new_workers: Vec<usize>,
    disconnects: Vec<usize>,
}

impl ManagerHooks for Recorder {
    fn on_new_worker(&mut self, _workers: &mut ConnectionRegistry, index: usize) {
        self.new_workers.push(index);
    }

    fn on_worker_disconnect(&mut self, _workers: &mut ConnectionRegistry, index: usize) {
        self.disconnects.push(index);
    }
}

fn listener() -> ListenerConfig {
    ListenerConfig {
        address: "127.0.0.1".to_string(),
        port: 0,
        ..Default::default()
    }
}

fn manager_config(ttl: Duration) -> ManagerConfig {
    ManagerConfig {
        ttl,
        tick_interval: Duration::from_millis(20),
        accept_poll: Duration::from_millis(1),
        join_timeout: Duration::from_secs(2),
    }
}

fn worker_config() -> WorkerConfig {
    WorkerConfig {
        tick_interval: Duration::from_millis(5),
    }
}

async fn echo_manager(workers: usize) -> Result<Manager<Recorder>> {
    let mut manager = Manager::bind(
        &listener(),
        &manager_config(Duration::from_secs(60)),
        Recorder::default(),
    )
    .await?
    .with_spawner(InProcessSpawner::builtin(worker_config()));

    for _ in 0..workers {
        manager.create_local_worker(WorkerLaunch::new("echo"))?;
    }
    Ok(manager)
}

/// Collect until `expected` payloads have arrived in total
async fn collect_replies(
    manager: &mut Manager<Recorder>,
    expected: usize,
) -> Result<BTreeMap<usize, Vec<Message>>> {
    let mut replies: BTreeMap<usize, Vec<Message>> = BTreeMap::new();

    timeout(Duration::from_secs(5), async {
        while replies.values().map(Vec::len).sum::<usize>() < expected {
            for (index, messages) in manager.collect() {
                replies.entry(index).or_default().extend(messages);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;

    Ok(replies)
}

/// Wait until every worker has registered
async fn wait_active(manager: &mut Manager<Recorder>, count: usize) -> Result<()> {
    timeout(Duration::from_secs(5), async {
        while manager.workers().active_indices().len() < count {
            manager.collect();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;
    Ok(())
}

#[tokio::test]
async fn test_broadcast_task_echoed_by_every_worker() -> Result<()> {
    init_quiet_logging();
    let mut manager = echo_manager(3).await?;
    assert_eq!(manager.hooks().new_workers, vec![0, 1, 2]);

    let sent = manager.broadcast(Message::payload("task"));
    assert_eq!(sent, vec![true, true, true]);

    let replies = collect_replies(&mut manager, 3).await?;
    let expected: BTreeMap<usize, Vec<Message>> = (0..3)
        .map(|index| (index, vec![Message::payload("task")]))
        .collect();
    assert_eq!(replies, expected);

    manager.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_silent_worker_declared_dead_once() -> Result<()> {
    init_quiet_logging();
    let mut manager = Manager::bind(
        &listener(),
        &manager_config(Duration::from_secs(1)),
        Recorder::default(),
    )
    .await?;

    // The test holds the worker end and never answers a ping
    let (ours, mut theirs) = StreamChannel::pair("silent");
    let index = manager.attach(Box::new(ours));
    theirs.send(Message::from(Opcode::Register))?;
    wait_active(&mut manager, 1).await?;

    let started = tokio::time::Instant::now();
    while started.elapsed() < Duration::from_millis(1300) {
        manager.run_once().await;
    }

    assert_eq!(manager.workers().dead_indices(), vec![index]);
    assert_eq!(manager.hooks().disconnects, vec![index]);

    // The channel is still open, so sends succeed but do not revive it
    assert!(manager.send_payload(index, "anyone there?")?);
    assert_eq!(manager.hooks().disconnects, vec![index]);

    manager.stop().await;
    Ok(())
}

/// In-process spawner that keeps an abort handle on every worker task
#[derive(Default)]
struct AbortableSpawner {
    handles: Arc<Mutex<Vec<AbortHandle>>>,
}

impl Spawner for AbortableSpawner {
    fn spawn(&self, launch: &WorkerLaunch) -> ManagerResult<SpawnedWorker> {
        let (ours, theirs) = StreamChannel::pair(launch.kind.clone());
        let hooks = hive_worker::builtin(&launch.kind, &launch.args)
            .map_err(|e| ManagerError::SpawnFailed(e.to_string()))?;
        let runtime = WorkerRuntime::new(Box::new(theirs), hooks, &worker_config())
            .map_err(|e| ManagerError::SpawnFailed(e.to_string()))?;

        let task = tokio::spawn(async move { runtime.run().await.map(|_| ()) });
        self.handles.lock().unwrap().push(task.abort_handle());

        Ok(SpawnedWorker {
            channel: Box::new(ours),
            process: Box::new(TaskProcess::new(task)),
        })
    }
}

#[tokio::test]
async fn test_killed_worker_fails_next_send() -> Result<()> {
    init_quiet_logging();
    let spawner = AbortableSpawner::default();
    let handles = spawner.handles.clone();

    let mut manager = Manager::bind(
        &listener(),
        &manager_config(Duration::from_secs(60)),
        Recorder::default(),
    )
    .await?
    .with_spawner(spawner);

    for _ in 0..3 {
        manager.create_local_worker(WorkerLaunch::new("echo"))?;
    }
    wait_active(&mut manager, 3).await?;

    handles.lock().unwrap()[1].abort();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!manager.send_payload(1, "task")?);
    assert_eq!(manager.hooks().disconnects, vec![1]);

    // Index 1 stays bound to the dead worker; its neighbours are untouched
    assert!(!manager.send_payload(1, "task")?);
    assert!(manager.send_payload(2, "task")?);
    assert_eq!(manager.hooks().disconnects, vec![1]);

    let report = manager.stop().await;
    assert_eq!(report.joined, vec![0, 1, 2]);
    Ok(())
}

#[tokio::test]
async fn test_spread_to_missing_worker_sends_nothing() -> Result<()> {
    init_quiet_logging();
    let mut manager = echo_manager(3).await?;
    wait_active(&mut manager, 3).await?;

    let batches = BTreeMap::from([
        (0, vec![Message::payload("x")]),
        (5, vec![Message::payload("x")]),
    ]);
    let err = manager.spread(batches).unwrap_err();
    assert!(matches!(err, ManagerError::InvalidTarget { index: 5, len: 3 }));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(manager.collect().is_empty());

    let results = manager.spread(BTreeMap::from([
        (0, vec![Message::payload(1), Message::payload(2)]),
        (2, vec![Message::payload(3)]),
    ]))?;
    assert_eq!(results, BTreeMap::from([(0, true), (2, true)]));

    let replies = collect_replies(&mut manager, 3).await?;
    assert_eq!(replies[&0], vec![Message::payload(1), Message::payload(2)]);
    assert_eq!(replies[&2], vec![Message::payload(3)]);

    manager.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_stop_joins_every_worker_without_kill() -> Result<()> {
    init_quiet_logging();
    let mut manager = echo_manager(3).await?;
    wait_active(&mut manager, 3).await?;

    let started = tokio::time::Instant::now();
    let report = manager.stop().await;

    assert_eq!(report.joined, vec![0, 1, 2]);
    assert!(report.killed.is_empty());
    assert!(started.elapsed() < manager.config().join_timeout);

    let again = manager.stop().await;
    assert!(again.joined.is_empty() && again.killed.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_heartbeat_keeps_workers_active() -> Result<()> {
    init_quiet_logging();
    let mut manager = Manager::bind(
        &listener(),
        &manager_config(Duration::from_millis(400)),
        Recorder::default(),
    )
    .await?
    .with_spawner(InProcessSpawner::builtin(worker_config()));
    manager.create_local_worker(WorkerLaunch::new("echo"))?;

    let started = tokio::time::Instant::now();
    while started.elapsed() < Duration::from_millis(1200) {
        manager.run_once().await;
    }

    // Pongs every 200ms keep the worker inside its 400ms window
    assert_eq!(manager.workers().active_indices(), vec![0]);
    assert!(manager.hooks().disconnects.is_empty());

    manager.stop().await;
    Ok(())
}
