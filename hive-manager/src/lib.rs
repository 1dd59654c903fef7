//! Hive manager
//!
//! Accepts local and remote workers into an indexed registry, tracks their
//! liveness with TTL-based heartbeats, routes messages to and from them and
//! drives the application's hooks once per tick. `stop` shuts everything down
//! with a bounded join-then-kill escalation.

pub mod endpoint;
pub mod error;
pub mod lifecycle;
pub mod liveness;
pub mod manager;
pub mod registry;
pub mod router;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use endpoint::Endpoint;
pub use error::{ManagerError, ManagerResult};
pub use lifecycle::{
    ChildProcess, CommandSpawner, InProcessSpawner, ProcessHandle, SpawnedWorker, Spawner,
    TaskProcess, WorkerFactory, WorkerLaunch,
};
pub use liveness::{Heartbeat, LastSeen, Liveness};
pub use manager::{Manager, ManagerHooks, NoopHooks};
pub use registry::{ConnectionRegistry, WorkerOrigin};
pub use supervisor::ShutdownReport;
