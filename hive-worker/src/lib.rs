//! Hive worker runtime
//!
//! The symmetric counterpart of the manager loop. A worker registers on
//! connect, runs its compute hook every tick, answers heartbeats, hands payload
//! messages to user logic and exits when the manager sends `stop`.

pub mod builtin;
pub mod entry;
pub mod error;
pub mod runtime;

pub use builtin::{builtin, EchoWorker};
pub use entry::{run_local, run_remote};
pub use error::WorkerError;
pub use runtime::{WorkerHooks, WorkerLink, WorkerRuntime};
