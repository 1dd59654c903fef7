//! Error types for worker processes

use hive_ipc::IpcError;
use thiserror::Error;

/// Worker runtime errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// The manager end of the channel went away
    #[error("Lost connection to the manager")]
    Disconnected,

    #[error("IPC error: {0}")]
    Ipc(IpcError),

    #[error("Unknown worker kind: {0}")]
    UnknownKind(String),

    /// A launch argument the worker kind does not understand
    #[error("Invalid argument for {kind} worker: {message}")]
    InvalidArgument { kind: String, message: String },
}

impl From<IpcError> for WorkerError {
    fn from(err: IpcError) -> Self {
        match err {
            IpcError::ConnectionClosed => WorkerError::Disconnected,
            other => WorkerError::Ipc(other),
        }
    }
}
