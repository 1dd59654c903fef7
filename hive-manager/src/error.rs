//! Error types for the manager

use hive_config::ConfigError;
use hive_ipc::IpcError;
use thiserror::Error;

/// Manager result type
pub type ManagerResult<T> = Result<T, ManagerError>;

/// Manager errors.
///
/// Connection failures of a single worker are not errors at this level: they
/// surface as `false` send results and the disconnect hook.
#[derive(Error, Debug)]
pub enum ManagerError {
    /// A send or spread addressed a worker index that was never assigned
    #[error("Invalid worker index {index} (registry holds {len} workers)")]
    InvalidTarget { index: usize, len: usize },

    #[error("Failed to bind {address} on ports {first}..={last}")]
    BindFailed { address: String, first: u16, last: u16 },

    #[error("Failed to spawn worker process: {0}")]
    SpawnFailed(String),

    #[error("IPC error: {0}")]
    Ipc(#[from] IpcError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_target_message() {
        let err = ManagerError::InvalidTarget { index: 5, len: 3 };
        assert_eq!(err.to_string(), "Invalid worker index 5 (registry holds 3 workers)");
    }
}
