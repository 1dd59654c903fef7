//! Domain-driven configuration management for Hive
//!
//! Configuration is split by functional domain (listener, manager, worker,
//! logging), loaded from YAML with `HIVE_*` environment overrides, and
//! validated per domain.

pub mod domains;
pub mod error;
pub mod loader;
pub mod validation;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use validation::Validatable;

// Re-export domain configurations
pub use domains::{
    listener::ListenerConfig,
    logging::{LogFormat, LogLevel, LoggingConfig},
    manager::ManagerConfig,
    worker::WorkerConfig,
    HiveConfig,
};

// Re-export utilities
pub use domains::utils::{serde_duration, serde_duration_ms};
