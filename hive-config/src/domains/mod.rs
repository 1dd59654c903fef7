//! Domain-specific configuration modules

pub mod listener;
pub mod logging;
pub mod manager;
pub mod utils;
pub mod worker;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main Hive configuration combining all domains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HiveConfig {
    /// Listening endpoint for remote workers
    pub listener: listener::ListenerConfig,

    /// Manager loop timing
    pub manager: manager::ManagerConfig,

    /// Worker runtime timing
    pub worker: worker::WorkerConfig,

    /// Logging configuration
    pub logging: logging::LoggingConfig,
}

impl HiveConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.listener.validate()?;
        self.manager.validate()?;
        self.worker.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = HiveConfig::default();
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}
