//! Worker runtime configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Worker runtime timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Fixed duration of one worker tick
    #[serde(rename = "tick_interval_ms", with = "crate::domains::utils::serde_duration_ms")]
    pub tick_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
        }
    }
}

impl Validatable for WorkerConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(
            self.tick_interval.as_millis(),
            "tick_interval_ms",
            self.domain_name(),
        )
    }

    fn domain_name(&self) -> &'static str {
        "worker"
    }
}
