//! Manager loop configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Manager loop timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Liveness window; heartbeats go out every `ttl / 2`
    #[serde(with = "crate::domains::utils::serde_duration")]
    pub ttl: Duration,

    /// Fixed duration of one manager tick
    #[serde(rename = "tick_interval_ms", with = "crate::domains::utils::serde_duration_ms")]
    pub tick_interval: Duration,

    /// Bounded wait of a single accept poll
    #[serde(rename = "accept_poll_ms", with = "crate::domains::utils::serde_duration_ms")]
    pub accept_poll: Duration,

    /// How long `stop` waits for each local process before killing it
    #[serde(with = "crate::domains::utils::serde_duration")]
    pub join_timeout: Duration,
}

impl ManagerConfig {
    /// Interval between heartbeat broadcasts
    pub fn heartbeat_period(&self) -> Duration {
        self.ttl / 2
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            tick_interval: Duration::from_millis(100),
            accept_poll: Duration::from_millis(100),
            join_timeout: Duration::from_secs(10),
        }
    }
}

impl Validatable for ManagerConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.ttl.as_millis(), "ttl", self.domain_name())?;
        validate_positive(
            self.tick_interval.as_millis(),
            "tick_interval_ms",
            self.domain_name(),
        )?;
        validate_positive(self.join_timeout.as_millis(), "join_timeout", self.domain_name())?;

        if self.heartbeat_period() < self.tick_interval {
            return Err(self.validation_error(format!(
                "ttl of {:?} gives a heartbeat period shorter than one tick ({:?})",
                self.ttl, self.tick_interval
            )));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "manager"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.ttl, Duration::from_secs(3600));
        assert_eq!(config.heartbeat_period(), Duration::from_secs(1800));
        assert_eq!(config.join_timeout, Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_tick_rejected() {
        let config = ManagerConfig {
            tick_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ttl_shorter_than_two_ticks_rejected() {
        let config = ManagerConfig {
            ttl: Duration::from_millis(150),
            tick_interval: Duration::from_millis(100),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_field_names() {
        let config: ManagerConfig =
            serde_yaml::from_str("ttl: 4\ntick_interval_ms: 50\n").unwrap();
        assert_eq!(config.ttl, Duration::from_secs(4));
        assert_eq!(config.tick_interval, Duration::from_millis(50));
        assert_eq!(config.accept_poll, Duration::from_millis(100));
    }
}
