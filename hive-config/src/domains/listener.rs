//! Listening endpoint configuration

use crate::error::ConfigResult;
use crate::validation::{
    validate_positive, validate_range, validate_required_string, Validatable,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where the manager listens for remote workers and how they authenticate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (host name or IP)
    pub address: String,

    /// Preferred port; `0` lets the OS pick one
    pub port: u16,

    /// Number of consecutive ports tried when the preferred one is taken
    pub port_scan: u16,

    /// Pending connection backlog
    pub backlog: u32,

    /// Pre-shared key remote workers must prove knowledge of
    pub auth_key: String,

    /// Upper bound on the authentication exchange of one connection
    #[serde(with = "crate::domains::utils::serde_duration")]
    pub handshake_timeout: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: "localhost".to_string(),
            port: 6000,
            port_scan: 100,
            backlog: 16,
            auth_key: "secret password".to_string(),
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

impl Validatable for ListenerConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.address, "address", self.domain_name())?;
        validate_required_string(&self.auth_key, "auth_key", self.domain_name())?;
        validate_range(self.port_scan, 1, 1000, "port_scan", self.domain_name())?;
        validate_positive(self.backlog, "backlog", self.domain_name())?;
        validate_positive(
            self.handshake_timeout.as_secs(),
            "handshake_timeout",
            self.domain_name(),
        )?;

        if self.port != 0 && u32::from(self.port) + u32::from(self.port_scan) - 1 > u32::from(u16::MAX) {
            return Err(self.validation_error(format!(
                "port scan {}..{} runs past the last valid port",
                self.port,
                u32::from(self.port) + u32::from(self.port_scan)
            )));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "listener"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ListenerConfig::default();
        assert_eq!(config.address, "localhost");
        assert_eq!(config.port, 6000);
        assert_eq!(config.port_scan, 100);
        assert_eq!(config.backlog, 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_key_rejected() {
        let config = ListenerConfig {
            auth_key: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_scan_budget_bounds() {
        for port_scan in [0, 1001] {
            let config = ListenerConfig {
                port_scan,
                ..Default::default()
            };
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn test_scan_past_last_port_rejected() {
        let config = ListenerConfig {
            port: 65500,
            port_scan: 100,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ephemeral_port_allowed() {
        let config = ListenerConfig {
            port: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
