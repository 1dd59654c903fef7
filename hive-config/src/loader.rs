//! Configuration loading and environment variable handling

use crate::domains::HiveConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "HIVE".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<HiveConfig> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadError {
                path: path.to_path_buf(),
                source,
            })?;
        let mut config: HiveConfig = serde_yaml::from_str(&content)?;

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<HiveConfig> {
        let mut config = HiveConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<HiveConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut HiveConfig) -> ConfigResult<()> {
        self.apply_listener_overrides(&mut config.listener)?;
        self.apply_manager_overrides(&mut config.manager)?;
        self.apply_worker_overrides(&mut config.worker)?;
        self.apply_logging_overrides(&mut config.logging)?;
        Ok(())
    }

    fn apply_listener_overrides(
        &self,
        config: &mut crate::domains::listener::ListenerConfig,
    ) -> ConfigResult<()> {
        if let Ok(address) = self.get_env_var("LISTEN_ADDRESS") {
            config.address = address;
        }

        if let Some(port) = self.parse_env_var("LISTEN_PORT")? {
            config.port = port;
        }

        if let Ok(key) = self.get_env_var("AUTH_KEY") {
            config.auth_key = key;
        }

        Ok(())
    }

    fn apply_manager_overrides(
        &self,
        config: &mut crate::domains::manager::ManagerConfig,
    ) -> ConfigResult<()> {
        if let Some(seconds) = self.parse_env_var::<u64>("TTL_SECONDS")? {
            config.ttl = Duration::from_secs(seconds);
        }

        if let Some(millis) = self.parse_env_var::<u64>("TICK_INTERVAL_MS")? {
            config.tick_interval = Duration::from_millis(millis);
        }

        if let Some(seconds) = self.parse_env_var::<u64>("JOIN_TIMEOUT_SECONDS")? {
            config.join_timeout = Duration::from_secs(seconds);
        }

        Ok(())
    }

    fn apply_worker_overrides(
        &self,
        config: &mut crate::domains::worker::WorkerConfig,
    ) -> ConfigResult<()> {
        if let Some(millis) = self.parse_env_var::<u64>("WORKER_TICK_INTERVAL_MS")? {
            config.tick_interval = Duration::from_millis(millis);
        }

        Ok(())
    }

    fn apply_logging_overrides(
        &self,
        config: &mut crate::domains::logging::LoggingConfig,
    ) -> ConfigResult<()> {
        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            config.level = crate::domains::logging::LogLevel::from_str(&log_level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", log_level)))?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            config.format = crate::domains::logging::LogFormat::from_str(&format)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_FORMAT: {}", format)))?;
        }

        Ok(())
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }

    /// Parse an optional prefixed environment variable
    fn parse_env_var<T>(&self, name: &str) -> ConfigResult<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_env_var(name) {
            Ok(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|e| ConfigError::EnvError(format!("Invalid {}: {}", name, e))),
            Err(_) => Ok(None),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_file_with_env_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "listener:\n  port: 7100\n  auth_key: from-file\nmanager:\n  ttl: 30").unwrap();

        temp_env::with_vars(
            [
                ("HIVETEST_AUTH_KEY", Some("from-env")),
                ("HIVETEST_TICK_INTERVAL_MS", Some("250")),
            ],
            || {
                let config = ConfigLoader::with_prefix("HIVETEST")
                    .from_file(file.path())
                    .unwrap();

                assert_eq!(config.listener.port, 7100);
                assert_eq!(config.listener.auth_key, "from-env");
                assert_eq!(config.manager.ttl, Duration::from_secs(30));
                assert_eq!(config.manager.tick_interval, Duration::from_millis(250));
            },
        );
    }

    #[test]
    fn test_invalid_env_value() {
        temp_env::with_var("HIVEBAD_LISTEN_PORT", Some("not-a-port"), || {
            let err = ConfigLoader::with_prefix("HIVEBAD").from_env().unwrap_err();
            assert!(matches!(err, ConfigError::EnvError(_)));
        });
    }

    #[test]
    fn test_invalid_file_fails_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "listener:\n  backlog: 0").unwrap();

        let err = ConfigLoader::new().from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::DomainError { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigLoader::new()
            .from_file("/nonexistent/hive.yaml")
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileReadError { .. }));
    }
}
