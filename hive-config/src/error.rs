//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// A `HIVE_*` override that could not be parsed
    #[error("Environment variable error: {0}")]
    EnvError(String),

    #[error("Invalid {domain} configuration: {message}")]
    DomainError { domain: String, message: String },
}
