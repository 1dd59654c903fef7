//! Structured logging setup for Hive
//!
//! Command output goes to stdout. A running manager logs to stderr so its
//! stdout stays clean for the credentials line, and local workers must log to
//! stderr because their stdout carries the channel to the manager.

mod init;

pub use init::{build_env_filter, init_logging, init_worker_logging, LogWriter};
