//! CLI argument parsing definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a manager, spawn local workers and accept remote ones
    Serve {
        /// Number of local workers to spawn at startup
        #[arg(long, value_name = "N", default_value_t = 0)]
        workers: usize,

        /// Kind of the local workers
        #[arg(long, value_name = "KIND", default_value = "echo")]
        kind: String,

        /// Stop after this many ticks instead of waiting for Ctrl+C
        #[arg(long, value_name = "N")]
        ticks: Option<u64>,

        /// Argument for every local worker (repeatable)
        #[arg(long = "worker-arg", value_name = "ARG")]
        worker_args: Vec<String>,
    },

    /// Run a worker (spawned by a manager, or dialling in with --connect)
    Worker {
        /// Built-in worker kind
        #[arg(long, value_name = "KIND", default_value = "echo")]
        kind: String,

        /// Manager endpoint to dial, as HOST:PORT. Without it the worker talks
        /// over stdin/stdout.
        #[arg(long, value_name = "HOST:PORT")]
        connect: Option<String>,

        /// Shared key for --connect (defaults to the configured key)
        #[arg(long, value_name = "KEY", requires = "connect")]
        auth_key: Option<String>,

        /// Arguments for the worker kind, e.g. `repeat=2`
        #[arg(value_name = "ARG")]
        args: Vec<String>,
    },

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        config_cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        #[arg(long, value_name = "PATH")]
        config_file: PathBuf,
    },

    /// Generate a sample configuration file
    Generate {
        /// Output file path
        #[arg(long, value_name = "PATH")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },

    /// Show current configuration in use
    Show {
        /// Path to configuration file (optional, uses default loading logic)
        #[arg(long, value_name = "PATH")]
        config_file: Option<PathBuf>,

        /// Output format: yaml, json
        #[arg(long, value_name = "FORMAT", default_value = "yaml")]
        format: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "hive",
            "worker",
            "--kind",
            "echo",
            "--config",
            "/etc/hive.yaml",
            "--log-level",
            "debug",
        ]);

        assert_eq!(cli.config, Some(PathBuf::from("/etc/hive.yaml")));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(
            cli.command,
            Commands::Worker { ref kind, connect: None, auth_key: None, ref args }
                if kind == "echo" && args.is_empty()
        ));
    }

    #[test]
    fn test_worker_arguments() {
        for argv in [
            &["hive", "worker", "--kind", "echo", "repeat=2"][..],
            &["hive", "worker", "--kind", "echo", "--", "repeat=2"],
        ] {
            let cli = Cli::try_parse_from(argv).unwrap();
            assert!(matches!(
                cli.command,
                Commands::Worker { ref args, .. } if args == &["repeat=2".to_string()]
            ));
        }

        let cli = Cli::parse_from(["hive", "serve", "--worker-arg", "repeat=2", "--worker-arg", "x=1"]);
        assert!(matches!(
            cli.command,
            Commands::Serve { ref worker_args, .. } if worker_args.len() == 2
        ));
    }

    #[test]
    fn test_auth_key_requires_connect() {
        assert!(Cli::try_parse_from(["hive", "worker", "--auth-key", "k"]).is_err());
    }
}
