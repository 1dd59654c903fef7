use anyhow::Result;
use clap::Parser;
use hive_logging::{init_logging, init_worker_logging, LogWriter};
use tracing::{error, info};

mod cli;
mod commands;

use cli::{Cli, Commands, ConfigCommands};
use commands::serve::ServeOptions;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first
    let config = commands::load_config(cli.config.as_ref())?;
    let log_level = cli.log_level.as_deref();

    match &cli.command {
        Commands::Worker {
            kind,
            connect,
            auth_key,
            args,
        } => {
            // stdout may be the channel to the manager
            init_worker_logging(&config.logging, log_level)?;
            let result = commands::worker::run(
                kind,
                args,
                connect.as_deref(),
                auth_key.as_deref(),
                &config,
            )
            .await;

            // The blocking stdin read cannot be cancelled, so dropping the
            // runtime would wait for the manager to close our stdin
            let code = match result {
                Ok(()) => 0,
                Err(e) => {
                    error!("Worker failed: {:#}", e);
                    1
                }
            };
            std::process::exit(code)
        }
        Commands::Serve {
            workers,
            kind,
            ticks,
            worker_args,
        } => {
            init_logging(&config.logging, log_level, LogWriter::Stderr)?;
            info!("Hive manager starting");
            commands::serve::run(
                &config,
                ServeOptions {
                    workers: *workers,
                    kind,
                    worker_args,
                    ticks: *ticks,
                    config_path: cli.config.as_ref(),
                    log_level,
                },
            )
            .await
        }
        Commands::Config { config_cmd } => {
            init_logging(&config.logging, log_level, LogWriter::Stdout)?;
            match config_cmd {
                ConfigCommands::Validate { config_file } => {
                    commands::config::validate(config_file)
                }
                ConfigCommands::Generate { output, force } => {
                    commands::config::generate(output, *force)
                }
                ConfigCommands::Show {
                    config_file,
                    format,
                } => commands::config::show(config_file.as_ref().or(cli.config.as_ref()), format),
            }
        }
    }
}
