use anyhow::Result;
use hive_config::{LogFormat, LoggingConfig};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// Stream the subscriber writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogWriter {
    Stdout,
    Stderr,
}

/// Build the level filter. An explicit override wins, then `RUST_LOG`, then the
/// configured level.
pub fn build_env_filter(config: &LoggingConfig, level_override: Option<&str>) -> EnvFilter {
    match level_override {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| {
            eprintln!("Invalid log level '{}', falling back to '{}'", level, config.level);
            EnvFilter::new(config.level.to_string())
        }),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.level.to_string())),
    }
}

/// Initialize the global tracing subscriber from configuration
pub fn init_logging(
    config: &LoggingConfig,
    level_override: Option<&str>,
    writer: LogWriter,
) -> Result<()> {
    let env_filter = build_env_filter(config, level_override);
    let make_writer = match writer {
        LogWriter::Stdout => BoxMakeWriter::new(std::io::stdout),
        LogWriter::Stderr => BoxMakeWriter::new(std::io::stderr),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(make_writer)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    // Use try_init to avoid panic if global subscriber already set
    let result = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Text => builder.try_init(),
    };

    if result.is_err() {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }

    Ok(())
}

/// Initialize tracing for worker processes (stderr, stdout is the channel)
pub fn init_worker_logging(config: &LoggingConfig, level_override: Option<&str>) -> Result<()> {
    init_logging(config, level_override, LogWriter::Stderr)?;
    tracing::debug!("Worker tracing initialized");
    Ok(())
}
