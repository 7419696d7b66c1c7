//! Structured logging for the sqlask server
//!
//! Features:
//! - Structured JSON logging for production
//! - Human-readable console logging for development
//! - File rotation with daily log files
//! - Per-request spans carrying a request ID

use crate::config::LoggingConfig;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_FILE_PREFIX: &str = "sqlask-server.log";

/// Log format configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format for development
    Pretty,
    /// JSON format for production (structured logging)
    Json,
    /// Compact format for testing
    Compact,
}

impl LogFormat {
    /// Unknown values fall back to pretty
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

/// Log output configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    /// Log to stdout only
    Stdout,
    /// Log to file only
    File,
    /// Log to both stdout and file
    Both,
}

impl LogOutput {
    /// Unknown values fall back to stdout
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" => LogOutput::File,
            "both" => LogOutput::Both,
            _ => LogOutput::Stdout,
        }
    }
}

/// Build the level filter: the configured level plus quiet third-party crates
fn build_filter(level: &str) -> anyhow::Result<EnvFilter> {
    let filter = EnvFilter::try_new(level).or_else(|_| EnvFilter::try_new("info"))?;
    Ok(filter
        .add_directive("hyper=warn".parse()?)
        .add_directive("tokio=warn".parse()?)
        .add_directive("runtime=warn".parse()?)
        .add_directive("tower=warn".parse()?)
        .add_directive("tower_http=warn".parse()?)
        .add_directive("h2=warn".parse()?))
}

fn file_appender(directory: &str) -> std::io::Result<RollingFileAppender> {
    std::fs::create_dir_all(directory)?;
    Ok(RollingFileAppender::new(Rotation::DAILY, directory, LOG_FILE_PREFIX))
}

/// Initialize the global subscriber from `config`.
///
/// `RUST_LOG`, `LOG_FORMAT`, `LOG_OUTPUT` and `LOG_DIR` have already been
/// folded into `config` by [`crate::config::Config::load`].
///
/// ```bash
/// # Production: JSON to file with info level
/// RUST_LOG=info LOG_FORMAT=json LOG_OUTPUT=file LOG_DIR=/var/log/sqlask sqlask-server
///
/// # Debugging the pipeline only
/// RUST_LOG=sqlask_core=debug,sqlask_server=debug LOG_FORMAT=compact sqlask-server
/// ```
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let format = LogFormat::parse(&config.format);
    let output = LogOutput::parse(&config.output);
    let env_filter = build_filter(&config.level)?;

    match (output, format) {
        (LogOutput::Stdout, LogFormat::Pretty) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_thread_ids(true).with_target(true))
                .try_init()?;
        }
        (LogOutput::Stdout, LogFormat::Json) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_current_span(true))
                .try_init()?;
        }
        (LogOutput::Stdout, LogFormat::Compact) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().compact())
                .try_init()?;
        }
        (LogOutput::File, format) => {
            let writer = file_appender(&config.directory)?;
            let file_layer = match format {
                LogFormat::Json => fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(writer)
                    .boxed(),
                _ => fmt::layer().with_writer(writer).with_ansi(false).boxed(),
            };

            tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .try_init()?;
        }
        // Boxed layers for dynamic dispatch
        (LogOutput::Both, format) => {
            let writer = file_appender(&config.directory)?;

            let stdout_layer = match format {
                LogFormat::Pretty => fmt::layer()
                    .pretty()
                    .with_thread_ids(true)
                    .with_target(true)
                    .boxed(),
                LogFormat::Json => fmt::layer().json().with_current_span(true).boxed(),
                LogFormat::Compact => fmt::layer().compact().boxed(),
            };

            let file_layer = fmt::layer().with_writer(writer).with_ansi(false).boxed();

            tracing_subscriber::registry()
                .with(env_filter)
                .with(stdout_layer)
                .with(file_layer)
                .try_init()?;
        }
    }

    tracing::info!(
        format = ?format,
        output = ?output,
        level = %config.level,
        "Logging initialized"
    );
    if matches!(output, LogOutput::File | LogOutput::Both) {
        tracing::debug!(directory = %config.directory, "Writing log files");
    }

    Ok(())
}
