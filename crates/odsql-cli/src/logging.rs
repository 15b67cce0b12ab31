//! Structured logging for the odsql binary
//!
//! Logs never go to stdout, which carries the SQL and JSON output.

use thiserror::Error;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;

const LOG_FILE: &str = "odsql.log";

type Filtered = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<Filtered> + Send + Sync>;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("cannot create log directory {directory}: {source}")]
    Directory {
        directory: String,
        source: std::io::Error,
    },

    #[error("cannot open log file in {directory}: {source}")]
    Appender {
        directory: String,
        source: InitError,
    },
}

/// Log format configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, multi-line
    Pretty,
    /// One JSON object per event
    Json,
    Compact,
}

impl LogFormat {
    pub fn parse(value: &str) -> Self {
        match value {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Compact,
        }
    }
}

/// Log output configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Stderr,
    /// Daily rotated files under the configured directory
    File,
    Both,
}

impl LogOutput {
    pub fn parse(value: &str) -> Self {
        match value {
            "file" => LogOutput::File,
            "both" => LogOutput::Both,
            _ => LogOutput::Stderr,
        }
    }
}

fn console_layer(format: LogFormat) -> BoxedLayer {
    match format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .boxed(),
    }
}

fn file_layer(directory: &str) -> Result<BoxedLayer, LoggingError> {
    std::fs::create_dir_all(directory).map_err(|source| LoggingError::Directory {
        directory: directory.to_string(),
        source,
    })?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE)
        .build(directory)
        .map_err(|source| LoggingError::Appender {
            directory: directory.to_string(),
            source,
        })?;
    Ok(fmt::layer()
        .with_writer(appender)
        .with_ansi(false)
        .boxed())
}

/// Install the global subscriber.
///
/// `level` takes `EnvFilter` directives, e.g. `debug` or
/// `odsql_compiler=trace,warn`. Invalid directives fall back to `warn`.
/// When the log directory is unusable the problem is reported on stderr and
/// events go to stderr instead.
pub fn init(config: &LoggingConfig) {
    let format = LogFormat::parse(&config.format);
    let output = LogOutput::parse(&config.output);

    let env_filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("warn"));

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if output != LogOutput::File {
        layers.push(console_layer(format));
    }
    if output != LogOutput::Stderr {
        match file_layer(&config.directory) {
            Ok(layer) => layers.push(layer),
            Err(err) => {
                eprintln!("odsql: {}; logging to stderr", err);
                if output == LogOutput::File {
                    layers.push(console_layer(format));
                }
            }
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .init();

    tracing::debug!(
        format = ?format,
        output = ?output,
        level = %config.level,
        "logging initialized"
    );
}
