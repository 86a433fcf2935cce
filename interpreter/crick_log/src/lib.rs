//! This crate allows crick tools to enable rust logging.
//!
//! Suppose you're working on `crick_engine` and want to run a minimal
//! standalone program that can be debugged with access to `debug!` logs
//! emitted by the evaluator. You can do this by writing:
//!
//! ```toml
//! [dependencies]
//! crick_engine = { path = "../crick_engine" }
//! crick_log = { path = "../crick_log" }
//! ```
//!
//! And in your `main.rs`:
//!
//! ```rust
//! fn main() {
//!     crick_log::Logger::init(crick_log::LoggerConfig::from_env("CRICK")).unwrap();
//!     // Your test code using crick_engine...
//! }
//! ```
//!
//! Then run your program with:
//!
//! ```bash
//! CRICK_FILTER=debug cargo run
//! ```
//!
//! The `crick_log` crate exists as a minimal, self-contained logger setup,
//! allowing you to enable logging without depending on the much larger
//! `crick` binary crate. This helps you iterate quickly on individual
//! components like `crick_engine` without full rebuilds of the whole stack.

use std::{env::VarError, fs::File, io::IsTerminal, path::PathBuf};
use tracing::Subscriber;
use tracing_subscriber::{
    fmt::layer, prelude::*, registry::LookupSpan, util::TryInitError, EnvFilter, Layer,
};

/// The logger for the `crick` tools.
pub struct Logger;

/// Where the logs are written to.
pub enum LogWriter {
    /// Write to stdout.
    Stdout,
    /// Write to stderr.
    Stderr,
    /// Write to a file.
    File(PathBuf),
}

/// The configuration for the logger, usually harvested from `<PREFIX>_*`
/// environment variables.
pub struct LoggerConfig {
    /// The writer for the logger.
    pub log_writer: LogWriter,
    /// The filter directive, e.g. "debug" or "crick_engine=trace".
    pub filter: Result<String, VarError>,
    /// Whether to use color: "always", "never", or "auto".
    pub color: Result<String, VarError>,
    /// Whether to show line numbers ("1" enables them).
    pub line_numbers: Result<String, VarError>,
}

/// The error type for the logger.
#[derive(Debug)]
pub enum LogError {
    /// The color value is not valid.
    ColorNotValid(String),
    /// An environment variable was not valid unicode.
    NotUnicode(String),
    /// Wrapping an IO error.
    Io(std::io::Error),
    /// Wrapping a TryInitError.
    TryInit(TryInitError),
}

impl LoggerConfig {
    /// Create a logger configuration from `<prefix>_FILTER`,
    /// `<prefix>_COLOR`, `<prefix>_LOG_WRITER` and `<prefix>_LINE_NUMBERS`.
    pub fn from_env(prefix: &str) -> Self {
        let filter = std::env::var(format!("{}_FILTER", prefix));
        let color = std::env::var(format!("{}_COLOR", prefix));
        let log_writer = std::env::var(format!("{}_LOG_WRITER", prefix))
            .map(|s| match s.as_str() {
                "stdout" => LogWriter::Stdout,
                "stderr" => LogWriter::Stderr,
                _ => LogWriter::File(s.into()),
            })
            .unwrap_or(LogWriter::Stderr);
        let line_numbers = std::env::var(format!("{}_LINE_NUMBERS", prefix));

        LoggerConfig {
            filter,
            color,
            log_writer,
            line_numbers,
        }
    }
}

impl Logger {
    /// Initialize the global logger from the given configuration.
    pub fn init(cfg: LoggerConfig) -> Result<(), LogError> {
        let filter = match cfg.filter {
            Ok(filter) => EnvFilter::new(filter),
            Err(_) => EnvFilter::default().add_directive(tracing::Level::WARN.into()),
        };

        let color_log = match cfg.color {
            Ok(color) => match color.as_str() {
                "always" => true,
                "never" => false,
                "auto" => std::io::stderr().is_terminal(),
                e => return Err(LogError::ColorNotValid(e.to_string())),
            },
            Err(VarError::NotPresent) => std::io::stderr().is_terminal(),
            Err(VarError::NotUnicode(os_string)) => {
                return Err(LogError::NotUnicode(
                    os_string.to_string_lossy().to_string(),
                ));
            }
        };

        let line_numbers = matches!(cfg.line_numbers, Ok(ref v) if v == "1");

        let layer = Self::create_layer(cfg.log_writer, color_log, line_numbers)?;

        tracing_subscriber::Registry::default()
            .with(filter)
            .with(layer)
            .try_init()
            .map_err(LogError::TryInit)
    }

    fn create_layer<S>(
        log_writer: LogWriter,
        color_log: bool,
        line_numbers: bool,
    ) -> Result<Box<dyn Layer<S> + Send + Sync + 'static>, LogError>
    where
        S: Subscriber,
        for<'a> S: LookupSpan<'a>,
    {
        let layer = layer()
            .with_ansi(color_log)
            .with_target(true)
            .with_line_number(line_numbers);

        Ok(match log_writer {
            LogWriter::Stdout => Box::new(layer.with_writer(std::io::stdout)),
            LogWriter::Stderr => Box::new(layer.with_writer(std::io::stderr)),
            LogWriter::File(path) => {
                let file = File::create(path).map_err(LogError::Io)?;
                Box::new(layer.with_writer(file))
            }
        })
    }
}

impl std::error::Error for LogError {}

impl std::fmt::Display for LogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogError::ColorNotValid(s) => write!(f, "color value not valid: {}", s),
            LogError::NotUnicode(s) => write!(f, "not unicode: {}", s),
            LogError::Io(e) => write!(f, "io error: {}", e),
            LogError::TryInit(e) => write!(f, "subscriber init error: {:?}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_writer_creates_the_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crick.log");
        let cfg = LoggerConfig {
            log_writer: LogWriter::File(path.clone()),
            filter: Ok("debug".to_string()),
            color: Ok("never".to_string()),
            line_numbers: Err(VarError::NotPresent),
        };
        Logger::init(cfg).unwrap();
        tracing::debug!("hello");
        assert!(path.exists());
    }
}
