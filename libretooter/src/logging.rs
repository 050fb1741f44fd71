//! Logging setup for the retooter binary
//!
//! Diagnostics go to stderr through `tracing`, leaving stdout for the bootstrap
//! prompt, minted credentials and the optional JSON run summary. `RUST_LOG`
//! still overrides the level when set.

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

/// Environment variable selecting the log format
pub const LOG_FORMAT: &str = "RETOOTER_LOG_FORMAT";

/// Environment variable selecting the log level
pub const LOG_LEVEL: &str = "RETOOTER_LOG_LEVEL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Plain lines, suitable for CI logs
    Text,
    /// One JSON object per line
    Json,
    /// Multi-line with colors
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!(
                "Invalid log format: '{}'. Valid options: text, json, pretty",
                s
            )),
        }
    }
}

/// Subscriber settings for one run
#[derive(Debug)]
pub struct LoggingConfig {
    format: LogFormat,
    level: String,
}

impl LoggingConfig {
    /// Settings from `RETOOTER_LOG_FORMAT` and `RETOOTER_LOG_LEVEL`
    ///
    /// An explicit `format` wins over the environment, `verbose` forces debug.
    /// Defaults to text at info level.
    pub fn from_env(format: Option<LogFormat>, verbose: bool) -> Self {
        let format = format
            .or_else(|| std::env::var(LOG_FORMAT).ok().and_then(|s| s.parse().ok()))
            .unwrap_or(LogFormat::Text);
        let level = if verbose {
            "debug".to_string()
        } else {
            std::env::var(LOG_LEVEL).unwrap_or_else(|_| "info".to_string())
        };

        Self { format, level }
    }

    /// Install the global subscriber; later calls are ignored
    pub fn init(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        let _ = match self.format {
            LogFormat::Json => tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .flatten_event(true)
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init(),
            LogFormat::Text => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .try_init(),
        };
    }
}
