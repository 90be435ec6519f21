//! Logging initialization using the `tracing` ecosystem.
//!
//! Provides:
//! - Console output, either human-readable or one JSON object per line
//! - File output (daily rotation via `tracing-appender`)
//! - Configurable log level via env var `RUST_LOG` or explicit parameter

use serde::Deserialize;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Console output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Colored, human-readable lines.
    #[default]
    Pretty,
    /// Newline-delimited JSON, for log shippers.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// Should be called once at program start. Calling it a second time is a
/// no-op (the first subscriber stays installed).
///
/// # Parameters
///
/// - `log_level`: default filter if `RUST_LOG` is not set (e.g. `"info"`,
///   `"k4_throttle=debug,info"`)
/// - `log_dir`: optional directory for daily-rotating log files
/// - `module_name`: used as the log file prefix
/// - `format`: console format; the file layer is always plain text
pub fn init_logging(log_level: &str, log_dir: Option<&str>, module_name: &str, format: LogFormat) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let console_layer = match format {
        LogFormat::Pretty => fmt::layer().with_target(true).with_thread_ids(true).with_ansi(true).boxed(),
        LogFormat::Json => fmt::layer().json().with_target(true).with_current_span(false).boxed(),
    };

    let file_layer = log_dir.map(|dir| {
        let file_appender = tracing_appender::rolling::daily(dir, module_name);
        fmt::layer()
            .with_writer(file_appender)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
    });

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();
}
