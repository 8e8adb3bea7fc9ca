//! Structured logging setup, shared by the daemon binary and its test
//! harnesses.

use std::path::Path;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Knobs for [`init_logging`], deserialized straight out of the daemon's TOML
/// config file.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct LoggingConfig {
    /// Directory to also write logs to, non-blocking, in addition to stderr.
    #[serde(default)]
    pub log_dir: Option<std::path::PathBuf>,

    /// Prefix for rotated log file names.
    #[serde(default)]
    pub log_file_prefix: Option<String>,

    /// Emit JSON instead of the compact human-readable format.
    #[serde(default)]
    pub json_format: bool,
}

/// Initializes the global `tracing` subscriber.
///
/// Must be called once, inside an entered Tokio runtime, before any other
/// task is spawned. Returns a guard that must be kept alive for the
/// lifetime of the process if file logging is enabled (dropping it flushes
/// and stops the non-blocking writer).
pub fn init_logging(
    service_name: &str,
    config: &LoggingConfig,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("info,{service_name}=debug")));

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let prefix = config
                .log_file_prefix
                .clone()
                .unwrap_or_else(|| service_name.to_string());
            let appender = tracing_appender::rolling::daily(dir, prefix);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (Some(non_blocking), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.json_format {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .with(file_layer.map(|w| tracing_subscriber::fmt::layer().json().with_writer(w)))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().compact())
            .with(file_layer.map(|w| tracing_subscriber::fmt::layer().compact().with_writer(w)))
            .init();
    }

    guard
}

/// Ensures a directory exists before the logging appender tries to roll
/// files into it.
pub fn ensure_log_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}
