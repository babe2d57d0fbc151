use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::{AppError, AppResult};

pub const LOG_ENV: &str = "CITRUS_FARMS_LOG";
pub const DEFAULT_FILTER: &str = "citrus_farms=info,sqlx=warn";
pub const LOG_FILE_PREFIX: &str = "citrus-farms.log";

/// Keeps the background file writer alive; dropping it flushes pending records.
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

pub fn env_filter(directives: &str) -> EnvFilter {
    EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber: JSON records on stderr plus a daily rolling file under
/// `log_dir` when one is given. Records from the `log` crate are bridged in.
///
/// A second call leaves the first subscriber in place.
pub fn init(directives: &str, log_dir: Option<&Path>) -> AppResult<LoggingGuard> {
    let _ = tracing_log::LogTracer::init();

    let stderr_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(std::io::stderr);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                AppError::from(e).with_context("path", dir.display().to_string())
            })?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_target(true)
                .with_ansi(false)
                .with_timer(UtcTime::rfc_3339())
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(env_filter(directives))
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(
            target: "citrus_farms",
            event = "logging_initialized",
            filter = %directives,
            file_sink = log_dir.is_some()
        );
    }

    Ok(LoggingGuard { _file: guard })
}
