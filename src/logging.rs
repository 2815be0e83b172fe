use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::app_dirs::AppDirs;

const DEFAULT_FILTER: &str = "info,reqwest=warn,hyper=warn";
const LOG_FILE: &str = "viva.log";

/// Keeps the background writer alive. Drop it last.
pub struct LoggingHandle {
    pub guard: WorkerGuard,
}

/// The terminal belongs to the UI, so everything goes to a file.
///
/// `VIVA_LOG` (falling back to `RUST_LOG`) sets the filter and
/// `VIVA_LOG_FORMAT=json` switches to one JSON object per line.
pub fn init_logging() -> anyhow::Result<LoggingHandle> {
    let log_dir = AppDirs::log_dir().unwrap_or_else(std::env::temp_dir);
    init_logging_in(&log_dir)
}

pub fn init_logging_in(log_dir: &Path) -> anyhow::Result<LoggingHandle> {
    std::fs::create_dir_all(log_dir)?;

    let filter = std::env::var("VIVA_LOG")
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER));

    let file_appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    let format = std::env::var("VIVA_LOG_FORMAT").unwrap_or_else(|_| "text".into());

    let registry = tracing_subscriber::registry().with(filter);
    if format.eq_ignore_ascii_case("json") {
        registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .json()
                    .flatten_event(true)
                    .with_target(true)
                    .with_current_span(true),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true),
            )
            .try_init()?;
    }

    tracing::info!(
        component = "logging",
        log_path = %log_dir.join(LOG_FILE).display(),
        format = %format,
        "logging initialized"
    );

    Ok(LoggingHandle { guard })
}
