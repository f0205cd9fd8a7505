//! Subscriber setup for binaries embedding the engine.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{BurnError, EngineResult};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level. Logs go to stderr and, when
/// a file is configured, also to that file through a non-blocking writer;
/// keep the returned guard alive until exit so buffered lines are flushed.
pub fn init(config: &LoggingConfig) -> EngineResult<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| BurnError::Config(format!("logging.level: {e}")))?;

    let stderr = fmt::layer().with_target(false).with_writer(std::io::stderr);

    match &config.file {
        Some(path) => {
            let (dir, name) = split_log_path(path)?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .try_init()
                .map_err(|e| BurnError::Config(format!("logging: {e}")))?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .try_init()
                .map_err(|e| BurnError::Config(format!("logging: {e}")))?;
            Ok(None)
        }
    }
}

fn split_log_path(path: &Path) -> EngineResult<(&Path, &std::ffi::OsStr)> {
    let name = path
        .file_name()
        .ok_or_else(|| BurnError::Config(format!("logging.file: {} is not a file", path.display())))?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Ok((dir, name))
}
