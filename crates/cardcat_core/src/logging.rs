use std::path::Path;

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::CardcatConfig;

/// Initializes the logging system with file + console output.
/// Returns a guard that must be kept alive for the duration of the run.
pub fn init_logging(config: &CardcatConfig) -> Result<WorkerGuard> {
    let logs_dir = config.logs_dir()?;
    install(&logs_dir, &default_filter(&config.log_level))
}

/// Daily file under `logs_dir` plus compact stderr. `RUST_LOG` beats `filter`.
fn install(logs_dir: &Path, filter: &str) -> Result<WorkerGuard> {
    std::fs::create_dir_all(logs_dir)?;

    // File appender: daily rotation
    let file_appender = tracing_appender::rolling::daily(logs_dir, "cardcat");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;

    Ok(guard)
}

/// `info` becomes `info,cardcat_app=info,...` so our crates follow the
/// configured level while dependencies stay at it too.
fn default_filter(level: &str) -> String {
    let level = level.trim();
    let level = if level.is_empty() { "info" } else { level };
    format!(
        "{level},cardcat_app={level},cardcat_core={level},cardcat_catalog={level},cardcat_docs={level}"
    )
}
