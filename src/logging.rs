use anyhow::{anyhow, Context, Result};
use std::{fs, path::Path};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_FILE: &str = "plugindeck.log";

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Command-line runs log to stderr so stdout stays machine readable.
pub fn init_stderr(level: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow!("init logging: {err}"))
}

/// The terminal UI owns the screen, so events go to a file in `dir`. Keep the
/// guard alive until exit or buffered lines are lost.
pub fn init_file(dir: &Path, level: &str) -> Result<WorkerGuard> {
    fs::create_dir_all(dir).context("create log dir")?;
    let appender = tracing_appender::rolling::never(dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|err| anyhow!("init logging: {err}"))?;
    Ok(guard)
}
