use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::Context;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use ags_core::api::LoggingConfig;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// `RUST_LOG` when set, otherwise `logging.level`.
fn log_filter(level: &str) -> anyhow::Result<EnvFilter> {
    match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => Ok(EnvFilter::from_default_env()),
        _ => EnvFilter::try_new(level).with_context(|| format!("invalid log level {level:?}")),
    }
}

/// Configured directory, or `<tmp>/ags` when unset or blank.
pub fn log_dir(logging: &LoggingConfig) -> PathBuf {
    logging
        .directory
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("ags"))
}

/// One file per process; the flush guard lives until exit.
fn file_writer(logging: &LoggingConfig) -> anyhow::Result<Option<NonBlocking>> {
    if !logging.file {
        return Ok(None);
    }
    let dir = log_dir(logging);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("create log dir {} failed", dir.display()))?;
    let appender =
        tracing_appender::rolling::never(dir, format!("ags.{}.log", std::process::id()));
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = LOG_GUARD.set(guard);
    Ok(Some(writer))
}

/// Installs the global subscriber with an optional stderr layer and an
/// optional file layer.
///
/// `console` overrides `logging.console` for this run (progress bars own the
/// terminal while they are drawn).
pub fn init_tracing(logging: &LoggingConfig, console: bool) -> anyhow::Result<()> {
    if !logging.enabled {
        return Ok(());
    }
    let filter = log_filter(&logging.level)?;
    let file_layer = file_writer(logging)?
        .map(|w| tracing_subscriber::fmt::layer().with_writer(w).with_ansi(false));
    let stderr_layer = console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("install tracing subscriber")
}
