//! Logging init (SPEC_FULL.md §2), grounded in the daemon's `setup_logging`:
//! a registry subscriber with an `EnvFilter` layer plus an `fmt` layer, and
//! for the worker-manager process a non-blocking rolling file appender so
//! the foreground CLI commands stay quiet by default while the long-running
//! manager process always has a durable log.

use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs a stderr-only subscriber for short-lived CLI invocations.
/// `QUEUECTL_LOG_LEVEL` seeds the filter directly (not `RUST_LOG`) so the
/// documented environment variable is the one that is honored.
pub fn init_cli() {
    let filter = EnvFilter::try_from_env("QUEUECTL_LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Installs a subscriber for the detached manager process: stderr is
/// redirected to `/dev/null` by the parent, so all output goes to
/// `queuectl.log` beside the database via a non-blocking file appender.
/// Returns the guard that must be kept alive for the life of the process —
/// dropping it stops flushing buffered log lines.
pub fn init_manager(log_dir: &Path) -> tracing_appender::non_blocking::WorkerGuard {
    let filter = EnvFilter::try_from_env("QUEUECTL_LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info"));
    let appender = tracing_appender::rolling::never(log_dir, "queuectl.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();
    guard
}
