//! File logging for the bridge.
//!
//! Every worker logs structured events through `tracing`; writes go through
//! tracing-appender's non-blocking worker so a slow disk never stalls a
//! monitor tick or the command worker.

use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

const LOG_FILE: &str = "watchmux.log";

// Holding the guard keeps the background writer alive for the process
// lifetime; it also marks logging as initialized.
static APPENDER_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Initialize file logging. `level` (from --log-level or config) takes
/// precedence over RUST_LOG; the default is "info". Calling again after a
/// successful init is a no-op.
pub fn init(level: Option<&str>) -> Result<()> {
    if APPENDER_GUARD.get().is_some() {
        return Ok(());
    }

    let dir = state_dir();
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory at {}", dir.display()))?;

    let appender = tracing_appender::rolling::never(&dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = APPENDER_GUARD.set(guard);

    let filter = level
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false),
        )
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(())
}

/// Directory holding the log file: `$XDG_STATE_HOME/watchmux`, falling back
/// to `~/.local/state/watchmux`, then `./watchmux` when no home exists.
fn state_dir() -> PathBuf {
    std::env::var_os("XDG_STATE_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| home::home_dir().map(|home| home.join(".local").join("state")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("watchmux")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_dir_is_app_scoped() {
        // Whichever base wins, the app-scoped leaf is always appended.
        assert!(state_dir().ends_with("watchmux"));
    }
}
