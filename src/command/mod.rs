//! Subcommand entry points and the worker wiring shared between them.

pub mod bot;
pub mod config;
pub mod monitor;
pub mod run;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::macros::MacroTable;
use crate::mux::PaneAdapter;
use crate::router::Router;
use crate::telegram::{TelegramClient, Update};

/// Server-side long-poll window. Also bounds the shutdown grace period of
/// the poll worker.
const LONG_POLL_WINDOW: Duration = Duration::from_secs(20);

/// Backoff cap for chat transport failures.
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Verify the multiplexer is reachable; exits with code 2 otherwise.
pub(crate) fn ensure_adapter(adapter: &dyn PaneAdapter) {
    let reachable = adapter.is_running().unwrap_or(false);
    if !reachable {
        eprintln!(
            "watchmux: no {} server reachable; start a session first",
            adapter.backend_name()
        );
        std::process::exit(2);
    }
}

/// Validate the bot credential. An API rejection is configuration-level and
/// fatal; a transport failure is not (the pollers retry).
pub(crate) fn check_credential(client: &TelegramClient) -> Result<()> {
    match client.get_me() {
        Ok(me) => {
            info!(bot = ?me.username, "telegram credential ok");
            Ok(())
        }
        Err(e) if e.is_retryable() => {
            warn!(error = %e, "telegram unreachable at startup, continuing");
            Ok(())
        }
        Err(e) => Err(anyhow::Error::from(e).context("Telegram rejected the bot credential")),
    }
}

pub(crate) fn load_macros(config: &Config) -> MacroTable {
    match &config.macros_path {
        Some(path) => match MacroTable::load(path) {
            Ok(table) => table,
            Err(e) => {
                warn!(error = %e, "macro table unavailable, continuing without macros");
                MacroTable::empty()
            }
        },
        None => MacroTable::empty(),
    }
}

/// Install the Ctrl-C / SIGTERM handler that raises the shared shutdown
/// flag observed by every worker.
pub(crate) fn install_shutdown_handler(shutdown: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        info!("shutdown signal received");
        shutdown.store(true, Ordering::Relaxed);
    })
    .context("Failed to install shutdown handler")
}

/// Announce the bridge on the configured chat, best effort.
pub(crate) fn send_banner(client: &TelegramClient, config: &Config, adapter: &dyn PaneAdapter) {
    let sessions = adapter
        .list_sessions(&config.full_prefix())
        .map(|panes| {
            panes
                .iter()
                .map(|p| p.name.clone())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();
    let text = if sessions.is_empty() {
        "watchmux online — no sessions yet".to_string()
    } else {
        format!("watchmux online — watching: {}", sessions)
    };
    if let Err(e) = client.send_message(config.chat_id, &text) {
        warn!(error = %e, "startup banner not delivered");
    }
}

/// Long-poll worker: reads inbound updates and enqueues them for the
/// command worker. The two are separate so a slow pane write never stalls
/// the poll, and inbound order is preserved by the channel.
pub(crate) fn spawn_poll_worker(
    client: Arc<TelegramClient>,
    tx: Sender<Update>,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut offset: i64 = 0;
        let mut backoff = Duration::from_secs(1);
        while !shutdown.load(Ordering::Relaxed) {
            match client.get_updates(offset, LONG_POLL_WINDOW) {
                Ok(updates) => {
                    backoff = Duration::from_secs(1);
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        if tx.send(update).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "long poll failed, backing off");
                    std::thread::sleep(backoff + transport_jitter());
                    backoff = (backoff * 2).min(BACKOFF_CAP);
                }
            }
        }
        debug!("poll worker stopped");
    })
}

/// Command worker: drains the update channel through the router.
pub(crate) fn spawn_command_worker(
    router: Router,
    rx: Receiver<Update>,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        loop {
            match rx.recv_timeout(Duration::from_millis(200)) {
                Ok(update) => router.handle_update(update),
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                    if shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                }
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("command worker stopped");
    })
}

/// Small decorrelation so restarting bridges don't hammer the API in sync.
fn transport_jitter() -> Duration {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    Duration::from_millis(u64::from(nanos % 500))
}
