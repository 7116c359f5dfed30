//! `watchmux run`: monitor and command bridge together.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Mutex;

use anyhow::Result;
use tracing::info;

use crate::classify::Classifier;
use crate::command;
use crate::config::Config;
use crate::monitor::Monitor;
use crate::mux;
use crate::notify::{DispatchStats, Notifier};
use crate::registry::ActiveSessionRegistry;
use crate::router::Router;
use crate::telegram::TelegramClient;

pub fn run(config: Config) -> Result<()> {
    let adapter = mux::create_adapter();
    command::ensure_adapter(adapter.as_ref());

    let client = Arc::new(TelegramClient::new(&config.bot_token));
    command::check_credential(&client)?;

    let config = Arc::new(config);
    let shutdown = Arc::new(AtomicBool::new(false));
    command::install_shutdown_handler(shutdown.clone())?;

    let paused = Arc::new(AtomicBool::new(false));
    let stats = Arc::new(DispatchStats::default());
    let ticks = Arc::new(AtomicU64::new(0));
    let board = Arc::new(Mutex::new(Vec::new()));

    command::send_banner(&client, &config, adapter.as_ref());

    // Inbound: long-poll worker feeds the command worker over an unbounded
    // channel, preserving arrival order per conversation.
    let (tx, rx) = crossbeam_channel::unbounded();
    let poll_handle = command::spawn_poll_worker(client.clone(), tx, shutdown.clone());
    let router = Router::new(
        adapter.clone(),
        client.clone(),
        Arc::new(ActiveSessionRegistry::new()),
        command::load_macros(&config),
        config.clone(),
        board.clone(),
        paused.clone(),
        stats.clone(),
        ticks.clone(),
    );
    let command_handle = command::spawn_command_worker(router, rx, shutdown.clone());

    // Outbound: the monitor owns tracker and notifier and runs on this
    // thread until shutdown.
    let notifier = Notifier::new(client.clone(), config.chat_id, paused, stats);
    let mut monitor = Monitor::new(
        adapter,
        Classifier::from_config(&config),
        notifier,
        board,
        config.full_prefix(),
        config.poll_interval,
        shutdown.clone(),
        ticks,
    );
    monitor.run();

    // The command worker drains queued commands before exiting. The poll
    // worker may sit in a blocking read for up to the long-poll window; it
    // holds no in-flight state, so it is not joined.
    let _ = command_handle.join();
    drop(poll_handle);
    info!("bridge stopped");
    Ok(())
}
