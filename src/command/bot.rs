//! `watchmux bot`: the command bridge without the monitor.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use crate::command;
use crate::config::Config;
use crate::mux;
use crate::notify::DispatchStats;
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

    command::send_banner(&client, &config, adapter.as_ref());

    let (tx, rx) = crossbeam_channel::unbounded();
    let poll_handle = command::spawn_poll_worker(client.clone(), tx, shutdown.clone());
    let router = Router::new(
        adapter,
        client,
        Arc::new(ActiveSessionRegistry::new()),
        command::load_macros(&config),
        config.clone(),
        // No monitor: session listings fall back to unknown states.
        Arc::new(Mutex::new(Vec::new())),
        Arc::new(AtomicBool::new(false)),
        Arc::new(DispatchStats::default()),
        Arc::new(AtomicU64::new(0)),
    );
    let command_handle = command::spawn_command_worker(router, rx, shutdown.clone());

    while !shutdown.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(200));
    }

    let _ = command_handle.join();
    drop(poll_handle);
    info!("bot stopped");
    Ok(())
}
