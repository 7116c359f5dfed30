//! `watchmux monitor`: the state-detection engine without the command bridge.

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
use crate::telegram::TelegramClient;

pub fn run(config: Config) -> Result<()> {
    let adapter = mux::create_adapter();
    command::ensure_adapter(adapter.as_ref());

    let client = Arc::new(TelegramClient::new(&config.bot_token));
    command::check_credential(&client)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    command::install_shutdown_handler(shutdown.clone())?;

    let notifier = Notifier::new(
        client,
        config.chat_id,
        Arc::new(AtomicBool::new(false)),
        Arc::new(DispatchStats::default()),
    );
    let mut monitor = Monitor::new(
        adapter,
        Classifier::from_config(&config),
        notifier,
        Arc::new(Mutex::new(Vec::new())),
        config.full_prefix(),
        config.poll_interval,
        shutdown,
        Arc::new(AtomicU64::new(0)),
    );
    monitor.run();
    info!("monitor stopped");
    Ok(())
}
