mod classify;
mod cli;
mod cmd;
mod command;
mod config;
mod logger;
mod macros;
mod monitor;
mod mux;
mod notify;
mod registry;
mod router;
mod session;
mod telegram;
mod tracker;

use anyhow::Result;
use tracing::{error, info};

fn main() -> Result<()> {
    match cli::run() {
        Ok(()) => {
            info!("watchmux finished successfully");
            Ok(())
        }
        Err(err) => {
            error!(error = ?err, "watchmux failed");
            Err(err)
        }
    }
}
