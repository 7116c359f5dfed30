use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use tracing::info;

use crate::config::{Config, FileConfig};
use crate::{command, logger};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "watchmux")]
#[command(about = "Remote-control and monitoring bridge between tmux AI sessions and Telegram")]
struct Cli {
    /// Log level filter (overrides WATCHMUX_LOG_LEVEL and config)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the session monitor and the command bridge together
    Run,

    /// Run the chat command bridge alone
    Bot,

    /// Run the state-detection monitor alone
    Monitor,

    /// Print the resolved configuration (credential redacted)
    Config,

    /// Generate shell completions
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// --- Public Entry Point ---
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // Resolve the log level before anything logs: CLI flag beats env/config.
    let file_level = FileConfig::load().ok().and_then(|raw| raw.log_level);
    let level = cli.log_level.or(file_level);
    logger::init(level.as_deref())?;
    info!(args = ?std::env::args().collect::<Vec<_>>(), "watchmux start");

    match cli.command {
        Commands::Run => command::run::run(Config::load()?),
        Commands::Bot => command::bot::run(Config::load()?),
        Commands::Monitor => command::monitor::run(Config::load()?),
        Commands::Config => command::config::run(),
        Commands::Completions { shell } => {
            generate_completions(shell);
            Ok(())
        }
    }
}

fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, &name, &mut std::io::stdout());
}
