use chatstream::cli::{Cli, Commands, ConfigCommands};
use chatstream::commands::{
    Command,
    config::{ConfigAction, ConfigCommand},
    replay::ReplayCommand,
};
use chatstream_core::preferences::Preferences;
use clap::Parser;
use eyre::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Install color-eyre for better error reports
    color_eyre::install()?;

    let cli = Cli::parse();

    // Initialize tracing (level configured via RUST_LOG env var)
    chatstream_core::utils::tracing::init_tracing()?;

    match cli.command {
        Commands::Replay {
            file,
            max_window,
            model,
            summary,
        } => {
            let preferences = match &cli.config {
                Some(path) => Preferences::load_from(path)?,
                None => Preferences::load().unwrap_or_default(),
            };
            ReplayCommand {
                file,
                max_window,
                model,
                summary,
                preferences,
            }
            .execute()
            .await
        }
        Commands::Config { action } => {
            let action = match action {
                ConfigCommands::Path => ConfigAction::Path,
                ConfigCommands::Show => ConfigAction::Show,
                ConfigCommands::Init { force } => ConfigAction::Init { force },
            };
            ConfigCommand {
                action,
                path: cli.config,
            }
            .execute()
            .await
        }
    }
}
