use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Replays recorded assistant stream events through the chat-state reducer.
#[derive(Parser)]
#[command(version, about, long_about = None, author)]
pub struct Cli {
    /// Preferences file to use instead of the default location
    #[arg(long, env = "CHATSTREAM_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Feed a JSON Lines event transcript through the reducer and print the store
    Replay {
        /// Transcript file, one stream event per line
        file: PathBuf,

        /// Maximum messages kept in the window (overrides preferences)
        #[arg(long)]
        max_window: Option<usize>,

        /// Model name for new assistant messages (overrides preferences)
        #[arg(short, long)]
        model: Option<String>,

        /// Print a one-line summary instead of the full store
        #[arg(long)]
        summary: bool,
    },
    /// Manage the preferences file
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Print the preferences file location
    Path,
    /// Show the effective preferences
    Show,
    /// Write a preferences file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_replay_overrides() {
        let cli = Cli::try_parse_from([
            "chatstream",
            "replay",
            "events.jsonl",
            "--max-window",
            "10",
            "--model",
            "m",
            "--summary",
        ])
        .unwrap();

        assert!(matches!(
            cli.command,
            Commands::Replay {
                ref file,
                max_window: Some(10),
                ref model,
                summary: true,
            } if file == &PathBuf::from("events.jsonl") && model.as_deref() == Some("m")
        ));
    }

    #[test]
    fn parses_config_init_with_global_path() {
        let cli =
            Cli::try_parse_from(["chatstream", "config", "init", "--force", "--config", "p.toml"])
                .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("p.toml")));
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigCommands::Init { force: true }
            }
        ));
    }
}
