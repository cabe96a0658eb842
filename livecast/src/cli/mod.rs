use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::AppConfig;

mod check_config;
mod probe;
mod run;

pub use check_config::CheckConfigCommand;
pub use probe::ProbeCommand;
pub use run::RunCommand;

const DEFAULT_CONFIG: &str = "config.toml";

#[derive(Parser, Debug)]
#[command(name = "livecast")]
#[command(about = "Relay Twitch/YouTube live audio to an Icecast mount while the channel is live")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Watch the channel and relay it whenever it is live (default)
    Run(RunCommand),
    /// Check once whether the channel is live and print the resolved stream
    Probe(ProbeCommand),
    /// Validate the configuration file and print a summary
    CheckConfig(CheckConfigCommand),
}

impl Args {
    pub async fn run(self) -> Result<()> {
        let command = self.command.unwrap_or(Command::Run(RunCommand::default()));

        match command {
            Command::Run(cmd) => cmd.run().await,
            Command::Probe(cmd) => cmd.run().await,
            Command::CheckConfig(cmd) => cmd.run().await,
        }
    }
}

fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::load(path).with_context(|| format!("failed to load config from {}", path.display()))
}
