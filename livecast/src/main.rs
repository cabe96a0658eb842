use anyhow::Result;
use clap::Parser;

mod cli;
mod config;
mod logging;
mod metadata;
mod probe;
mod process;
mod relay;
mod supervisor;
mod util;

#[tokio::main]
async fn main() -> Result<()> {
    cli::Args::parse().run().await
}
