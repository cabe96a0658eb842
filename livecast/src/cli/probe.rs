use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use crate::probe::{ProbeOutcome, Prober};
use crate::process::SystemRunner;

use super::DEFAULT_CONFIG;

#[derive(Parser, Debug)]
pub struct ProbeCommand {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Also check that the resolved manifest answers
    #[arg(long)]
    pub check_manifest: bool,
}

impl ProbeCommand {
    pub async fn run(self) -> Result<()> {
        let config = super::load_config(&self.config)?;
        crate::logging::init(&config.logging)?;

        let channel = &config.channel;
        let prober = Prober::new(
            Arc::new(SystemRunner::new()),
            &config.tools,
            config.supervisor.probe_timeout,
        );

        println!(
            "Probing {} channel '{}' ({})",
            channel.platform, channel.channel_name, channel.channel_url
        );

        match prober.probe(channel).await? {
            ProbeOutcome::NotLive => println!("  Not live"),
            ProbeOutcome::Live(info) => {
                println!("  Live");
                println!("  Title:    {}", info.title.as_deref().unwrap_or("<none>"));
                println!("  Manifest: {}", info.manifest_url);

                if self.check_manifest {
                    let reachable = prober.manifest_reachable(&info.manifest_url).await;
                    println!(
                        "  Manifest reachable: {}",
                        if reachable { "yes" } else { "no" }
                    );
                }
            }
        }

        Ok(())
    }
}
