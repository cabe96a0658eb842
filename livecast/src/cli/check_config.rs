use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use super::DEFAULT_CONFIG;

#[derive(Parser, Debug)]
pub struct CheckConfigCommand {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,
}

impl CheckConfigCommand {
    pub async fn run(self) -> Result<()> {
        let config = super::load_config(&self.config)?;

        println!("Configuration OK: {}", self.config.display());
        println!();
        println!(
            "  Channel:   {} on {} ({})",
            config.channel.channel_name, config.channel.platform, config.channel.channel_url
        );
        println!("  Poll:      every {}s", config.poll.interval.as_secs());
        println!(
            "  Icecast:   {}:{}{} as '{}'",
            config.icecast.host,
            config.icecast.port,
            config.icecast.mount_path(),
            config.icecast.source_user
        );
        println!(
            "  Audio:     {} @ {}, {} channel(s), {}",
            config.audio.codec,
            config.audio.bitrate,
            config.audio.channels,
            config.audio.content_type()
        );
        match &config.metadata {
            Some(target) => println!(
                "  AzuraCast: station {} at {}",
                target.station, target.api_url
            ),
            None => println!("  AzuraCast: disabled"),
        }
        println!(
            "  Tools:     {}, {}",
            config.tools.yt_dlp, config.tools.ffmpeg
        );

        if !config.warnings.is_empty() {
            println!();
            for warning in &config.warnings {
                println!("  warning: {}", warning);
            }
        }

        Ok(())
    }
}
