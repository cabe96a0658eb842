mod azuracast;

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::config::MetadataTarget;

use azuracast::AzuraCastClient;

const OFFLINE: &str = "OFFLINE";

/// The title/artist pair shown by the radio station.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlaying {
    pub title: String,
    pub artist: String,
}

impl NowPlaying {
    /// Entry for a running broadcast; the channel name doubles as the title when none is known.
    pub fn for_stream(channel_name: &str, title: Option<&str>) -> Self {
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(channel_name);
        Self {
            title: title.to_string(),
            artist: channel_name.to_string(),
        }
    }

    pub fn offline() -> Self {
        Self {
            title: OFFLINE.to_string(),
            artist: OFFLINE.to_string(),
        }
    }
}

impl fmt::Display for NowPlaying {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.artist, self.title)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Updated,
    Unchanged,
}

/// A metadata push that did not land. Never fatal.
#[derive(Debug, Error)]
pub enum SoftFailure {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("AzuraCast responded with HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("update did not finish within {0:?}")]
    TimedOut(Duration),
}

/**
    Pushes now-playing information to AzuraCast.

    Reads the current entry first and skips the update when it already
    matches. A failed read does not prevent the update attempt. The read
    and the update together are bounded by the publish timeout.
*/
pub struct MetadataPublisher {
    target: MetadataTarget,
    client: AzuraCastClient,
    timeout: Duration,
}

impl MetadataPublisher {
    pub fn new(target: MetadataTarget, timeout: Duration) -> Self {
        Self {
            target,
            client: AzuraCastClient::new(timeout),
            timeout,
        }
    }

    pub async fn publish(&self, now_playing: &NowPlaying) -> Result<PublishOutcome, SoftFailure> {
        tokio::time::timeout(self.timeout, self.read_then_update(now_playing))
            .await
            .map_err(|_| SoftFailure::TimedOut(self.timeout))?
    }

    async fn read_then_update(
        &self,
        now_playing: &NowPlaying,
    ) -> Result<PublishOutcome, SoftFailure> {
        match self.client.current(&self.target).await {
            Ok(current) if current == *now_playing => {
                tracing::debug!(%now_playing, "metadata unchanged, skipping update");
                return Ok(PublishOutcome::Unchanged);
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "could not read current metadata"),
        }

        self.client.update(&self.target, now_playing).await?;
        tracing::info!(%now_playing, station = %self.target.station, "metadata updated");
        Ok(PublishOutcome::Updated)
    }
}
