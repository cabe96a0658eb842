mod ytdlp;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::{ChannelTarget, ToolPaths};
use crate::process::{ExitInfo, ProcessError, ProcessRunner};

const MANIFEST_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// A broadcast that can be relayed right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveInfo {
    pub manifest_url: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Live(LiveInfo),
    NotLive,
}

/**
    A probe that could not tell whether the channel is live.

    Callers treat this as "not live this cycle" but log it separately from a
    genuine offline answer.
*/
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("resolver failed ({exit}): {message}")]
    ResolverFailed { exit: ExitInfo, message: String },

    #[error("could not parse resolver output: {0}")]
    MalformedOutput(#[from] serde_json::Error),

    #[error("resolver reported a live stream without a usable URL")]
    NoStreamUrl,
}

/**
    Asks the external resolver whether a channel is broadcasting.

    Holds no state between calls; retrying is the caller's poll loop.
*/
pub struct Prober {
    runner: Arc<dyn ProcessRunner>,
    resolver: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl Prober {
    pub fn new(runner: Arc<dyn ProcessRunner>, tools: &ToolPaths, timeout: Duration) -> Self {
        Self {
            runner,
            resolver: tools.yt_dlp.clone(),
            timeout,
            http: reqwest::Client::new(),
        }
    }

    pub async fn probe(&self, target: &ChannelTarget) -> Result<ProbeOutcome, ProbeError> {
        let url = ytdlp::resolver_url(target);
        let command = ytdlp::command(&self.resolver, &url);

        let output = self.runner.output(&command, self.timeout).await?;
        let outcome = ytdlp::classify(target.platform, &output)?;

        tracing::debug!(
            platform = %target.platform,
            url = %url,
            live = matches!(outcome, ProbeOutcome::Live(_)),
            "probe finished"
        );
        Ok(outcome)
    }

    /// Whether the manifest still answers with a 2xx status.
    pub async fn manifest_reachable(&self, url: &str) -> bool {
        match self
            .http
            .get(url)
            .timeout(MANIFEST_CHECK_TIMEOUT)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::debug!(status = %response.status(), "manifest check rejected");
                false
            }
            Err(e) => {
                tracing::debug!(error = %e, "manifest check failed");
                false
            }
        }
    }
}
