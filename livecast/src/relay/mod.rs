mod command;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

use crate::config::{AudioProfile, IcecastTarget, ToolPaths};
use crate::process::{ExitInfo, ManagedChild, PipedChildren, ProcessError, ProcessRunner};

const GRACE_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// One of the two processes making up a relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    Puller,
    Encoder,
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Leg::Puller => f.write_str("puller"),
            Leg::Encoder => f.write_str("encoder"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StartFailure {
    #[error("failed to spawn relay: {0}")]
    Spawn(#[from] ProcessError),

    #[error("{leg} exited during startup ({exit})")]
    EarlyExit { leg: Leg, exit: ExitInfo },
}

/**
    Ownership of a running relay: the puller, the encoder, and the pipe
    between them.

    Once stopped the handle is empty and further stops do nothing.
*/
pub struct RelayHandle {
    children: Option<PipedChildren>,
    manifest_url: String,
    started_at: Instant,
    exit_reported: bool,
}

impl RelayHandle {
    pub fn manifest_url(&self) -> &str {
        &self.manifest_url
    }

    pub fn is_released(&self) -> bool {
        self.children.is_none()
    }

    /// Puller and encoder pids, empty once released.
    pub fn pids(&self) -> Vec<u32> {
        self.children
            .iter()
            .flat_map(|c| [c.upstream.id(), c.downstream.id()])
            .flatten()
            .collect()
    }
}

impl fmt::Debug for RelayHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayHandle")
            .field("manifest_url", &self.manifest_url)
            .field("pids", &self.pids())
            .finish()
    }
}

/**
    Starts, observes and tears down relay processes.
*/
pub struct RelaySession {
    runner: Arc<dyn ProcessRunner>,
    ffmpeg: String,
    start_grace: Duration,
    stop_timeout: Duration,
}

impl RelaySession {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        tools: &ToolPaths,
        start_grace: Duration,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            runner,
            ffmpeg: tools.ffmpeg.clone(),
            start_grace,
            stop_timeout,
        }
    }

    /**
        Spawn the puller piped into the encoder and make sure both survive
        the grace window.

        On failure nothing is left running.
    */
    pub async fn start(
        &self,
        manifest_url: &str,
        icecast: &IcecastTarget,
        audio: &AudioProfile,
    ) -> Result<RelayHandle, StartFailure> {
        let puller = command::puller(&self.ffmpeg, manifest_url);
        let encoder = command::encoder(&self.ffmpeg, icecast, audio);

        let children = self.runner.spawn_piped(&puller, &encoder)?;
        let mut handle = RelayHandle {
            children: Some(children),
            manifest_url: manifest_url.to_string(),
            started_at: Instant::now(),
            exit_reported: false,
        };

        let deadline = Instant::now() + self.start_grace;
        loop {
            if let Some((leg, _, exit)) = handle.children.as_mut().and_then(first_exit) {
                self.stop(&mut handle).await;
                return Err(StartFailure::EarlyExit { leg, exit });
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep(GRACE_POLL_INTERVAL.min(deadline - now)).await;
        }

        tracing::info!(
            pids = ?handle.pids(),
            mount = %icecast.mount_path(),
            codec = %audio.codec,
            bitrate = %audio.bitrate,
            "relay started"
        );
        Ok(handle)
    }

    /// Both legs still running. The first observed exit is logged once.
    pub fn is_alive(&self, handle: &mut RelayHandle) -> bool {
        let Some(children) = handle.children.as_mut() else {
            return false;
        };

        match first_exit(children) {
            None => true,
            Some((leg, pid, exit)) => {
                if !handle.exit_reported {
                    handle.exit_reported = true;
                    let uptime = handle.started_at.elapsed();
                    if exit.success() {
                        tracing::info!(%leg, pid, ?uptime, "relay process finished");
                    } else {
                        tracing::warn!(%leg, pid, %exit, ?uptime, "relay process exited");
                    }
                }
                false
            }
        }
    }

    /**
        Terminate both legs, wait up to the stop timeout, then kill whatever
        is left. Calling this on an already stopped handle does nothing.
    */
    pub async fn stop(&self, handle: &mut RelayHandle) {
        let Some(mut children) = handle.children.take() else {
            return;
        };

        tokio::join!(
            shut_down(Leg::Puller, children.upstream.as_mut(), self.stop_timeout),
            shut_down(Leg::Encoder, children.downstream.as_mut(), self.stop_timeout),
        );

        tracing::info!(uptime = ?handle.started_at.elapsed(), "relay stopped");
    }
}

fn first_exit(children: &mut PipedChildren) -> Option<(Leg, Option<u32>, ExitInfo)> {
    [
        (Leg::Puller, children.upstream.as_mut()),
        (Leg::Encoder, children.downstream.as_mut()),
    ]
    .into_iter()
    .find_map(|(leg, child)| {
        let pid = child.id();
        exit_status(leg, child).map(|exit| (leg, pid, exit))
    })
}

fn exit_status(leg: Leg, child: &mut dyn ManagedChild) -> Option<ExitInfo> {
    match child.try_wait() {
        Ok(status) => status,
        Err(e) => {
            tracing::warn!(%leg, error = %e, "failed to query relay process, treating it as dead");
            Some(ExitInfo { code: None })
        }
    }
}

async fn shut_down(leg: Leg, child: &mut dyn ManagedChild, timeout: Duration) {
    let pid = child.id();
    if let Ok(Some(exit)) = child.try_wait() {
        tracing::debug!(%leg, pid, %exit, "relay process already exited");
        return;
    }

    if let Err(e) = child.terminate() {
        tracing::warn!(%leg, pid, error = %e, "failed to signal relay process");
    }

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(exit)) => {
            tracing::debug!(%leg, pid, %exit, "relay process exited");
            return;
        }
        Ok(Err(e)) => tracing::warn!(%leg, pid, error = %e, "failed to wait for relay process"),
        Err(_) => tracing::warn!(%leg, pid, ?timeout, "relay process ignored termination, killing"),
    }

    if let Err(e) = child.kill().await {
        tracing::error!(%leg, pid, error = %e, "failed to kill relay process");
    }
}
