mod state;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use crate::config::{AppConfig, AudioProfile, ChannelTarget, IcecastTarget, SupervisorSettings};
use crate::metadata::{MetadataPublisher, NowPlaying};
use crate::probe::{LiveInfo, ProbeOutcome, Prober};
use crate::process::ProcessRunner;
use crate::relay::{RelayHandle, RelaySession};
use crate::util::{shutdown_requested, sleep_or_shutdown, unless_shutdown};

pub use state::{SessionState, StartBackoff, StreamEnd, SupervisorStats};

/**
    Drives the whole live-relay lifecycle from a single loop:

    Idle -> Probing -> Starting -> Streaming -> Stopping -> Idle

    The supervisor owns the only relay handle. A new session is never
    started before the previous one has been fully torn down.
*/
pub struct Supervisor {
    channel: ChannelTarget,
    icecast: IcecastTarget,
    audio: AudioProfile,
    settings: SupervisorSettings,
    prober: Prober,
    relay: RelaySession,
    publisher: Option<MetadataPublisher>,
    state: SessionState,
    stats: SupervisorStats,
    #[cfg(test)]
    transitions: Vec<SessionState>,
}

impl Supervisor {
    pub fn new(config: &AppConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        let settings = config.supervisor.clone();

        let prober = Prober::new(Arc::clone(&runner), &config.tools, settings.probe_timeout);
        let relay = RelaySession::new(
            runner,
            &config.tools,
            settings.start_grace,
            settings.stop_timeout,
        );
        let publisher = config
            .metadata
            .clone()
            .map(|target| MetadataPublisher::new(target, settings.publish_timeout));

        Self {
            channel: config.channel.clone(),
            icecast: config.icecast.clone(),
            audio: config.audio.clone(),
            settings,
            prober,
            relay,
            publisher,
            state: SessionState::Idle,
            stats: SupervisorStats::default(),
            #[cfg(test)]
            transitions: vec![SessionState::Idle],
        }
    }

    /**
        Run until the shutdown flag is set.

        An interrupt while idle or probing exits right away. An interrupt
        while starting or streaming tears the relay down first.
    */
    pub async fn run(&mut self, mut shutdown_rx: watch::Receiver<bool>) -> SupervisorStats {
        let mut backoff =
            StartBackoff::new(self.settings.poll_interval, self.settings.start_backoff_max);
        let mut first_probe = true;

        tracing::info!(
            platform = %self.channel.platform,
            channel = %self.channel.channel_name,
            poll_interval = ?self.settings.poll_interval,
            "watching channel"
        );

        loop {
            self.transition(SessionState::Idle);

            if !first_probe {
                let delay = backoff.next_delay();
                if !sleep_or_shutdown(delay, &mut shutdown_rx).await {
                    break;
                }
            }
            first_probe = false;
            if *shutdown_rx.borrow() {
                break;
            }

            self.transition(SessionState::Probing);
            let Some(result) = unless_shutdown(self.prober.probe(&self.channel), &mut shutdown_rx).await
            else {
                break;
            };
            self.stats.probes += 1;

            let info = match result {
                Ok(ProbeOutcome::Live(info)) => info,
                Ok(ProbeOutcome::NotLive) => {
                    tracing::info!(
                        next_check = ?self.settings.poll_interval,
                        "channel not live"
                    );
                    backoff.reset();
                    continue;
                }
                Err(e) => {
                    self.stats.probe_errors += 1;
                    tracing::warn!(error = %e, "live check failed, treating channel as offline");
                    continue;
                }
            };
            self.stats.live_probes += 1;
            tracing::info!(
                title = info.title.as_deref().unwrap_or(""),
                manifest = %info.manifest_url,
                "channel is live"
            );

            self.transition(SessionState::Starting);
            let mut handle = match self
                .relay
                .start(&info.manifest_url, &self.icecast, &self.audio)
                .await
            {
                Ok(handle) => handle,
                Err(e) => {
                    self.stats.start_failures += 1;
                    backoff.record_failure();
                    tracing::warn!(
                        error = %e,
                        retry_in = ?backoff.next_delay(),
                        "relay failed to start"
                    );
                    continue;
                }
            };
            self.stats.starts += 1;
            backoff.reset();

            let end = if *shutdown_rx.borrow() {
                StreamEnd::Interrupted
            } else {
                self.transition(SessionState::Streaming);
                self.stream(&mut handle, &info, &mut shutdown_rx).await
            };

            self.transition(SessionState::Stopping);
            tracing::info!(reason = ?end, "ending session");
            self.relay.stop(&mut handle).await;
            debug_assert!(handle.is_released());
            self.publish(&NowPlaying::offline()).await;
            self.stats.record_end(end);

            if end == StreamEnd::Interrupted {
                break;
            }
        }

        self.transition(SessionState::Idle);
        tracing::info!(stats = ?self.stats, "supervisor stopped");
        self.stats
    }

    async fn stream(
        &mut self,
        handle: &mut RelayHandle,
        info: &LiveInfo,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> StreamEnd {
        let now_playing = NowPlaying::for_stream(&self.channel.channel_name, info.title.as_deref());
        if unless_shutdown(self.publish(&now_playing), shutdown_rx)
            .await
            .is_none()
        {
            return StreamEnd::Interrupted;
        }

        let now = Instant::now();
        let mut health = interval_at(
            now + self.settings.health_interval,
            self.settings.health_interval,
        );
        health.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut refresh = interval_at(
            now + self.settings.refresh_interval,
            self.settings.refresh_interval,
        );
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_requested(shutdown_rx) => return StreamEnd::Interrupted,
                _ = health.tick() => {
                    if !self.relay.is_alive(handle) {
                        return StreamEnd::RelayDied;
                    }
                }
                _ = refresh.tick(), if self.settings.refresh_while_streaming => {
                    if let Some(end) = self.refresh(handle, shutdown_rx).await {
                        return end;
                    }
                }
            }
        }
    }

    /// Re-probe while streaming. `Some` ends the session.
    async fn refresh(
        &mut self,
        handle: &RelayHandle,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Option<StreamEnd> {
        let result = unless_shutdown(self.prober.probe(&self.channel), shutdown_rx).await;
        let Some(result) = result else {
            return Some(StreamEnd::Interrupted);
        };
        self.stats.probes += 1;

        let info = match result {
            Ok(ProbeOutcome::Live(info)) => info,
            Ok(ProbeOutcome::NotLive) => {
                tracing::info!("broadcast ended");
                return Some(StreamEnd::WentOffline);
            }
            Err(e) => {
                self.stats.probe_errors += 1;
                tracing::warn!(error = %e, "refresh check failed, keeping relay running");
                return None;
            }
        };
        self.stats.live_probes += 1;

        let now_playing = NowPlaying::for_stream(&self.channel.channel_name, info.title.as_deref());
        if unless_shutdown(self.publish(&now_playing), shutdown_rx)
            .await
            .is_none()
        {
            return Some(StreamEnd::Interrupted);
        }

        if self.settings.check_manifest {
            let reachable =
                unless_shutdown(self.prober.manifest_reachable(handle.manifest_url()), shutdown_rx);
            match reachable.await {
                None => return Some(StreamEnd::Interrupted),
                Some(false) => {
                    tracing::warn!(manifest = %handle.manifest_url(), "manifest no longer reachable");
                    return Some(StreamEnd::ManifestLost);
                }
                Some(true) => {}
            }
        }

        None
    }

    async fn publish(&mut self, now_playing: &NowPlaying) {
        let Some(publisher) = &self.publisher else {
            return;
        };
        if let Err(e) = publisher.publish(now_playing).await {
            self.stats.metadata_failures += 1;
            tracing::warn!(error = %e, %now_playing, "metadata update failed");
        }
    }

    fn transition(&mut self, next: SessionState) {
        if self.state == next {
            return;
        }
        let previous = std::mem::replace(&mut self.state, next);
        if previous.owns_relay() || next.owns_relay() {
            tracing::info!(from = %previous, to = %next, "session state");
        } else {
            tracing::debug!(from = %previous, to = %next, "session state");
        }
        #[cfg(test)]
        self.transitions.push(next);
    }
}
