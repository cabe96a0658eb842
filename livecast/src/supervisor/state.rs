use std::fmt;
use std::time::Duration;

/// Where the supervisor is in a session's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Probing,
    Starting,
    Streaming,
    Stopping,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Probing => "probing",
            SessionState::Starting => "starting",
            SessionState::Streaming => "streaming",
            SessionState::Stopping => "stopping",
        }
    }

    /// States in which a relay handle may exist.
    pub fn owns_relay(&self) -> bool {
        matches!(
            self,
            SessionState::Starting | SessionState::Streaming | SessionState::Stopping
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a streaming session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    RelayDied,
    WentOffline,
    ManifestLost,
    Interrupted,
}

/// Counters reported when the supervisor exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupervisorStats {
    pub probes: u64,
    pub live_probes: u64,
    pub probe_errors: u64,
    pub starts: u64,
    pub start_failures: u64,
    pub relay_deaths: u64,
    pub offline_stops: u64,
    pub manifest_losses: u64,
    pub metadata_failures: u64,
}

impl SupervisorStats {
    pub(super) fn record_end(&mut self, end: StreamEnd) {
        match end {
            StreamEnd::RelayDied => self.relay_deaths += 1,
            StreamEnd::WentOffline => self.offline_stops += 1,
            StreamEnd::ManifestLost => self.manifest_losses += 1,
            StreamEnd::Interrupted => {}
        }
    }
}

/**
    Delay before the next probe.

    Without a maximum this is always the poll interval. With one, each
    consecutive start failure doubles the delay up to that maximum.
*/
#[derive(Debug, Clone)]
pub struct StartBackoff {
    base: Duration,
    max: Option<Duration>,
    failures: u32,
}

impl StartBackoff {
    pub fn new(base: Duration, max: Option<Duration>) -> Self {
        Self {
            base,
            max,
            failures: 0,
        }
    }

    pub fn next_delay(&self) -> Duration {
        let Some(max) = self.max else {
            return self.base;
        };
        if self.failures <= 1 {
            return self.base;
        }
        let factor = 2u32.saturating_pow(self.failures - 1);
        self.base.saturating_mul(factor).min(max)
    }

    pub fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_interval_without_max() {
        let mut backoff = StartBackoff::new(Duration::from_secs(30), None);
        for _ in 0..5 {
            backoff.record_failure();
        }
        assert_eq!(backoff.next_delay(), Duration::from_secs(30));
    }

    #[test]
    fn test_doubles_and_caps() {
        let mut backoff = StartBackoff::new(Duration::from_secs(30), Some(Duration::from_secs(100)));
        assert_eq!(backoff.next_delay(), Duration::from_secs(30));

        let delays = (0..4)
            .map(|_| {
                backoff.record_failure();
                backoff.next_delay().as_secs()
            })
            .collect::<Vec<_>>();
        assert_eq!(delays, vec![30, 60, 100, 100]);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(30));
    }

    #[test]
    fn test_many_failures_do_not_overflow() {
        let mut backoff = StartBackoff::new(Duration::from_secs(30), Some(Duration::from_secs(300)));
        for _ in 0..100 {
            backoff.record_failure();
        }
        assert_eq!(backoff.next_delay(), Duration::from_secs(300));
    }

    #[test]
    fn test_relay_ownership_states() {
        assert!(!SessionState::Idle.owns_relay());
        assert!(!SessionState::Probing.owns_relay());
        assert!(SessionState::Starting.owns_relay());
        assert!(SessionState::Stopping.owns_relay());
    }
}
