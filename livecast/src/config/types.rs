use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::ConfigError;

/// Minimum time between live checks; anything faster risks platform rate limits.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Streaming platform hosting the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Twitch,
    YouTube,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Twitch => "twitch",
            Platform::YouTube => "youtube",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "twitch" => Ok(Platform::Twitch),
            "youtube" => Ok(Platform::YouTube),
            _ => Err(ConfigError::InvalidPlatform(s.to_string())),
        }
    }
}

/// The channel being watched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTarget {
    pub platform: Platform,
    pub channel_url: String,
    pub channel_name: String,
}

/// Icecast mount receiving the relayed audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcecastTarget {
    pub host: String,
    pub port: u16,
    /// Stored without the leading slash.
    pub mount: String,
    pub source_user: String,
    pub source_password: String,
}

impl IcecastTarget {
    pub fn mount_path(&self) -> String {
        format!("/{}", self.mount)
    }

    /// Destination URL in the form ffmpeg's icecast protocol expects.
    pub fn source_url(&self) -> String {
        format!(
            "icecast://{}:{}@{}:{}{}",
            self.source_user,
            self.source_password,
            self.host,
            self.port,
            self.mount_path()
        )
    }
}

/// Encoder settings for the relayed stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioProfile {
    pub codec: String,
    pub bitrate: String,
    pub channels: u8,
}

impl AudioProfile {
    /// Container format matching the codec.
    pub fn container(&self) -> &'static str {
        match self.codec.as_str() {
            "libmp3lame" | "mp3" => "mp3",
            "aac" | "libfdk_aac" => "adts",
            _ => "ogg",
        }
    }

    /// MIME type announced to Icecast.
    pub fn content_type(&self) -> &'static str {
        match self.container() {
            "mp3" => "audio/mpeg",
            "adts" => "audio/aac",
            _ => "application/ogg",
        }
    }
}

impl Default for AudioProfile {
    fn default() -> Self {
        Self {
            codec: "libmp3lame".to_string(),
            bitrate: "128k".to_string(),
            channels: 1,
        }
    }
}

/// AzuraCast station whose now-playing entry gets updated.
#[derive(Clone, PartialEq, Eq)]
pub struct MetadataTarget {
    pub api_url: String,
    pub api_key: String,
    pub station: String,
}

impl fmt::Debug for MetadataTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataTarget")
            .field("api_url", &self.api_url)
            .field("api_key", &"***")
            .field("station", &self.station)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
}

/// External programs the supervisor drives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub yt_dlp: String,
    pub ffmpeg: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            yt_dlp: "yt-dlp".to_string(),
            ffmpeg: "ffmpeg".to_string(),
        }
    }
}

/// Timings and switches for the session supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSettings {
    pub poll_interval: Duration,
    pub health_interval: Duration,
    pub refresh_interval: Duration,
    pub start_grace: Duration,
    pub stop_timeout: Duration,
    pub probe_timeout: Duration,
    pub publish_timeout: Duration,
    /// `None` keeps retries on the fixed poll interval.
    pub start_backoff_max: Option<Duration>,
    pub refresh_while_streaming: bool,
    pub check_manifest: bool,
}

impl SupervisorSettings {
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            health_interval: Duration::from_secs(5),
            refresh_interval: poll_interval,
            start_grace: Duration::from_secs(2),
            stop_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(10),
            publish_timeout: Duration::from_secs(10),
            start_backoff_max: None,
            refresh_while_streaming: true,
            check_manifest: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" | "pretty" => Ok(LogFormat::Full),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::Invalid {
                key: "logging.format",
                reason: format!("unknown format '{s}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Full,
        }
    }
}
