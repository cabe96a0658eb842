mod error;
mod types;

use std::path::Path;
use std::time::Duration;

use ::config::{Config, Environment, File, FileFormat, Map};
use serde::Deserialize;

pub use error::ConfigError;
pub use types::{
    AudioProfile, ChannelTarget, IcecastTarget, LogFormat, LoggingConfig, MIN_POLL_INTERVAL,
    MetadataTarget, Platform, PollConfig, SupervisorSettings, ToolPaths,
};

const ENV_PREFIX: &str = "LIVECAST";
const DEFAULT_POLL_INTERVAL_SECS: i64 = 30;

/// Fully validated configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub channel: ChannelTarget,
    pub poll: PollConfig,
    pub icecast: IcecastTarget,
    pub audio: AudioProfile,
    pub metadata: Option<MetadataTarget>,
    pub tools: ToolPaths,
    pub supervisor: SupervisorSettings,
    pub logging: LoggingConfig,
    /// Non-fatal problems found while loading, logged once logging is up.
    pub warnings: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    platform: Option<String>,
    channel_url: Option<String>,
    channel_name: Option<String>,
    poll_interval: Option<i64>,
    icecast: Option<RawIcecast>,
    audio: Option<RawAudio>,
    azuracast: Option<RawAzuraCast>,
    tools: Option<RawTools>,
    supervisor: Option<RawSupervisor>,
    logging: Option<RawLogging>,
}

#[derive(Debug, Default, Deserialize)]
struct RawIcecast {
    host: Option<String>,
    port: Option<i64>,
    mount: Option<String>,
    source_user: Option<String>,
    source_password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAudio {
    codec: Option<String>,
    bitrate: Option<String>,
    channels: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAzuraCast {
    api_url: Option<String>,
    bearer_token: Option<String>,
    station: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTools {
    yt_dlp: Option<String>,
    ffmpeg: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSupervisor {
    health_interval: Option<u64>,
    refresh_interval: Option<u64>,
    start_grace: Option<u64>,
    stop_timeout: Option<u64>,
    probe_timeout: Option<u64>,
    publish_timeout: Option<u64>,
    start_backoff_max: Option<u64>,
    refresh_while_streaming: Option<bool>,
    check_manifest: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLogging {
    level: Option<String>,
    format: Option<String>,
}

impl AppConfig {
    /**
        Load configuration from a TOML file, with `LIVECAST__SECTION__KEY`
        environment variables taking precedence over file values.
    */
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with_env(path, None)
    }

    /// Env values stay strings; numeric and boolean keys are parsed on deserialization.
    fn load_with_env(path: &Path, env: Option<Map<String, String>>) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let raw: RawConfig = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .source(env),
            )
            .build()?
            .try_deserialize()?;

        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let mut warnings = Vec::new();

        let mut missing = Vec::new();
        if raw.platform.is_none() {
            missing.push("platform");
        }
        if raw.channel_url.is_none() {
            missing.push("channel_url");
        }
        if raw.channel_name.is_none() {
            missing.push("channel_name");
        }
        if raw.icecast.is_none() {
            missing.push("icecast");
        }
        let (Some(platform), Some(channel_url), Some(channel_name), Some(icecast)) =
            (raw.platform, raw.channel_url, raw.channel_name, raw.icecast)
        else {
            return Err(ConfigError::MissingKeys(missing));
        };

        let platform: Platform = platform.parse()?;

        let channel_url = channel_url.trim().to_string();
        if channel_url.is_empty() {
            return Err(ConfigError::EmptyChannelUrl);
        }

        let poll_secs = raw.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
        if poll_secs <= 0 {
            return Err(ConfigError::NonPositivePollInterval(poll_secs));
        }
        let mut poll_interval = Duration::from_secs(poll_secs as u64);
        if poll_interval < MIN_POLL_INTERVAL {
            warnings.push(format!(
                "poll_interval of {}s is below the {}s minimum, using {}s",
                poll_secs,
                MIN_POLL_INTERVAL.as_secs(),
                MIN_POLL_INTERVAL.as_secs()
            ));
            poll_interval = MIN_POLL_INTERVAL;
        }

        let channel = ChannelTarget {
            platform,
            channel_url,
            channel_name: channel_name.trim().to_string(),
        };

        let icecast = validate_icecast(icecast)?;
        let audio = validate_audio(raw.audio.unwrap_or_default())?;

        let metadata = match raw.azuracast {
            None => None,
            Some(raw) => {
                let metadata = validate_azuracast(raw);
                if metadata.is_none() {
                    warnings.push(
                        "azuracast config incomplete (api_url, bearer_token and station are \
                         required), metadata updates disabled"
                            .to_string(),
                    );
                }
                metadata
            }
        };

        let tools = {
            let raw = raw.tools.unwrap_or_default();
            let defaults = ToolPaths::default();
            ToolPaths {
                yt_dlp: non_empty(raw.yt_dlp).unwrap_or(defaults.yt_dlp),
                ffmpeg: non_empty(raw.ffmpeg).unwrap_or(defaults.ffmpeg),
            }
        };

        let supervisor = validate_supervisor(raw.supervisor.unwrap_or_default(), poll_interval)?;

        let logging = {
            let raw = raw.logging.unwrap_or_default();
            let defaults = LoggingConfig::default();
            LoggingConfig {
                level: non_empty(raw.level).unwrap_or(defaults.level),
                format: match non_empty(raw.format) {
                    Some(format) => format.parse()?,
                    None => defaults.format,
                },
            }
        };

        Ok(Self {
            channel,
            poll: PollConfig {
                interval: poll_interval,
            },
            icecast,
            audio,
            metadata,
            tools,
            supervisor,
            logging,
            warnings,
        })
    }
}

fn validate_icecast(raw: RawIcecast) -> Result<IcecastTarget, ConfigError> {
    let host = raw.host.ok_or(ConfigError::MissingIcecastKey("host"))?;
    let port = raw.port.ok_or(ConfigError::MissingIcecastKey("port"))?;
    let mount = raw.mount.ok_or(ConfigError::MissingIcecastKey("mount"))?;
    let source_user = raw
        .source_user
        .ok_or(ConfigError::MissingIcecastKey("source_user"))?;
    let source_password = raw
        .source_password
        .ok_or(ConfigError::MissingIcecastKey("source_password"))?;

    let port = u16::try_from(port)
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| ConfigError::Invalid {
            key: "icecast.port",
            reason: format!("{port} is not a valid TCP port"),
        })?;

    let mount = mount.trim().trim_start_matches('/').to_string();
    if mount.is_empty() {
        return Err(ConfigError::Invalid {
            key: "icecast.mount",
            reason: "mount cannot be empty".to_string(),
        });
    }

    Ok(IcecastTarget {
        host: host.trim().to_string(),
        port,
        mount,
        source_user,
        source_password,
    })
}

fn validate_audio(raw: RawAudio) -> Result<AudioProfile, ConfigError> {
    let defaults = AudioProfile::default();
    let channels = match raw.channels {
        None => defaults.channels,
        Some(n @ 1..=8) => n as u8,
        Some(n) => {
            return Err(ConfigError::Invalid {
                key: "audio.channels",
                reason: format!("{n} is outside 1..=8"),
            });
        }
    };

    Ok(AudioProfile {
        codec: non_empty(raw.codec).unwrap_or(defaults.codec),
        bitrate: non_empty(raw.bitrate).unwrap_or(defaults.bitrate),
        channels,
    })
}

fn validate_azuracast(raw: RawAzuraCast) -> Option<MetadataTarget> {
    Some(MetadataTarget {
        api_url: non_empty(raw.api_url)?.trim_end_matches('/').to_string(),
        api_key: non_empty(raw.bearer_token)?,
        station: non_empty(raw.station)?,
    })
}

fn validate_supervisor(
    raw: RawSupervisor,
    poll_interval: Duration,
) -> Result<SupervisorSettings, ConfigError> {
    let defaults = SupervisorSettings::with_poll_interval(poll_interval);

    let positive = |key: &'static str, value: Option<u64>, default: Duration| match value {
        None => Ok(default),
        Some(0) => Err(ConfigError::Invalid {
            key,
            reason: "must be positive".to_string(),
        }),
        Some(secs) => Ok(Duration::from_secs(secs)),
    };

    Ok(SupervisorSettings {
        poll_interval,
        health_interval: positive(
            "supervisor.health_interval",
            raw.health_interval,
            defaults.health_interval,
        )?,
        refresh_interval: positive(
            "supervisor.refresh_interval",
            raw.refresh_interval,
            defaults.refresh_interval,
        )?,
        start_grace: raw
            .start_grace
            .map(Duration::from_secs)
            .unwrap_or(defaults.start_grace),
        stop_timeout: raw
            .stop_timeout
            .map(Duration::from_secs)
            .unwrap_or(defaults.stop_timeout),
        probe_timeout: positive(
            "supervisor.probe_timeout",
            raw.probe_timeout,
            defaults.probe_timeout,
        )?,
        publish_timeout: positive(
            "supervisor.publish_timeout",
            raw.publish_timeout,
            defaults.publish_timeout,
        )?,
        start_backoff_max: raw
            .start_backoff_max
            .map(Duration::from_secs)
            .filter(|max| *max > poll_interval),
        refresh_while_streaming: raw
            .refresh_while_streaming
            .unwrap_or(defaults.refresh_while_streaming),
        check_manifest: raw.check_manifest.unwrap_or(defaults.check_manifest),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
