use std::path::PathBuf;

use thiserror::Error;

/**
    Errors from loading and validating the configuration file.

    Any of these is fatal: the supervisor never starts with an invalid target.
*/
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read config: {0}")]
    Parse(#[from] ::config::ConfigError),

    #[error("missing required top-level config keys: {}", .0.join(", "))]
    MissingKeys(Vec<&'static str>),

    #[error("icecast configuration missing required key: {0}")]
    MissingIcecastKey(&'static str),

    #[error("invalid platform '{0}', expected 'twitch' or 'youtube'")]
    InvalidPlatform(String),

    #[error("poll_interval must be positive, got {0}")]
    NonPositivePollInterval(i64),

    #[error("channel_url cannot be empty")]
    EmptyChannelUrl,

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
