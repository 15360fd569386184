//! Configuration errors.
//!
//! These are the only errors that stop the process before any work starts.

use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {message}")]
    Read { path: String, message: String },

    #[error("Failed to parse YAML config: {0}")]
    Yaml(String),

    /// An environment variable is set but cannot be parsed
    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Base URL must not be empty")]
    EmptyBaseUrl,

    #[error("Invalid base URL {url:?}: {message}")]
    InvalidBaseUrl { url: String, message: String },

    #[error("Sessions per second must be greater than zero")]
    ZeroRate,

    #[error("Replay speed must be positive, got {0}")]
    InvalidSpeed(f64),

    #[error("Fill ratio must be within [0, 1], got {0}")]
    InvalidFillRatio(f64),

    #[error("Fixed puzzle {0} needs a non-zero state length")]
    EmptyPuzzleState(String),

    #[error("Unknown uid strategy {0:?}")]
    UnknownUidStrategy(String),
}

impl ConfigError {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Read { .. } | Self::Yaml(_) => "config_file",
            Self::InvalidEnv { .. } => "config_env",
            _ => "config_invalid",
        }
    }
}
