use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure to obtain the record batch. Always fatal for the run.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("failed to fetch users: {0}")]
    Request(#[source] reqwest::Error),

    #[error("failed to fetch users (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode users response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("fetch cancelled")]
    Cancelled,
}

/// Failure of a single delivery attempt.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("request error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed with status {status}")]
    Status { status: u16 },

    #[error("delivery cancelled")]
    Cancelled,
}

/// Terminal outcome of a record whose delivery never succeeded.
#[derive(Error, Debug)]
pub enum RetryError {
    #[error("retry exhausted after {attempts} attempts over {:.2}s: {source}", .elapsed.as_secs_f64())]
    Exhausted {
        attempts: u32,
        #[source]
        source: DeliveryError,
        elapsed: Duration,
    },

    #[error("retry cancelled after {attempts} attempts{}", .last_error.as_ref().map(|e| format!(": {e}")).unwrap_or_default())]
    Cancelled {
        attempts: u32,
        last_error: Option<DeliveryError>,
    },
}

impl RetryError {
    /// Number of sink calls made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } | RetryError::Cancelled { attempts, .. } => {
                *attempts
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read config file at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to write config file: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error(
        "No destination URL found. Set API_B env var, pass --target-url, or add target_url to the config file"
    )]
    MissingTargetUrl,

    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("max_attempts must be at least 1")]
    InvalidAttempts,

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
