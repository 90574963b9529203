use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cli::RunArgs;
use crate::client::DEFAULT_REQUEST_TIMEOUT;
use crate::error::{AppError, Result};
use crate::retry::{Backoff, BackoffKind, RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
use crate::types::DEFAULT_TARGET_SUFFIX;

pub const DEFAULT_SOURCE_URL: &str = "https://jsonplaceholder.typicode.com/users";

/// Optional settings read from `config.toml`. Flags and env vars win.
#[derive(Deserialize, Serialize, Default, Debug, PartialEq)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff: Option<BackoffKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_suffix: Option<String>,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub source_url: Url,
    pub target_url: Url,
    pub policy: RetryPolicy,
    pub request_timeout: Duration,
    pub suffix: String,
    pub deadline: Option<Duration>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Config::default());
        }

        let contents =
            std::fs::read_to_string(config_path).map_err(|e| AppError::ConfigRead {
                path: config_path.to_path_buf(),
                source: e,
            })?;

        toml::from_str(&contents).map_err(|e| AppError::ConfigParse {
            path: config_path.to_path_buf(),
            source: e,
        })
    }

    pub fn config_path() -> Result<PathBuf> {
        ProjectDirs::from("", "", "user-dispatcher")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .ok_or(AppError::NoConfigDir)
    }

    /// Merge command-line arguments (which already carry `API_A`/`API_B`)
    /// over the file values and the built-in defaults.
    pub fn resolve(&self, args: &RunArgs) -> Result<Settings> {
        let source_url = args
            .source_url
            .as_deref()
            .or(self.source_url.as_deref())
            .unwrap_or(DEFAULT_SOURCE_URL);

        let target_url = args
            .target_url
            .as_deref()
            .or(self.target_url.as_deref())
            .ok_or(AppError::MissingTargetUrl)?;

        let max_attempts = args
            .max_attempts
            .or(self.max_attempts)
            .unwrap_or(DEFAULT_MAX_ATTEMPTS);

        let delay = args
            .retry_delay
            .or(self.retry_delay_secs)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_RETRY_DELAY);

        let backoff = args.backoff.or(self.backoff).unwrap_or_default();

        let request_timeout = args
            .timeout
            .or(self.request_timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let suffix = args
            .suffix
            .clone()
            .or_else(|| self.target_suffix.clone())
            .unwrap_or_else(|| DEFAULT_TARGET_SUFFIX.to_string());

        Ok(Settings {
            source_url: parse_url(source_url)?,
            target_url: parse_url(target_url)?,
            policy: RetryPolicy::new(max_attempts, Backoff::from_kind(backoff, delay))?,
            request_timeout,
            suffix,
            deadline: args.deadline.map(Duration::from_secs),
        })
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| AppError::InvalidUrl {
        url: raw.to_string(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_with_target() -> RunArgs {
        RunArgs {
            target_url: Some("http://localhost:8080/hook".to_string()),
            ..RunArgs::default()
        }
    }

    #[test]
    fn test_resolve_defaults() {
        let settings = Config::default().resolve(&args_with_target()).unwrap();

        assert_eq!(settings.source_url.as_str(), DEFAULT_SOURCE_URL);
        assert_eq!(settings.target_url.as_str(), "http://localhost:8080/hook");
        assert_eq!(settings.policy, RetryPolicy::default());
        assert_eq!(settings.request_timeout, Duration::from_secs(10));
        assert_eq!(settings.suffix, ".biz");
        assert_eq!(settings.deadline, None);
    }

    #[test]
    fn test_resolve_requires_target() {
        let err = Config::default().resolve(&RunArgs::default()).unwrap_err();
        assert!(matches!(err, AppError::MissingTargetUrl));
    }

    #[test]
    fn test_args_override_file() {
        let config = Config {
            target_url: Some("http://file/hook".to_string()),
            max_attempts: Some(7),
            retry_delay_secs: Some(9),
            target_suffix: Some(".org".to_string()),
            ..Config::default()
        };
        let args = RunArgs {
            max_attempts: Some(2),
            backoff: Some(BackoffKind::Linear),
            ..args_with_target()
        };

        let settings = config.resolve(&args).unwrap();

        assert_eq!(settings.target_url.as_str(), "http://localhost:8080/hook");
        assert_eq!(settings.policy.max_attempts(), 2);
        assert_eq!(
            settings.policy.backoff().delay_for(1),
            Duration::from_secs(9)
        );
        assert_eq!(
            settings.policy.backoff().delay_for(2),
            Duration::from_secs(18)
        );
        assert_eq!(settings.suffix, ".org");
    }

    #[test]
    fn test_zero_attempts_in_file_rejected() {
        let config = Config {
            max_attempts: Some(0),
            ..Config::default()
        };
        let err = config.resolve(&args_with_target()).unwrap_err();
        assert!(matches!(err, AppError::InvalidAttempts));
    }

    #[test]
    fn test_invalid_url() {
        let args = RunArgs {
            target_url: Some("not a url".to_string()),
            ..RunArgs::default()
        };
        let err = Config::default().resolve(&args).unwrap_err();
        assert!(matches!(err, AppError::InvalidUrl { .. }));
    }

    #[test]
    fn test_parse_toml() {
        let config: Config = toml::from_str(
            r#"
            target_url = "https://webhook.site/abc"
            max_attempts = 4
            backoff = "exponential"
            "#,
        )
        .unwrap();

        assert_eq!(config.target_url.as_deref(), Some("https://webhook.site/abc"));
        assert_eq!(config.max_attempts, Some(4));
        assert_eq!(config.backoff, Some(BackoffKind::Exponential));
        assert_eq!(config.source_url, None);
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let path = std::env::temp_dir().join("user-dispatcher-does-not-exist/config.toml");
        assert_eq!(Config::load_from(&path).unwrap(), Config::default());
    }
}
