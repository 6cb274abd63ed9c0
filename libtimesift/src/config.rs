//! Configuration management for Timesift

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::retry::{Backoff, RetryPolicy};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub credentials: CredentialsConfig,
    pub scrape: ScrapeConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// JSON cookie file exported from a logged-in browser session
    pub path: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            path: "~/.config/timesift/cookies.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Retries after the first failed attempt of a single request
    pub retry_count: u32,
    pub retry_delay_secs: u64,
    pub max_retry_delay_secs: u64,
    pub backoff: BackoffKind,
    /// Pause between users in a multi-user scrape
    pub user_delay_secs: f64,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            retry_count: 3,
            retry_delay_secs: 5,
            max_retry_delay_secs: 60,
            backoff: BackoffKind::Exponential,
            user_delay_secs: 2.0,
            timeout_secs: 30,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/124.0 Safari/537.36"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Constant,
    Exponential,
}

impl ScrapeConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        let delay = Duration::from_secs(self.retry_delay_secs);
        let backoff = match self.backoff {
            BackoffKind::Constant => Backoff::Constant,
            BackoffKind::Exponential => Backoff::Exponential {
                max: Duration::from_secs(self.max_retry_delay_secs.max(self.retry_delay_secs)),
            },
        };
        RetryPolicy::new(self.retry_count, delay, backoff)
    }

    /// Saturates instead of panicking on values `validate` would reject.
    pub fn user_delay(&self) -> Duration {
        if self.user_delay_secs > 0.0 {
            Duration::try_from_secs_f64(self.user_delay_secs).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Endpoint details of the web client's GraphQL API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Public bearer token embedded in the web client
    pub bearer_token: String,
    pub user_by_screen_name_query_id: String,
    pub user_tweets_query_id: String,
    pub page_size: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://x.com".to_string(),
            bearer_token: "AAAAAAAAAAAAAAAAAAAAANRILgAAAAAAnNwIzUejRCOuH5E6I8xnZz4puTs%3D\
                           1Zv7ttfk8LF81IUq16cHjhLTvJu4FA33AGWWjCpTnA"
                .to_string(),
            user_by_screen_name_query_id: "xmU6X_CKVnQ5lSrCbAmJsg".to_string(),
            user_tweets_query_id: "V7H0Ap3_Hh2FyS75OCDO3Q".to_string(),
            page_size: 20,
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default() -> Result<Self> {
        let config_path = resolve_config_path()?;
        if !config_path.exists() {
            tracing::debug!("No config at {}, using defaults", config_path.display());
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.credentials.path.trim().is_empty() {
            return Err(ConfigError::MissingField("credentials.path".to_string()).into());
        }
        if self.scrape.timeout_secs == 0 {
            return Err(invalid("scrape.timeout_secs", "must be greater than 0"));
        }
        if Duration::try_from_secs_f64(self.scrape.user_delay_secs).is_err() {
            return Err(invalid(
                "scrape.user_delay_secs",
                "must be a non-negative number of seconds that fits in a duration",
            ));
        }
        if self.api.page_size == 0 {
            return Err(invalid("api.page_size", "must be greater than 0"));
        }
        if url_scheme_missing(&self.api.base_url) {
            return Err(invalid("api.base_url", "must start with http:// or https://"));
        }
        Ok(())
    }

    /// Credential file path with `~` expanded
    pub fn credentials_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.credentials.path).to_string())
    }
}

fn invalid(field: &str, reason: &str) -> crate::error::TimesiftError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

fn url_scheme_missing(url: &str) -> bool {
    !(url.starts_with("http://") || url.starts_with("https://"))
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("TIMESIFT_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("timesift").join("config.toml"))
}
