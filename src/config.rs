//! User configuration, read from a JSON file

use crate::error::Result;
use crate::models::Locale;
use crate::requests::limiter::RateLimiter;
use crate::requests::RetryPolicy;
use crate::MangoClient;

use serde::{Deserialize, Serialize};

use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "config.json";

fn default_cache_path() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".mango-dl"))
        .unwrap_or_else(|| PathBuf::from(".mango-dl"))
}

/// Every field has a default, so a config file only needs the keys it changes
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Where manga snapshots and logs are stored
    pub cache_path: PathBuf,
    /// Where chapters are downloaded to
    pub download_path: PathBuf,
    /// Language of the chapters to list and download
    pub lang: Locale,
    /// Upper bound for requests in flight, and for concurrent page downloads of one chapter
    pub max_concurrent: usize,
    pub min_interval_ms: u64,
    pub retries: u32,
    pub backoff_ms: u64,
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Default directive for the log filter, overridden by `RUST_LOG`
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_path: default_cache_path(),
            download_path: PathBuf::from("."),
            lang: Locale::En,
            max_concurrent: RateLimiter::DEFAULT_MAX_IN_FLIGHT,
            min_interval_ms: RateLimiter::DEFAULT_MIN_INTERVAL.as_millis() as u64,
            retries: RetryPolicy::default().retries,
            backoff_ms: RetryPolicy::default().backoff.as_millis() as u64,
            timeout_secs: MangoClient::DEFAULT_TIMEOUT.as_secs(),
            user_agent: MangoClient::USER_AGENT.to_owned(),
            log_level: "info".to_owned(),
        }
    }
}

impl Config {
    /// Location of the config file inside the default cache directory
    pub fn default_path() -> PathBuf {
        default_cache_path().join(CONFIG_FILENAME)
    }

    /// Reads the config at `path`. A missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("no config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(
            self.max_concurrent,
            Duration::from_millis(self.min_interval_ms),
        )
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.retries,
            backoff: Duration::from_millis(self.backoff_ms),
        }
    }
}
