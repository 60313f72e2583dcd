use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::errors::FetcherError;

/// Settings keys of the built-in data sources.
pub const TIINGO: &str = "tiingo";
pub const ALPHA_VANTAGE: &str = "alphavantage";
pub const FRANKFURTER: &str = "frankfurter";
pub const OPEN_EXCHANGE_RATES: &str = "openexchangerates";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Sliding-window quota: at most `max_requests` within `window_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub max_requests: usize,
    pub window_secs: u64,
}

impl RateLimitSettings {
    pub fn new(max_requests: usize, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Per-source configuration. Every field is optional; unset fields fall back
/// to the source's own defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// API key, token or app id, depending on the provider.
    pub api_key: Option<String>,
    /// Overrides the provider's public endpoint (self-hosted mirrors, tests).
    pub base_url: Option<String>,
    pub rate_limit: Option<RateLimitSettings>,
    pub timeout_secs: Option<u64>,
}

impl SourceSettings {
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    pub fn rate_limit_or(&self, default: RateLimitSettings) -> RateLimitSettings {
        self.rate_limit.unwrap_or(default)
    }

    pub fn base_url_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .unwrap_or(default)
    }
}

/// Configuration of the whole fetcher, usually loaded from JSON.
///
/// ```json
/// {
///   "sources": {
///     "tiingo": { "api_key": "...", "rate_limit": { "max_requests": 50, "window_secs": 3600 } },
///     "frankfurter": {}
///   },
///   "default_retry_secs": [5, 30]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherSettings {
    /// Keys: source settings key (e.g. "tiingo", "alphavantage").
    pub sources: HashMap<String, SourceSettings>,
    /// Back-off between request handler rounds, in seconds.
    pub default_retry_secs: Vec<u64>,
}

impl FetcherSettings {
    pub fn from_json_str(json: &str) -> Result<Self, FetcherError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, FetcherError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn source(&self, key: &str) -> Option<&SourceSettings> {
        self.sources.get(key)
    }

    /// The configured API key of a source, ignoring blank values.
    pub fn api_key(&self, key: &str) -> Option<&str> {
        self.source(key)
            .and_then(|s| s.api_key.as_deref())
            .filter(|k| !k.trim().is_empty())
    }

    pub fn validate(&self) -> Result<(), FetcherError> {
        for (name, source) in &self.sources {
            if let Some(limit) = source.rate_limit {
                if limit.window_secs == 0 {
                    return Err(FetcherError::Configuration(format!(
                        "{name}: rate limit window must be longer than zero seconds"
                    )));
                }
            }
            if source.timeout_secs == Some(0) {
                return Err(FetcherError::Configuration(format!(
                    "{name}: timeout must be longer than zero seconds"
                )));
            }
        }
        Ok(())
    }
}
