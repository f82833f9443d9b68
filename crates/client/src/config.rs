use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://habitica.com/api/v3";

/// Client-side ceiling; the upstream throttles at 30/min.
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 29;

/// Per-request transport timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_CLIENT_NAME: &str = "habitkit";

/// Invalid or unreadable client settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Connection settings for the upstream API.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub user_id: String,
    pub api_token: String,
    /// Application name; sent as `x-client: {user_id}-{client_name}`.
    #[serde(default = "default_client_name")]
    pub client_name: String,
    #[serde(default = "default_rpm")]
    pub requests_per_minute: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_client_name() -> String {
    DEFAULT_CLIENT_NAME.to_string()
}

fn default_rpm() -> u32 {
    DEFAULT_REQUESTS_PER_MINUTE
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl ClientConfig {
    pub fn new(user_id: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            base_url: default_base_url(),
            user_id: user_id.into(),
            api_token: api_token.into(),
            client_name: default_client_name(),
            requests_per_minute: default_rpm(),
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_requests_per_minute(mut self, rpm: u32) -> Self {
        self.requests_per_minute = rpm;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Reads `HABITICA_USER_ID`, `HABITICA_API_TOKEN` and optionally
    /// `HABITICA_BASE_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let user_id =
            std::env::var("HABITICA_USER_ID").map_err(|_| ConfigError::Missing("HABITICA_USER_ID"))?;
        let api_token = std::env::var("HABITICA_API_TOKEN")
            .map_err(|_| ConfigError::Missing("HABITICA_API_TOKEN"))?;
        let mut cfg = Self::new(user_id, api_token);
        if let Ok(url) = std::env::var("HABITICA_BASE_URL") {
            cfg.base_url = url;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Loads a TOML config file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let cfg: ClientConfig = toml::from_str(&s).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects empty credentials, a zero rate and an unparsable base URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.user_id.trim().is_empty() {
            return Err(ConfigError::Missing("user_id"));
        }
        if self.api_token.trim().is_empty() {
            return Err(ConfigError::Missing("api_token"));
        }
        if self.requests_per_minute == 0 {
            return Err(ConfigError::Invalid {
                field: "requests_per_minute",
                reason: "must be at least 1".into(),
            });
        }
        reqwest::Url::parse(&self.base_url).map_err(|e| ConfigError::Invalid {
            field: "base_url",
            reason: e.to_string(),
        })?;
        Ok(())
    }

    /// Minimum spacing between request dispatches.
    pub fn min_interval(&self) -> Duration {
        min_interval_for(self.requests_per_minute)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Value of the `x-client` header.
    pub fn client_header(&self) -> String {
        format!("{}-{}", self.user_id, self.client_name)
    }
}

/// `60s / rpm`; zero is clamped to one request per minute.
pub fn min_interval_for(requests_per_minute: u32) -> Duration {
    Duration::from_secs(60) / requests_per_minute.max(1)
}
