//! Configuration management for redrate.

use std::path::Path;
use std::time::Duration;

use redis::{ConnectionInfo, IntoConnectionInfo};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{RedrateError, Result};
use crate::ratelimit::LimitRules;

/// Prefix applied to every rate state key unless configured otherwise.
pub const DEFAULT_KEY_PREFIX: &str = "rate:";

/// Main configuration for redrate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedrateConfig {
    /// Known store endpoints; the limiter picks one by index
    #[serde(default = "default_stores")]
    pub stores: Vec<StoreConfig>,

    /// Limiter configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Named limit policies
    #[serde(default)]
    pub limits: LimitRules,
}

impl Default for RedrateConfig {
    fn default() -> Self {
        Self {
            stores: default_stores(),
            limiter: LimiterConfig::default(),
            limits: LimitRules::default(),
        }
    }
}

fn default_stores() -> Vec<StoreConfig> {
    vec![StoreConfig::default()]
}

/// Connection settings for one Redis-compatible store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Connection URL, e.g. `redis://127.0.0.1:6379`
    #[serde(default = "default_url")]
    pub url: String,

    /// Database index, overriding the one in the URL
    #[serde(default)]
    pub db: Option<i64>,

    /// ACL username, overriding the one in the URL
    #[serde(default)]
    pub username: Option<String>,

    /// Password, overriding the one in the URL
    #[serde(default)]
    pub password: Option<String>,

    /// Connection establishment timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Per-command response timeout in milliseconds
    #[serde(default = "default_response_timeout")]
    pub response_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            db: None,
            username: None,
            password: None,
            connect_timeout_ms: default_connect_timeout(),
            response_timeout_ms: default_response_timeout(),
        }
    }
}

fn default_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_response_timeout() -> u64 {
    3000
}

impl StoreConfig {
    /// Create a store configuration for the given URL with default timeouts.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Resolve the URL and overrides into connection parameters.
    pub fn connection_info(&self) -> Result<ConnectionInfo> {
        let mut info = self
            .url
            .as_str()
            .into_connection_info()
            .map_err(|e| RedrateError::Config(format!("invalid store url {}: {}", self.url, e)))?;

        if let Some(db) = self.db {
            info.redis.db = db;
        }
        if self.username.is_some() {
            info.redis.username = self.username.clone();
        }
        if self.password.is_some() {
            info.redis.password = self.password.clone();
        }
        Ok(info)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

/// Limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Index into `stores` of the store holding rate state
    #[serde(default)]
    pub store: usize,

    /// Prefix prepended to every caller-supplied key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            store: 0,
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

impl RedrateConfig {
    /// Load configuration from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| RedrateError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// The store the limiter is configured to use.
    ///
    /// An index past the end of `stores` is a configuration error.
    pub fn limiter_store(&self) -> Result<&StoreConfig> {
        self.stores.get(self.limiter.store).ok_or_else(|| {
            RedrateError::Config(format!(
                "limiter store index {} out of range ({} stores configured)",
                self.limiter.store,
                self.stores.len()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RedrateConfig::default();
        assert_eq!(config.stores.len(), 1);
        assert_eq!(config.limiter.store, 0);
        assert_eq!(config.limiter.key_prefix, "rate:");
        assert_eq!(config.stores[0].response_timeout(), Duration::from_secs(3));
        assert!(config.limits.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
stores:
  - url: redis://cache-a:6379
  - url: redis://cache-b:6380/2
    password: hunter2
    response_timeout_ms: 250
limiter:
  store: 1
  key_prefix: "api:"
limits:
  login:
    rate: 5
    unit: minute
    burst: 10
"#;
        let config = RedrateConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.stores.len(), 2);
        assert_eq!(config.limiter.key_prefix, "api:");

        let store = config.limiter_store().unwrap();
        assert_eq!(store.url, "redis://cache-b:6380/2");
        assert_eq!(store.response_timeout(), Duration::from_millis(250));
        assert_eq!(store.connect_timeout(), Duration::from_secs(5));

        let info = store.connection_info().unwrap();
        assert_eq!(info.redis.db, 2);
        assert_eq!(info.redis.password.as_deref(), Some("hunter2"));

        assert!(config.limits.get("login").is_some());
    }

    #[test]
    fn test_db_override() {
        let mut store = StoreConfig::with_url("redis://localhost:6379/3");
        store.db = Some(7);
        let info = store.connection_info().unwrap();
        assert_eq!(info.redis.db, 7);
    }

    #[test]
    fn test_store_index_out_of_range() {
        let yaml = r#"
limiter:
  store: 3
"#;
        let config = RedrateConfig::from_yaml(yaml).unwrap();
        let err = config.limiter_store().unwrap_err();
        assert!(matches!(err, RedrateError::Config(_)));
    }

    #[test]
    fn test_invalid_url() {
        let store = StoreConfig::with_url("not a url");
        assert!(matches!(
            store.connection_info(),
            Err(RedrateError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(RedrateConfig::from_yaml("stores: 5").is_err());
    }
}
