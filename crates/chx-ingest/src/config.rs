//! Replication feed configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::replication::DEFAULT_BATCH_SIZE;

/// Configuration for the replication catch-up engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplicationConfig {
    /// Base URL of the minutely changeset feed
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Records per sink submission
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Stop extracting after this many records per file (diagnostic runs)
    #[serde(default)]
    pub limit: Option<usize>,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            batch_size: default_batch_size(),
            limit: None,
        }
    }
}

impl ReplicationConfig {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.is_empty() {
            return Err("base_url must not be empty".to_string());
        }
        if self.batch_size == 0 {
            return Err("batch_size must be positive".to_string());
        }
        if self.timeout_secs == 0 {
            return Err("timeout_secs must be positive".to_string());
        }
        Ok(())
    }

    /// URL of the feed state document
    pub fn state_url(&self) -> String {
        format!("{}/state.yaml", self.base_url.trim_end_matches('/'))
    }

    /// Build an HTTP client honoring the configured timeout and user agent
    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .user_agent(self.user_agent.clone())
            .build()
    }
}

fn default_base_url() -> String {
    "https://planet.osm.org/replication/changesets".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    "CHX-Changeset-Ingester/1.0".to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReplicationConfig::default();
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert!(config.base_url.starts_with("https://"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_state_url_strips_trailing_slash() {
        let config = ReplicationConfig {
            base_url: "https://example.org/replication/changesets/".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.state_url(),
            "https://example.org/replication/changesets/state.yaml"
        );
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let config = ReplicationConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: ReplicationConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ReplicationConfig::default());
    }
}
