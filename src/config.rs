//! Configuration for repositories and their backing store.
//!
//! # Example
//!
//! ```
//! use kv_repo::RepoConfig;
//!
//! // Minimal config (uses defaults)
//! let config = RepoConfig::default();
//! assert_eq!(config.redis_url, "redis://127.0.0.1:6379");
//! assert_eq!(config.sweep_interval_ms, 1000);
//!
//! // Full config
//! let config = RepoConfig {
//!     redis_url: "redis://cache.internal:6379".into(),
//!     key_prefix: Some("myapp:".into()),
//!     operation_timeout_ms: 2000,
//!     ..Default::default()
//! };
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::retry::RetryConfig;

/// Configuration for a repository manager.
///
/// All fields have sensible defaults; a default config talks to a local
/// Redis with no key prefix.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoConfig {
    /// Redis connection string (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Optional namespace prefix prepended to every store key
    #[serde(default)]
    pub key_prefix: Option<String>,

    /// Per-attempt deadline for store round trips, in milliseconds
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,

    /// Eviction sweep cadence, in milliseconds
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Connection dial attempts before `connect` gives up
    #[serde(default = "default_connect_retries")]
    pub connect_retries: usize,

    /// Flat delay between dial attempts, in milliseconds
    #[serde(default = "default_connect_backoff_ms")]
    pub connect_backoff_ms: u64,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_operation_timeout_ms() -> u64 {
    5000
}
fn default_sweep_interval_ms() -> u64 {
    1000
}
fn default_connect_retries() -> usize {
    10
}
fn default_connect_backoff_ms() -> u64 {
    1000
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            key_prefix: None,
            operation_timeout_ms: default_operation_timeout_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            connect_retries: default_connect_retries(),
            connect_backoff_ms: default_connect_backoff_ms(),
        }
    }
}

impl RepoConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Retry schedule for the connection dial, built from the connect fields.
    pub(crate) fn startup_retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: Some(self.connect_retries),
            initial_delay: Duration::from_millis(self.connect_backoff_ms),
            max_delay: Duration::from_millis(self.connect_backoff_ms),
            factor: 1.0,
        }
    }
}
