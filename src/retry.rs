// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry logic with exponential backoff.
//!
//! Provides configurable retry behavior for transient store failures.
//! Different presets are available for different use cases.
//!
//! # Example
//!
//! ```
//! use kv_repo::RetryConfig;
//!
//! // Bootstrap: patient, fixed one-second cadence
//! let startup = RetryConfig::startup();
//! assert_eq!(startup.max_retries, Some(10));
//!
//! // Query: quick retry, then fail
//! let query = RetryConfig::query();
//! assert_eq!(query.max_retries, Some(3));
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

/// Configuration for connection/operation retry behavior.
///
/// Use the preset constructors for common patterns:
/// - [`RetryConfig::startup()`] - Patient fixed-cadence loop for bootstrap
/// - [`RetryConfig::query()`] - Quick retry for individual operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    /// Total attempts before giving up; `None` retries forever.
    pub max_retries: Option<usize>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::query()
    }
}

impl RetryConfig {
    /// Bootstrap preset: ten one-second attempts, no backoff growth.
    /// The classic "wait for the store to come up" dial loop; gives a
    /// containerized backend ~10 seconds to become reachable.
    #[must_use]
    pub fn startup() -> Self {
        Self {
            max_retries: Some(10),
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(1),
            factor: 1.0,
        }
    }

    /// Quick retry for individual store round trips (don't block forever).
    /// 3 attempts with fast backoff - if it still fails, let the caller
    /// handle it.
    #[must_use]
    pub fn query() -> Self {
        Self {
            max_retries: Some(3),
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }

    /// Fast retry for tests (minimal delays)
    #[cfg(test)]
    pub(crate) fn test() -> Self {
        Self {
            max_retries: Some(3),
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            factor: 2.0,
        }
    }
}

pub async fn retry<F, Fut, T, E>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = config.initial_delay;
    let mut attempt = 1usize;

    loop {
        match operation().await {
            Ok(val) => {
                if attempt > 1 {
                    info!(
                        operation = operation_name,
                        attempt, "operation succeeded after retries"
                    );
                }
                return Ok(val);
            }
            Err(err) => {
                if config.max_retries.is_some_and(|max| attempt >= max) {
                    return Err(err);
                }
                warn!(
                    operation = operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "operation failed, retrying"
                );
                sleep(delay).await;
                delay = delay.mul_f64(config.factor).min(config.max_delay);
                attempt += 1;
            }
        }
    }
}
