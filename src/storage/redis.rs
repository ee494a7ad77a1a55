//! Redis backing store.
//!
//! Values are stored as plain Redis STRINGs (SET / SETEX), so payloads stay
//! inspectable with ordinary tooling:
//!
//! ```text
//! GET  users_6f1c...        → {"id":"6f1c...","name":"Alice"}
//! KEYS users_*              → enumeration for list()/get_all()
//! MGET users_a users_b ...  → one round trip for the uncached remainder
//! ```
//!
//! Every command runs under a per-attempt deadline and the query retry
//! preset, so a dead server surfaces as [`StoreError`] instead of a hung
//! caller. An optional namespace prefix is prepended to all keys (and
//! stripped from `keys()` results) for sharing a server with other
//! applications.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{cmd, AsyncCommands, Client};
use tokio::time::timeout;

use super::traits::{KvStore, StoreError};
use crate::config::RepoConfig;
use crate::retry::{retry, RetryConfig};

/// Deadline applied to each command attempt when none is configured.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RedisBackend {
    connection: ConnectionManager,
    /// Optional key prefix for namespacing (e.g. "myapp:" → "myapp:users_42")
    prefix: String,
    /// Per-attempt deadline for every command
    op_timeout: Duration,
}

/// Run one command attempt under the per-operation deadline.
async fn with_deadline<T>(
    deadline: Duration,
    op: &'static str,
    fut: impl Future<Output = Result<T, redis::RedisError>>,
) -> Result<T, StoreError> {
    match timeout(deadline, fut).await {
        Ok(res) => res.map_err(|e| StoreError::Unavailable(e.to_string())),
        Err(_) => Err(StoreError::Timeout { op }),
    }
}

impl RedisBackend {
    /// Connect without a key prefix, using the default operation deadline.
    pub async fn connect(connection_string: &str) -> Result<Self, StoreError> {
        Self::with_options(connection_string, None, DEFAULT_OP_TIMEOUT).await
    }

    /// Connect as described by a [`RepoConfig`]: its URL, key prefix,
    /// operation deadline, and startup retry cadence.
    pub async fn from_config(config: &RepoConfig) -> Result<Self, StoreError> {
        let client = Client::open(config.redis_url.as_str())
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let connection = Self::open_manager(client, &config.startup_retry()).await?;

        Ok(Self {
            connection,
            prefix: config.key_prefix.clone().unwrap_or_default(),
            op_timeout: config.operation_timeout(),
        })
    }

    /// Connect with an optional namespace prefix and operation deadline.
    ///
    /// The prefix is prepended to all keys, enabling namespacing when
    /// sharing a Redis instance with other applications.
    pub async fn with_options(
        connection_string: &str,
        prefix: Option<&str>,
        op_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client =
            Client::open(connection_string).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let connection = Self::open_manager(client, &RetryConfig::startup()).await?;

        Ok(Self {
            connection,
            prefix: prefix.unwrap_or("").to_string(),
            op_timeout,
        })
    }

    /// Connect to a specific numbered database on the same server.
    pub async fn with_db(
        connection_string: &str,
        db: i64,
        op_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client =
            Client::open(connection_string).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let mut info = client.get_connection_info().clone();
        info.redis.db = db;
        let client = Client::open(info).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let connection = Self::open_manager(client, &RetryConfig::startup()).await?;

        Ok(Self {
            connection,
            prefix: String::new(),
            op_timeout,
        })
    }

    /// Dial the server under the given startup cadence. `ConnectionManager`
    /// performs the initial handshake eagerly, so a dead server fails here
    /// rather than on first use.
    async fn open_manager(
        client: Client,
        startup: &RetryConfig,
    ) -> Result<ConnectionManager, StoreError> {
        retry("redis_connect", startup, || async {
            ConnectionManager::new(client.clone()).await
        })
        .await
        .map_err(|e: redis::RedisError| StoreError::Unavailable(e.to_string()))
    }

    /// Round-trip liveness check (PING).
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        with_deadline(self.op_timeout, "ping", async move {
            let _: String = cmd("PING").query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    /// Apply the prefix to a key.
    #[inline]
    fn prefixed_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}", self.prefix, key)
        }
    }

    /// Strip the prefix from a key (for returning clean keys from `keys()`).
    #[inline]
    fn strip_prefix<'a>(&self, key: &'a str) -> &'a str {
        if self.prefix.is_empty() {
            key
        } else {
            key.strip_prefix(&self.prefix).unwrap_or(key)
        }
    }
}

#[async_trait]
impl KvStore for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let conn = self.connection.clone();
        let key = self.prefixed_key(key);
        let deadline = self.op_timeout;

        retry("redis_get", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = key.clone();
            async move {
                with_deadline(deadline, "get", async move {
                    let data: Option<Vec<u8>> = conn.get(&key).await?;
                    Ok(data)
                })
                .await
            }
        })
        .await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StoreError> {
        let conn = self.connection.clone();
        let key = self.prefixed_key(key);
        let data = value.to_vec();
        let deadline = self.op_timeout;

        retry("redis_set", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = key.clone();
            let data = data.clone();
            async move {
                with_deadline(deadline, "set", async move {
                    match ttl {
                        // SETEX rejects 0, so sub-second TTLs round up
                        Some(d) => {
                            let _: () = conn.set_ex(&key, data.as_slice(), d.as_secs().max(1)).await?;
                        }
                        None => {
                            let _: () = conn.set(&key, data.as_slice()).await?;
                        }
                    }
                    Ok(())
                })
                .await
            }
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let conn = self.connection.clone();
        let key = self.prefixed_key(key);
        let deadline = self.op_timeout;

        retry("redis_delete", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = key.clone();
            async move {
                with_deadline(deadline, "delete", async move {
                    let _: () = conn.del(&key).await?;
                    Ok(())
                })
                .await
            }
        })
        .await
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.connection.clone();
        let pattern = format!("{}*", self.prefixed_key(prefix));
        let deadline = self.op_timeout;

        let matched = retry("redis_keys", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let pattern = pattern.clone();
            async move {
                with_deadline(deadline, "keys", async move {
                    let keys: Vec<String> = conn.keys(&pattern).await?;
                    Ok(keys)
                })
                .await
            }
        })
        .await?;

        Ok(matched
            .into_iter()
            .map(|k| self.strip_prefix(&k).to_string())
            .collect())
    }

    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, StoreError> {
        // MGET with zero keys is a protocol error
        if keys.is_empty() {
            return Ok(vec![]);
        }

        let conn = self.connection.clone();
        let prefixed: Vec<String> = keys.iter().map(|k| self.prefixed_key(k)).collect();
        let deadline = self.op_timeout;

        retry("redis_mget", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let keys = prefixed.clone();
            async move {
                with_deadline(deadline, "multi_get", async move {
                    let values: Vec<Option<Vec<u8>>> = conn.mget(&keys).await?;
                    Ok(values)
                })
                .await
            }
        })
        .await
    }
}
