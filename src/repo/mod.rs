// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Write-through repository.
//!
//! A [`Repository`] binds an entity type to a name, a backing store, and a
//! local [`ExpiringCache`]. Entities are serialized as JSON and stored
//! under `"{repoName}_{id}"`; the cache holds the raw serialized payload
//! keyed by the full store key, so a hit skips the store round trip
//! entirely:
//!
//! ```text
//! save(id, v):  serialize ──► store SET ──► cache insert
//!                             (cache is only written after the store
//!                              write succeeds, so it never advertises
//!                              an entity that was not durably stored)
//!
//! get(id):      cache ──hit──► deserialize
//!                 │miss
//!                 ▼
//!               store GET ──► cache insert ──► deserialize
//! ```
//!
//! Identifiers only need a canonical string round trip: `Display` to build
//! keys, `FromStr` to recover ids from keys, and `Eq` for membership
//! checks. Payload types need `Serialize` and `DeserializeOwned`.
//!
//! Index operations live in a separate impl block and bypass the cache.
//! Their read-modify-write protocol is last-writer-wins; see
//! [`Repository::add_to_index`] for the caveat.

use std::fmt::Display;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::{CacheStats, ExpiringCache};
use crate::metrics;
use crate::storage::{KvStore, StoreError};
use crate::time_operation;

mod index;

/// Errors surfaced by repository operations.
#[derive(Error, Debug)]
pub enum RepoError {
    /// The id resolved to no entity in either the cache or the store.
    #[error("No entity with id '{id}' in repository '{repo}'")]
    NotFound { repo: String, id: String },

    /// The backing store could not complete the operation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A payload could not be encoded or decoded.
    #[error("Payload codec failure: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Typed entity repository over a [`KvStore`].
///
/// `T` is the entity payload, `I` the identifier type. Construct one
/// through [`Manager::load_repo`](crate::Manager::load_repo) or directly
/// with [`Repository::new`].
pub struct Repository<T, I> {
    name: String,
    store: Arc<dyn KvStore>,
    cache: ExpiringCache<Vec<u8>>,
    _types: PhantomData<fn() -> (T, I)>,
}

impl<T, I> Repository<T, I> {
    pub fn new(name: impl Into<String>, store: Arc<dyn KvStore>) -> Self {
        let name = name.into();
        Self {
            cache: ExpiringCache::labeled(name.clone()),
            name,
            store,
            _types: PhantomData,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Arm idle expiration on the local cache: entries untouched for
    /// longer than `idle` are evicted by a background sweep. Must be
    /// called from within a Tokio runtime.
    pub fn set_cache_expiration(&self, idle: Duration) {
        self.cache.set_expiration(idle);
    }

    /// Hit/miss/eviction counters for the local cache.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Stop the cache's eviction sweep, if one is running.
    pub async fn shutdown(&self) {
        self.cache.shutdown().await;
    }

    fn key_prefix(&self) -> String {
        format!("{}_", self.name)
    }
}

fn note_store_status<V>(operation: &'static str, result: &Result<V, StoreError>) {
    let status = if result.is_ok() { "ok" } else { "error" };
    metrics::record_store_op(operation, status);
}

impl<T, I> Repository<T, I>
where
    T: Serialize + DeserializeOwned,
    I: Display + FromStr + Eq,
{
    fn entity_key(&self, id: &I) -> String {
        format!("{}_{}", self.name, id)
    }

    /// Persist an entity, then mirror the serialized payload into the
    /// local cache.
    pub async fn save(&self, id: &I, value: &T) -> Result<(), RepoError> {
        self.write(id, value, None).await
    }

    /// Persist an entity with a store-side TTL.
    ///
    /// The TTL applies to the backing-store entry only; the local copy
    /// follows the cache's own idle expiration. Without idle expiration
    /// armed, the cached copy can outlive the store entry.
    pub async fn save_with_expiration(
        &self,
        id: &I,
        value: &T,
        ttl: Duration,
    ) -> Result<(), RepoError> {
        self.write(id, value, Some(ttl)).await
    }

    async fn write(&self, id: &I, value: &T, ttl: Option<Duration>) -> Result<(), RepoError> {
        let _timer = time_operation!(&self.name, "save");
        let key = self.entity_key(id);
        let payload = serde_json::to_vec(value)?;

        let result = self.store.set(&key, &payload, ttl).await;
        note_store_status("set", &result);
        result?;

        self.cache.set(&key, payload);
        debug!(repo = %self.name, id = %id, "saved entity");
        Ok(())
    }

    /// Fetch an entity, serving from the local cache when possible.
    ///
    /// A miss in both the cache and the store is [`RepoError::NotFound`].
    pub async fn get(&self, id: &I) -> Result<T, RepoError> {
        let _timer = time_operation!(&self.name, "get");
        let key = self.entity_key(id);

        if let Some(payload) = self.cache.get(&key) {
            metrics::record_cache_hit(&self.name);
            return Ok(serde_json::from_slice(&payload)?);
        }
        metrics::record_cache_miss(&self.name);

        let result = self.store.get(&key).await;
        note_store_status("get", &result);
        let payload = result?.ok_or_else(|| RepoError::NotFound {
            repo: self.name.clone(),
            id: id.to_string(),
        })?;

        self.cache.set(&key, payload.clone());
        Ok(serde_json::from_slice(&payload)?)
    }

    /// Fetch every entity under this repository's prefix.
    ///
    /// Keys already present in the local cache are served from it; the
    /// remainder is batch-fetched in a single multi-get. Payloads that
    /// fail to deserialize (including index arrays, which share the key
    /// namespace) are dropped from the result rather than failing the
    /// whole batch.
    pub async fn get_all(&self) -> Result<Vec<T>, RepoError> {
        let _timer = time_operation!(&self.name, "get_all");
        let keys = self.store.keys(&self.key_prefix()).await?;

        let mut found: Vec<(usize, T)> = Vec::new();
        let mut unknown: Vec<(usize, String)> = Vec::new();

        for (position, key) in keys.into_iter().enumerate() {
            match self.cache.get(&key) {
                Some(payload) => match serde_json::from_slice(&payload) {
                    Ok(value) => found.push((position, value)),
                    Err(_) => {
                        metrics::record_dropped_payload(&self.name);
                    }
                },
                None => unknown.push((position, key)),
            }
        }

        if !unknown.is_empty() {
            let wanted: Vec<String> = unknown.iter().map(|(_, key)| key.clone()).collect();
            let result = self.store.multi_get(&wanted).await;
            note_store_status("mget", &result);

            for ((position, key), payload) in unknown.into_iter().zip(result?) {
                // Absent payloads were deleted between the scan and the fetch
                let Some(payload) = payload else { continue };
                match serde_json::from_slice(&payload) {
                    Ok(value) => {
                        self.cache.set(&key, payload);
                        found.push((position, value));
                    }
                    Err(_) => {
                        metrics::record_dropped_payload(&self.name);
                    }
                }
            }
        }

        found.sort_by_key(|(position, _)| *position);
        Ok(found.into_iter().map(|(_, value)| value).collect())
    }

    /// Delete an entity from the store, then from the local cache.
    ///
    /// The cache removal runs even when the store call fails, so a stale
    /// local copy never survives a deletion attempt.
    pub async fn delete(&self, id: &I) -> Result<(), RepoError> {
        let _timer = time_operation!(&self.name, "delete");
        let key = self.entity_key(id);

        let result = self.store.delete(&key).await;
        note_store_status("del", &result);
        self.cache.delete(&key);
        result?;

        debug!(repo = %self.name, id = %id, "deleted entity");
        Ok(())
    }

    /// Enumerate the identifiers stored under this repository's prefix.
    ///
    /// Keys whose suffix does not parse as an identifier (index keys
    /// share the prefix) are skipped.
    pub async fn list(&self) -> Result<Vec<I>, RepoError> {
        let _timer = time_operation!(&self.name, "list");
        let prefix = self.key_prefix();
        let keys = self.store.keys(&prefix).await?;

        let mut ids = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(suffix) = key.strip_prefix(&prefix) else {
                continue;
            };
            match suffix.parse::<I>() {
                Ok(id) => ids.push(id),
                Err(_) => {
                    debug!(repo = %self.name, key = %key, "skipping key without a parseable identifier");
                }
            }
        }
        Ok(ids)
    }

    /// Audit stored entities against their keys and delete inconsistent
    /// records. Returns how many were removed.
    ///
    /// A record is removed when its payload is not valid JSON, or when it
    /// carries an `id` field that does not match the identifier encoded
    /// in its key. Payloads without an `id` field carry no integrity
    /// signal and are left alone, as are index keys.
    pub async fn cleanup_invalid_keys(&self) -> Result<usize, RepoError> {
        let _timer = time_operation!(&self.name, "cleanup");
        let prefix = self.key_prefix();
        let keys = self.store.keys(&prefix).await?;

        let entities: Vec<(String, I)> = keys
            .into_iter()
            .filter_map(|key| {
                let id = key.strip_prefix(&prefix)?.parse::<I>().ok()?;
                Some((key, id))
            })
            .collect();

        let wanted: Vec<String> = entities.iter().map(|(key, _)| key.clone()).collect();
        let payloads = self.store.multi_get(&wanted).await?;

        let mut removed = 0;
        for ((key, id), payload) in entities.into_iter().zip(payloads) {
            let Some(payload) = payload else { continue };
            if Self::payload_is_consistent(&payload, &id) {
                continue;
            }
            self.store.delete(&key).await?;
            self.cache.delete(&key);
            removed += 1;
            warn!(repo = %self.name, key = %key, "removed entity with inconsistent payload");
        }

        if removed > 0 {
            metrics::record_cleanup_removed(&self.name, removed);
        }
        Ok(removed)
    }

    fn payload_is_consistent(payload: &[u8], expected: &I) -> bool {
        let Ok(value) = serde_json::from_slice::<serde_json::Value>(payload) else {
            return false;
        };
        let id_text = match value.get("id") {
            Some(serde_json::Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
            None => return true,
        };
        id_text.parse::<I>().is_ok_and(|parsed| parsed == *expected)
    }
}
