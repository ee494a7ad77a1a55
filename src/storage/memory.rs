use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::traits::{KvStore, StoreError};

struct StoredValue {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Instant::now())
    }
}

/// In-memory [`KvStore`] used by tests and examples.
///
/// TTLs are honored lazily: an expired entry is dropped the first time a
/// read touches it. `write_count` tracks `set` calls so tests can assert
/// that an operation skipped its write.
pub struct InMemoryBackend {
    data: DashMap<String, StoredValue>,
    writes: AtomicU64,
}

impl InMemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            writes: AtomicU64::new(0),
        }
    }

    /// Get current entry count
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of `set` calls served so far
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Clear all entries
    pub fn clear(&self) {
        self.data.clear();
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let value = self
            .data
            .get(key)
            .and_then(|entry| (!entry.expired()).then(|| entry.data.clone()));
        if value.is_none() {
            // Drop entries whose TTL has lapsed on first touch
            self.data.remove_if(key, |_, v| v.expired());
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let stored = StoredValue {
            data: value.to_vec(),
            expires_at: ttl.map(|d| Instant::now() + d),
        };
        self.data.insert(key.to_string(), stored);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.data.remove(key);
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .data
            .iter()
            .filter(|e| e.key().starts_with(prefix) && !e.value().expired())
            .map(|e| e.key().clone())
            .collect())
    }
}
