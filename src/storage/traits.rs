use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Operation '{op}' exceeded its deadline")]
    Timeout { op: &'static str },
}

/// Contract the repository layer requires from a backing store.
///
/// Keys are flat strings; values are opaque byte payloads. A missing key is
/// `Ok(None)`, never an error, so callers can tell "absent" apart from
/// "store unreachable". Deleting a key that does not exist is `Ok(())`.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write a value. `ttl: None` means no expiry; `Some(d)` expires the key
    /// after `d` (rounded up to whole seconds).
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// All keys starting with `prefix`, in no particular order.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Fetch several keys in one round trip. The result has the same length
    /// and order as `keys`, with `None` for absent entries.
    ///
    /// Default implementation falls back to sequential gets.
    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, StoreError> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.get(key).await?);
        }
        Ok(out)
    }
}
