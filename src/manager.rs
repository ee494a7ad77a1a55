//! Connection manager and repository factory.
//!
//! [`Manager`] owns the backing-store handle and hands out typed
//! [`Repository`] instances that share it. Repositories that want a
//! whole Redis database to themselves go through [`load_db_repo`],
//! which assigns database numbers from a registry key:
//!
//! ```text
//! GET databases            → "users:1,orders:2"
//! load_db_repo("carts")    → allocates 3, writes "users:1,orders:2,carts:3",
//!                            connects a second client with db=3
//! ```
//!
//! [`load_db_repo`]: Manager::load_db_repo

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::config::RepoConfig;
use crate::repo::Repository;
use crate::storage::{KvStore, RedisBackend, StoreError};

/// Store key holding the repository-to-database-number registry.
const REGISTRY_KEY: &str = "databases";

pub struct Manager {
    store: Arc<dyn KvStore>,
    config: RepoConfig,
}

impl Manager {
    /// Connect to the store described by `config`, retrying at the
    /// configured startup cadence, and confirm liveness with a ping.
    pub async fn connect(config: RepoConfig) -> Result<Self, StoreError> {
        let backend = RedisBackend::from_config(&config).await?;
        backend.ping().await?;
        info!(url = %config.redis_url, "connected to redis");

        Ok(Self {
            store: Arc::new(backend),
            config,
        })
    }

    /// Build a manager over an already-constructed store. Useful for
    /// embedding an [`InMemoryBackend`](crate::InMemoryBackend) in tests.
    pub fn with_store(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            config: RepoConfig::default(),
        }
    }

    /// Handle to the primary store shared by [`load_repo`] repositories.
    ///
    /// [`load_repo`]: Manager::load_repo
    pub fn store(&self) -> Arc<dyn KvStore> {
        self.store.clone()
    }

    /// Create a typed repository on the primary store.
    pub fn load_repo<T, I>(&self, name: &str) -> Repository<T, I> {
        Repository::new(name, self.store.clone())
    }

    /// Create a typed repository whose local cache evicts entries idle
    /// for longer than `idle`. Must be called from within a Tokio
    /// runtime.
    pub fn load_repo_with_expiration<T, I>(&self, name: &str, idle: Duration) -> Repository<T, I> {
        let repo = self.load_repo(name);
        repo.set_cache_expiration(idle);
        repo
    }

    /// Create a typed repository on its own numbered database, assigned
    /// through the `databases` registry.
    ///
    /// Repository names must not contain `:` or `,`; those delimit
    /// registry entries. Redis ships with 16 databases by default, so
    /// allocation past the configured limit surfaces as a connection
    /// error.
    #[instrument(skip(self))]
    pub async fn load_db_repo<T, I>(&self, name: &str) -> Result<Repository<T, I>, StoreError> {
        let db = self.db_number(name).await?;
        let backend = RedisBackend::with_db(
            &self.config.redis_url,
            i64::from(db),
            self.config.operation_timeout(),
        )
        .await?;

        Ok(Repository::new(name, Arc::new(backend)))
    }

    /// Resolve the database number for `name`, allocating the next free
    /// one on first sight.
    ///
    /// The registry is a comma-joined list of `name:number` pairs under
    /// [`REGISTRY_KEY`] in the primary store. Entries that do not parse
    /// are skipped on read and dropped on the next write-back. Like the
    /// index protocol, this is read-modify-write without compare-and-swap;
    /// concurrent first-time allocations can race.
    async fn db_number(&self, name: &str) -> Result<u32, StoreError> {
        let raw = self.store.get(REGISTRY_KEY).await?;
        let text = raw
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default();

        let mut highest = 0;
        let mut entries: Vec<(String, u32)> = Vec::new();
        for entry in text.split(',') {
            let Some((entry_name, number)) = entry.split_once(':') else {
                if !entry.is_empty() {
                    warn!(entry = %entry, "skipping malformed database registry entry");
                }
                continue;
            };
            let Ok(number) = number.parse::<u32>() else {
                warn!(entry = %entry, "skipping malformed database registry entry");
                continue;
            };

            if number > highest {
                highest = number;
            }
            if entry_name == name {
                return Ok(number);
            }
            entries.push((entry_name.to_string(), number));
        }

        let allocated = highest + 1;
        entries.push((name.to_string(), allocated));
        let joined = entries
            .iter()
            .map(|(entry_name, number)| format!("{entry_name}:{number}"))
            .collect::<Vec<_>>()
            .join(",");
        self.store.set(REGISTRY_KEY, joined.as_bytes(), None).await?;

        info!(repo = %name, db = allocated, "allocated database number");
        Ok(allocated)
    }
}
