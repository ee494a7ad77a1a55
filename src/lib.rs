//! # KV Repo
//!
//! A write-through repository layer for Redis with an expiring local cache.
//!
//! ## Architecture
//!
//! Each repository binds an entity type to a key prefix and routes reads
//! through a local cache:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Repository<T, I>                       │
//! │  • save / get / get_all / delete / list                    │
//! │  • identifier indexes stored as JSON arrays                │
//! │  • keys "{repoName}_{id}"                                  │
//! └─────────────────────────────────────────────────────────────┘
//!            │ cache hit                  │ miss / write-through
//!            ▼                            ▼
//! ┌─────────────────────────┐  ┌─────────────────────────────────┐
//! │     ExpiringCache       │  │           KvStore               │
//! │  • raw serialized       │  │  • RedisBackend (prod)          │
//! │    payloads             │  │  • InMemoryBackend (tests,      │
//! │  • idle-time eviction   │  │    embedding)                   │
//! │    sweep                │  │                                 │
//! └─────────────────────────┘  └─────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use kv_repo::{Manager, RepoConfig, Repository};
//! use serde::{Deserialize, Serialize};
//! use uuid::Uuid;
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct User {
//!     id: Uuid,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), kv_repo::RepoError> {
//!     let manager = Manager::connect(RepoConfig::default()).await?;
//!
//!     // One repository per entity type; entries idle for five minutes
//!     // are evicted from the local cache
//!     let users: Repository<User, Uuid> =
//!         manager.load_repo_with_expiration("users", Duration::from_secs(300));
//!
//!     let id = Uuid::new_v4();
//!     users.save(&id, &User { id, name: "Ada".into() }).await?;
//!     let user = users.get(&id).await?;
//!     println!("loaded {}", user.name);
//!
//!     // Secondary lookup through a named index
//!     users.add_to_index("admins", &id).await?;
//!     for admin in users.get_index("admins").await? {
//!         println!("admin: {admin}");
//!     }
//!
//!     users.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Write-through caching**: reads are served locally after the first
//!   fetch; the cache is only updated once the store write succeeds
//! - **Idle expiration**: a background sweep evicts cache entries
//!   untouched for a configurable duration
//! - **Identifier indexes**: named, deduplicated id lists stored as plain
//!   JSON arrays, inspectable with ordinary Redis tooling
//! - **Database allocation**: a repository can claim a whole numbered
//!   Redis database through a shared registry key
//! - **Retry logic**: bounded startup and per-query retry cadences
//! - **Metrics**: counters, gauges, and latency histograms via the
//!   `metrics` facade; the embedding application picks the exporter
//!
//! ## Configuration
//!
//! See [`RepoConfig`] for all configuration options.
//!
//! ## Modules
//!
//! - [`manager`]: connection entry point and repository factory
//! - [`repo`]: the typed [`Repository`] and its index operations
//! - [`cache`]: the [`ExpiringCache`] with idle eviction
//! - [`storage`]: backing stores behind the [`KvStore`] trait
//! - [`retry`]: bounded retry with exponential backoff
//! - [`config`]: runtime configuration
//! - [`metrics`]: operation counters and latency timers

pub mod config;
pub mod retry;
pub mod storage;
pub mod cache;
pub mod repo;
pub mod manager;
pub mod metrics;

pub use cache::{CacheStats, ExpiringCache};
pub use config::RepoConfig;
pub use manager::Manager;
pub use metrics::LatencyTimer;
pub use repo::{RepoError, Repository};
pub use retry::RetryConfig;
pub use storage::{InMemoryBackend, KvStore, RedisBackend, StoreError};
