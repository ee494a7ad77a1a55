// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Expiring local cache.
//!
//! An in-process key→value map with optional idle-time eviction. Values and
//! last-access stamps live in separate exclusion regions so reads are never
//! serialized behind stamp bookkeeping:
//!
//! ```text
//! set / get / delete ────► values: RwLock<HashMap<String, V>>
//!        │                                 ▲
//!        │ Touch/Forget events             │ remove idle keys,
//!        │ (unbounded channel)             │ one short lock each
//!        ▼                                 │
//! ┌──────────────────────────────────────────────┐
//! │ sweep task (started by set_expiration)       │
//! │   owns stamps: HashMap<String, Instant>      │
//! │   every tick: evict keys idle > duration     │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Stamping is asynchronous: `set`/`get` return without waiting for the
//! stamp write. Events are applied by the sweep task in arrival order, so
//! the timestamp it sees for any key never moves backwards. A key touched
//! in the instant before a tick may still carry its previous stamp and get
//! swept; the backing store remains the source of truth, so the next read
//! simply repopulates it.
//!
//! No operation returns an error. A miss is `None`, which keeps "cache
//! miss" distinct from a cached empty value.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::metrics;

mod stats;

pub use stats::CacheStats;

use stats::StatCounters;

/// Access-stamp updates flowing from foreground operations to the sweep task.
enum StampEvent {
    Touch(String),
    Forget(String),
}

/// Live sweep machinery, present once expiration has been armed.
struct Tracking {
    stamp_tx: mpsc::UnboundedSender<StampEvent>,
    duration_tx: watch::Sender<Duration>,
    sweeper: JoinHandle<()>,
}

/// In-process cache with per-key idle eviction.
///
/// Plain `new()` gives an ordinary concurrent map. [`set_expiration`] arms
/// access tracking and a background sweep that removes entries idle longer
/// than the given duration. The sweep task is owned by the cache: it stops
/// on [`shutdown`] or when the cache is dropped.
///
/// [`set_expiration`]: ExpiringCache::set_expiration
/// [`shutdown`]: ExpiringCache::shutdown
pub struct ExpiringCache<V> {
    values: Arc<RwLock<HashMap<String, V>>>,
    tracking: RwLock<Option<Tracking>>,
    counters: Arc<StatCounters>,
    sweep_interval: Duration,
    label: String,
}

impl<V> ExpiringCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::labeled("default")
    }

    /// Create a cache whose log lines and metrics carry `label`.
    #[must_use]
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            values: Arc::new(RwLock::new(HashMap::new())),
            tracking: RwLock::new(None),
            counters: Arc::new(StatCounters::default()),
            sweep_interval: Duration::from_secs(1),
            label: label.into(),
        }
    }

    /// Override the sweep cadence (defaults to one second).
    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn set(&self, key: &str, value: V) {
        self.values.write().insert(key.to_string(), value);
        self.touch(key);
    }

    /// Look up a key. `None` is a miss; a cached empty value is
    /// `Some(empty)`, never conflated with a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let value = self.values.read().get(key).cloned();
        match value {
            Some(v) => {
                self.counters.record_hit();
                self.touch(key);
                Some(v)
            }
            None => {
                self.counters.record_miss();
                None
            }
        }
    }

    pub fn delete(&self, key: &str) {
        self.values.write().remove(key);
        if let Some(t) = self.tracking.read().as_ref() {
            let _ = t.stamp_tx.send(StampEvent::Forget(key.to_string()));
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.len())
    }

    /// Arm idle eviction: entries untouched for longer than `duration` are
    /// removed by a background sweep.
    ///
    /// The first call turns on access stamping for every `set`/`get` and
    /// spawns the sweep task; later calls only adjust the duration, a
    /// second task is never started. Must be called from within a Tokio
    /// runtime.
    pub fn set_expiration(&self, duration: Duration) {
        // Fast path: already armed, just adjust the idle limit
        if let Some(t) = self.tracking.read().as_ref() {
            let _ = t.duration_tx.send(duration);
            return;
        }

        let mut slot = self.tracking.write();
        if let Some(t) = slot.as_ref() {
            let _ = t.duration_tx.send(duration);
            return;
        }

        let (stamp_tx, stamp_rx) = mpsc::unbounded_channel();
        let (duration_tx, duration_rx) = watch::channel(duration);
        let sweeper = tokio::spawn(sweep_loop(
            self.values.clone(),
            stamp_rx,
            duration_rx,
            self.sweep_interval,
            self.counters.clone(),
            self.label.clone(),
        ));
        info!(cache = %self.label, ?duration, "expiration armed, sweep task started");

        *slot = Some(Tracking {
            stamp_tx,
            duration_tx,
            sweeper,
        });
    }

    /// Stop the sweep task and wait for it to exit. Access stamping turns
    /// off; cached values stay readable.
    ///
    /// Dropping the cache also stops the task (its event channel closes),
    /// just without waiting for it.
    pub async fn shutdown(&self) {
        let tracking = self.tracking.write().take();
        if let Some(Tracking {
            stamp_tx,
            duration_tx,
            sweeper,
        }) = tracking
        {
            // Closing the channel is the stop signal
            drop(stamp_tx);
            drop(duration_tx);
            let _ = sweeper.await;
            info!(cache = %self.label, "sweep task stopped");
        }
    }

    fn touch(&self, key: &str) {
        if let Some(t) = self.tracking.read().as_ref() {
            let _ = t.stamp_tx.send(StampEvent::Touch(key.to_string()));
        }
    }
}

impl<V> Default for ExpiringCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Sweep task body. Owns the stamp map outright; foreground operations
/// queue events instead of locking it.
async fn sweep_loop<V>(
    values: Arc<RwLock<HashMap<String, V>>>,
    mut stamp_rx: mpsc::UnboundedReceiver<StampEvent>,
    duration_rx: watch::Receiver<Duration>,
    sweep_interval: Duration,
    counters: Arc<StatCounters>,
    label: String,
) where
    V: Send + Sync + 'static,
{
    let mut stamps: HashMap<String, Instant> = HashMap::new();
    let mut ticker = tokio::time::interval(sweep_interval);

    loop {
        tokio::select! {
            event = stamp_rx.recv() => {
                match event {
                    Some(StampEvent::Touch(key)) => {
                        stamps.insert(key, Instant::now());
                    }
                    Some(StampEvent::Forget(key)) => {
                        stamps.remove(&key);
                    }
                    // All senders gone: cache dropped or shut down
                    None => break,
                }
            }

            _ = ticker.tick() => {
                let idle_limit = *duration_rx.borrow();
                let now = Instant::now();
                let expired: Vec<String> = stamps
                    .iter()
                    .filter(|(_, last)| now.duration_since(**last) > idle_limit)
                    .map(|(key, _)| key.clone())
                    .collect();

                if !expired.is_empty() {
                    // One short value lock per key, never held across the pass
                    for key in &expired {
                        values.write().remove(key);
                        stamps.remove(key);
                    }
                    counters.record_evictions(expired.len() as u64);
                    metrics::record_evictions(&label, expired.len());
                    debug!(cache = %label, evicted = expired.len(), "evicted idle entries");
                }
                metrics::set_cache_entries(&label, values.read().len());
            }
        }
    }
}
