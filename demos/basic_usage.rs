// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic repository usage example.
//!
//! Demonstrates:
//! 1. Building a repository manager over the in-memory backend
//! 2. Saving typed entries
//! 3. Fetching them back through the cache
//! 4. Enumerating with `get_all` and `list`
//! 5. Secondary-index membership
//! 6. Cleaning up inconsistent records
//! 7. Idle expiration of cached entries
//! 8. Displaying metrics and shutting down
//!
//! The in-memory backend needs no external services. To run against a
//! real Redis instead, replace `Manager::with_store` with
//! `Manager::connect(RepoConfig::default())`.
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use kv_repo::{InMemoryBackend, KvStore, Manager, RepoError};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct User {
    id: Uuid,
    name: String,
    role: String,
}

impl User {
    fn new(name: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            role: role.to_string(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install metrics recorder (captures all metrics for the final dump)
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    // Simple logging (no filter for simplicity)
    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║              kv-repo: Basic Usage Example                     ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Build the repository manager
    // ─────────────────────────────────────────────────────────────────────────
    println!("📦 Building manager over the in-memory backend...");

    let backend = Arc::new(InMemoryBackend::new());
    let manager = Manager::with_store(backend.clone());
    let users = manager.load_repo::<User, Uuid>("users");

    println!("   ✅ Repository '{}' ready", users.name());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Save entries (with timing)
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📝 Saving 3 users...");

    let alice = User::new("Alice", "admin");
    let bob = User::new("Bob", "user");
    let carol = User::new("Carol", "user");

    let mut save_times = Vec::new();
    for user in [&alice, &bob, &carol] {
        let start = Instant::now();
        users.save(&user.id, user).await?;
        let elapsed = start.elapsed();
        save_times.push(elapsed);
        println!("   └─ Saved: {} ({}) ({:?})", user.name, user.role, elapsed);
    }

    let avg_save: Duration = save_times.iter().sum::<Duration>() / save_times.len() as u32;
    println!("   ⚡ Save avg: {:?} (store write, then cache fill)", avg_save);

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Fetch back (cache hits + a miss)
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📖 Fetching users back (with timing)...");
    println!("   ⏱️  Saves already populated the cache, so these never touch the store");

    for user in [&alice, &bob, &carol] {
        let start = Instant::now();
        let fetched = users.get(&user.id).await?;
        let elapsed = start.elapsed();
        println!("   └─ {} → role '{}' ({:?})", fetched.name, fetched.role, elapsed);
    }

    // A missing identifier fails with a dedicated error kind
    match users.get(&Uuid::new_v4()).await {
        Err(RepoError::NotFound { repo, id }) => {
            println!("   └─ Unknown id in '{}' → NotFound ({})", repo, id);
        }
        other => println!("   └─ Unexpected result for unknown id: {:?}", other.map(|u| u.name)),
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Enumerate: get_all and list
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🗂️  Enumerating the repository...");

    let everyone = users.get_all().await?;
    println!("   └─ get_all: {} users", everyone.len());
    for user in &everyone {
        println!("      └─ {} ({})", user.name, user.role);
    }

    let ids = users.list().await?;
    println!("   └─ list: {} identifiers", ids.len());

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Secondary index: admins
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔖 Tracking admins in a secondary index...");

    users.add_to_index("admins", &alice.id).await?;
    println!("   └─ Added Alice to 'admins'");

    // Duplicate adds are no-ops and skip the store write entirely
    let writes_before = backend.write_count();
    users.add_to_index("admins", &alice.id).await?;
    let writes_after = backend.write_count();
    println!(
        "   └─ Re-added Alice: store writes {} → {} (unchanged)",
        writes_before, writes_after
    );

    let admins = users.get_index("admins").await?;
    println!("   └─ 'admins' members: {:?}", admins);

    users.remove_from_index("admins", &alice.id).await?;
    let admins = users.get_index("admins").await?;
    println!("   └─ After removal: {} members", admins.len());

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Cleanup of inconsistent records
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🧹 Auditing stored payloads...");

    // Plant a record whose payload claims a different id than its key
    let stray_key = format!("users_{}", Uuid::new_v4());
    let stray_payload = serde_json::to_vec(&alice)?;
    backend.set(&stray_key, &stray_payload, None).await?;
    println!("   └─ Planted a payload under a mismatched key");

    let removed = users.cleanup_invalid_keys().await?;
    println!("   └─ cleanup_invalid_keys removed {} record(s)", removed);
    println!("   └─ {} users remain", users.list().await?.len());

    // ─────────────────────────────────────────────────────────────────────────
    // 7. Idle expiration
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n⏲️  Demonstrating idle expiration (1s idle limit)...");

    let sessions = manager.load_repo_with_expiration::<User, Uuid>("sessions", Duration::from_secs(1));
    let dave = User::new("Dave", "guest");
    sessions.save(&dave.id, &dave).await?;
    println!("   └─ Saved Dave; cached entries: {}", sessions.cache_stats().entries);

    println!("   └─ Sleeping 2.5s so the sweep can evict the idle entry...");
    tokio::time::sleep(Duration::from_millis(2500)).await;

    let stats = sessions.cache_stats();
    println!(
        "   └─ After sleep: entries={} evictions={}",
        stats.entries, stats.evictions
    );

    // The store still holds the record; the next read repopulates the cache
    let fetched = sessions.get(&dave.id).await?;
    println!(
        "   └─ Read-through restored {}; cached entries: {}",
        fetched.name,
        sessions.cache_stats().entries
    );

    // ─────────────────────────────────────────────────────────────────────────
    // 8. Metrics and shutdown
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📊 Cache statistics for 'users':");
    let stats = users.cache_stats();
    println!("   └─ Hits: {}", stats.hits);
    println!("   └─ Misses: {}", stats.misses);
    println!("   └─ Entries: {}", stats.entries);
    println!("   └─ Hit rate: {:.1}%", stats.hit_rate * 100.0);

    println!("\n📈 Raw metrics:");
    dump_metrics(&snapshotter);

    println!("\n🛑 Shutting down...");
    users.shutdown().await;
    sessions.shutdown().await;
    println!("   ✅ Shutdown complete!");

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

/// Dump all captured metrics, grouped by kind.
fn dump_metrics(snapshotter: &Snapshotter) {
    let snapshot = snapshotter.snapshot();

    let mut counters: Vec<_> = vec![];
    let mut gauges: Vec<_> = vec![];
    let mut histograms: Vec<_> = vec![];

    for (composite_key, _, _, value) in snapshot.into_vec() {
        let (_kind, key) = composite_key.into_parts();
        let name = key.name();
        let labels: Vec<_> = key
            .labels()
            .map(|l| format!("{}={}", l.key(), l.value()))
            .collect();
        let label_str = if labels.is_empty() {
            String::new()
        } else {
            format!("{{{}}}", labels.join(","))
        };

        match value {
            DebugValue::Counter(v) => counters.push((name.to_string(), label_str, v)),
            DebugValue::Gauge(v) => gauges.push((name.to_string(), label_str, v.into_inner())),
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                let avg = if count > 0 { sum / count as f64 } else { 0.0 };
                histograms.push((name.to_string(), label_str, count, avg));
            }
        }
    }

    counters.sort_by(|a, b| a.0.cmp(&b.0));
    gauges.sort_by(|a, b| a.0.cmp(&b.0));
    histograms.sort_by(|a, b| a.0.cmp(&b.0));

    if !counters.is_empty() {
        println!("   ┌─ Counters (cumulative)");
        for (name, labels, value) in &counters {
            println!("   │  └─ {}{} = {}", name, labels, value);
        }
    }

    if !gauges.is_empty() {
        println!("   ├─ Gauges (current value)");
        for (name, labels, value) in &gauges {
            println!("   │  └─ {}{} = {:.2}", name, labels, value);
        }
    }

    if !histograms.is_empty() {
        println!("   └─ Histograms (distributions)");
        for (name, labels, count, avg) in &histograms {
            println!("   │  └─ {}{} count={} avg={:.4}ms", name, labels, count, avg);
        }
    }

    if counters.is_empty() && gauges.is_empty() && histograms.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
}
