//! Integration Tests for KV Repo
//!
//! This module contains all integration tests that require a real Redis.
//! Tests use testcontainers for portability - no external docker-compose required.
//!
//! # Running Tests
//! ```bash
//! # Run all integration tests (requires Docker)
//! cargo test --test integration -- --ignored
//!
//! # Run only happy-path tests
//! cargo test --test integration happy -- --ignored
//!
//! # Run only failure scenario tests
//! cargo test --test integration failure -- --ignored
//! ```
//!
//! # Test Organization
//! - `happy_*` - Normal operation: write-through, indexes, expiration, db allocation
//! - `failure_*` - Failure scenarios: dead server at startup, server death mid-operation
//! - `coverage_*` - Edge paths: consistency sweep, batch merge

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kv_repo::{Manager, RepoConfig, RepoError, Repository};

use testcontainers::{clients::Cli, core::WaitFor, Container, GenericImage};

// =============================================================================
// Container Helpers
// =============================================================================

/// Create a Redis container with health check
fn redis_container(docker: &Cli) -> Container<'_, GenericImage> {
    let image = GenericImage::new("redis", "7-alpine")
        .with_exposed_port(6379)
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"));
    docker.run(image)
}

/// Config pointed at the container, with a fast startup cadence so failure
/// tests do not sit through the production ten-second dial loop
fn config_for(port: u16) -> RepoConfig {
    RepoConfig {
        redis_url: format!("redis://127.0.0.1:{port}"),
        connect_retries: 3,
        connect_backoff_ms: 200,
        ..Default::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Note {
    id: Uuid,
    title: String,
}

fn note(title: &str) -> (Uuid, Note) {
    let id = Uuid::new_v4();
    (
        id,
        Note {
            id,
            title: title.to_string(),
        },
    )
}

// =============================================================================
// Happy Path Tests - Normal Operation
// =============================================================================

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_save_get_roundtrip() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);

    let manager = Manager::connect(config_for(port)).await.expect("connect");
    let notes: Repository<Note, Uuid> = manager.load_repo("notes");

    let (id, entity) = note("first");
    notes.save(&id, &entity).await.expect("save");
    assert_eq!(notes.get(&id).await.expect("get"), entity);

    // A second manager with a cold cache proves the write was durable,
    // not just a cache artifact
    let other = Manager::connect(config_for(port)).await.expect("connect");
    let cold: Repository<Note, Uuid> = other.load_repo("notes");
    assert_eq!(cold.get(&id).await.expect("cold get"), entity);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_read_through_populates_cache() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);

    let writer = Manager::connect(config_for(port)).await.expect("connect");
    let reader = Manager::connect(config_for(port)).await.expect("connect");

    let notes_w: Repository<Note, Uuid> = writer.load_repo("notes");
    let notes_r: Repository<Note, Uuid> = reader.load_repo("notes");

    let (id, entity) = note("shared");
    notes_w.save(&id, &entity).await.expect("save");

    // First read misses and populates, second is served locally
    assert_eq!(notes_r.get(&id).await.expect("first get"), entity);
    assert_eq!(notes_r.get(&id).await.expect("second get"), entity);

    let stats = notes_r.cache_stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_get_all_merges_cached_and_uncached() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);

    let local = Manager::connect(config_for(port)).await.expect("connect");
    let remote = Manager::connect(config_for(port)).await.expect("connect");

    let notes: Repository<Note, Uuid> = local.load_repo("notes");
    let foreign: Repository<Note, Uuid> = remote.load_repo("notes");

    let mut titles = Vec::new();
    for title in ["a", "b", "c"] {
        let (id, entity) = note(title);
        notes.save(&id, &entity).await.expect("save");
        titles.push(entity.title);
    }
    // Written by another process: in the store, not in our cache
    for title in ["d", "e"] {
        let (id, entity) = note(title);
        foreign.save(&id, &entity).await.expect("save");
        titles.push(entity.title);
    }

    let mut fetched: Vec<String> = notes
        .get_all()
        .await
        .expect("get_all")
        .into_iter()
        .map(|n| n.title)
        .collect();
    fetched.sort();
    titles.sort();
    assert_eq!(fetched, titles);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_list_and_delete() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);

    let manager = Manager::connect(config_for(port)).await.expect("connect");
    let notes: Repository<Note, Uuid> = manager.load_repo("notes");

    let mut ids = Vec::new();
    for title in ["a", "b", "c"] {
        let (id, entity) = note(title);
        notes.save(&id, &entity).await.expect("save");
        ids.push(id);
    }

    let mut listed = notes.list().await.expect("list");
    listed.sort();
    ids.sort();
    assert_eq!(listed, ids);

    notes.delete(&ids[0]).await.expect("delete");
    assert_eq!(notes.list().await.expect("list").len(), 2);
    assert!(matches!(
        notes.get(&ids[0]).await,
        Err(RepoError::NotFound { .. })
    ));

    // Deleting again is not an error
    notes.delete(&ids[0]).await.expect("repeat delete");
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_index_protocol() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);

    let manager = Manager::connect(config_for(port)).await.expect("connect");
    let notes: Repository<Note, Uuid> = manager.load_repo("notes");

    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    // Missing index reads as empty
    assert!(notes.get_index("starred").await.expect("empty").is_empty());

    notes.add_to_index("starred", &first).await.expect("add");
    notes.add_to_index("starred", &second).await.expect("add");
    // Repeated add is a no-op, not a duplicate
    notes.add_to_index("starred", &first).await.expect("re-add");
    assert_eq!(
        notes.get_index("starred").await.expect("get"),
        vec![first, second]
    );

    // Removing a non-member changes nothing
    notes
        .remove_from_index("starred", &Uuid::new_v4())
        .await
        .expect("remove absent");
    assert_eq!(
        notes.get_index("starred").await.expect("get"),
        vec![first, second]
    );

    notes
        .remove_from_index("starred", &first)
        .await
        .expect("remove");
    assert_eq!(notes.get_index("starred").await.expect("get"), vec![second]);

    notes.clear_index("starred").await.expect("clear");
    assert!(notes.get_index("starred").await.expect("cleared").is_empty());
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_cache_expiration_after_idle() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);

    let manager = Manager::connect(config_for(port)).await.expect("connect");
    let sessions: Repository<Note, Uuid> =
        manager.load_repo_with_expiration("sessions", Duration::from_secs(1));

    let (id, entity) = note("idle");
    sessions.save(&id, &entity).await.expect("save");

    // Idle for twice the expiration, plus slack so the sweep tick at the
    // two-second mark has definitely run
    tokio::time::sleep(Duration::from_millis(2500)).await;

    let stats = sessions.cache_stats();
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.entries, 0);

    assert_eq!(sessions.get(&id).await.expect("read through"), entity);
    assert_eq!(sessions.cache_stats().misses, 1);

    sessions.shutdown().await;
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_save_with_expiration_expires_in_store() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);

    let writer = Manager::connect(config_for(port)).await.expect("connect");
    let reader = Manager::connect(config_for(port)).await.expect("connect");

    let notes_w: Repository<Note, Uuid> = writer.load_repo("notes");
    let notes_r: Repository<Note, Uuid> = reader.load_repo("notes");

    let (id, entity) = note("fleeting");
    notes_w
        .save_with_expiration(&id, &entity, Duration::from_secs(1))
        .await
        .expect("save");

    // Visible to a cold reader before the TTL lapses
    assert_eq!(notes_r.get(&id).await.expect("get"), entity);

    tokio::time::sleep(Duration::from_millis(1500)).await;

    // Gone from the store; the writer's own cached copy lingers until
    // cache expiration is armed
    let cold = Manager::connect(config_for(port)).await.expect("connect");
    let notes_c: Repository<Note, Uuid> = cold.load_repo("notes");
    assert!(matches!(
        notes_c.get(&id).await,
        Err(RepoError::NotFound { .. })
    ));
    assert_eq!(notes_w.get(&id).await.expect("cached copy"), entity);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_db_repo_gets_its_own_database() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);

    let manager = Manager::connect(config_for(port)).await.expect("connect");

    let tenants: Repository<Note, Uuid> =
        manager.load_db_repo("tenants").await.expect("load db repo");
    let (id, entity) = note("isolated");
    tenants.save(&id, &entity).await.expect("save");
    assert_eq!(tenants.get(&id).await.expect("get"), entity);

    // The entity lives in the allocated database, not the primary one
    let primary_keys = manager
        .store()
        .keys("tenants_")
        .await
        .expect("keys on primary");
    assert!(primary_keys.is_empty());

    // The registry does live in the primary database
    assert!(manager
        .store()
        .get("databases")
        .await
        .expect("registry read")
        .is_some());

    // Loading the same name again lands in the same database
    let again: Repository<Note, Uuid> =
        manager.load_db_repo("tenants").await.expect("reload");
    assert_eq!(again.get(&id).await.expect("get via second handle"), entity);
}

// =============================================================================
// Failure Scenario Tests - Resilience & Recovery
// =============================================================================

#[tokio::test]
#[ignore] // Requires Docker
async fn failure_connect_to_dead_server_fails_bounded() {
    // Nothing listens on this port; the dial loop must give up on its own
    let config = RepoConfig {
        redis_url: "redis://127.0.0.1:59999".to_string(),
        connect_retries: 2,
        connect_backoff_ms: 100,
        ..Default::default()
    };

    let result = tokio::time::timeout(Duration::from_secs(10), Manager::connect(config)).await;

    match result {
        Ok(Err(e)) => println!("connect failed as expected: {e}"),
        Ok(Ok(_)) => panic!("connected to a port nothing listens on"),
        Err(_) => panic!("dial loop did not terminate within its bounds"),
    }
}

#[tokio::test]
#[ignore] // Requires Docker
async fn failure_server_death_keeps_cache_readable() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);

    let manager = Manager::connect(config_for(port)).await.expect("connect");
    let notes: Repository<Note, Uuid> = manager.load_repo("notes");

    let (id, entity) = note("survivor");
    notes.save(&id, &entity).await.expect("save");

    // Kill Redis!
    drop(redis);
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The cached entity is still served locally
    assert_eq!(notes.get(&id).await.expect("cached get"), entity);

    // Anything that needs the store surfaces an error instead of hanging
    let (other_id, other) = note("unreachable");
    assert!(matches!(
        notes.save(&other_id, &other).await,
        Err(RepoError::Store(_))
    ));
    assert!(matches!(
        notes.get(&other_id).await,
        Err(RepoError::Store(_))
    ));

    // The failed save must not have seeded the cache
    assert!(notes.get(&other_id).await.is_err());
}

// =============================================================================
// Coverage Tests - Consistency Sweep
// =============================================================================

#[tokio::test]
#[ignore] // Requires Docker
async fn coverage_cleanup_invalid_keys() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);

    let manager = Manager::connect(config_for(port)).await.expect("connect");
    let notes: Repository<Note, Uuid> = manager.load_repo("notes");

    let (id, entity) = note("legit");
    notes.save(&id, &entity).await.expect("save");
    notes.add_to_index("starred", &id).await.expect("index");

    // A record whose payload belongs to some other id
    let store = manager.store();
    let (_, stray) = note("stray");
    store
        .set(
            &format!("notes_{}", Uuid::new_v4()),
            &serde_json::to_vec(&stray).expect("encode"),
            None,
        )
        .await
        .expect("seed stray");

    let removed = notes.cleanup_invalid_keys().await.expect("cleanup");
    assert_eq!(removed, 1);

    // The legitimate entity and the index both survive
    assert_eq!(notes.get(&id).await.expect("get"), entity);
    assert_eq!(notes.get_index("starred").await.expect("index"), vec![id]);
    assert_eq!(notes.list().await.expect("list"), vec![id]);
}
