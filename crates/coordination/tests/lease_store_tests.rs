//! Tests for the durable lease store: snapshot consistency, crash safety,
//! advisory locking, and corruption handling.

mod common;

use std::fs;

use agent_lease_common::{ClaimCandidate, ClaimRequest, CoordError, Lease, StoreConfig};
use agent_lease_coordination::{LeaseManager, LeaseSet, LeaseStore, RemoveOutcome};
use chrono::{TimeZone, Utc};
use common::{create_test_manager, init_test_logging, test_store_config};
use tempfile::TempDir;

fn lease(key: &str, holder: &str, at_secs: i64) -> Lease {
    Lease {
        resource_key: key.to_string(),
        holder_agent_id: holder.to_string(),
        acquired_at: Utc.timestamp_opt(at_secs, 0).unwrap(),
        reason: None,
        expires_at: None,
    }
}

// ============================================================================
// LeaseSet membership and ordering
// ============================================================================

#[test]
fn test_list_orders_by_acquired_at_then_key() {
    let mut set = LeaseSet::default();
    set.put(lease("b", "a1", 20));
    set.put(lease("a", "a1", 20));
    set.put(lease("c", "a2", 10));

    let keys: Vec<String> = set.list().into_iter().map(|l| l.resource_key).collect();
    assert_eq!(keys, vec!["c", "a", "b"]);
}

#[test]
fn test_remove_distinguishes_not_holder_from_not_found() {
    let mut set = LeaseSet::default();
    set.put(lease("T1", "a1", 0));

    assert!(matches!(
        set.remove("T1", "a2"),
        RemoveOutcome::NotHolder { holder } if holder == "a1"
    ));
    // Refusal leaves the lease in place.
    assert_eq!(set.get("T1").unwrap().holder_agent_id, "a1");

    assert!(matches!(set.remove("T1", "a1"), RemoveOutcome::Removed(_)));
    assert!(matches!(set.remove("T1", "a1"), RemoveOutcome::NotFound));
}

// ============================================================================
// Durable snapshots
// ============================================================================

#[test]
fn test_snapshot_of_missing_file_is_empty() {
    init_test_logging();
    let dir = TempDir::new().unwrap();
    let store = LeaseStore::from_config(&test_store_config(&dir)).unwrap();

    assert!(store.snapshot().unwrap().is_empty());
}

#[test]
fn test_flush_then_snapshot_round_trips() {
    init_test_logging();
    let dir = TempDir::new().unwrap();
    let store = LeaseStore::from_config(&test_store_config(&dir)).unwrap();

    let mut set = LeaseSet::default();
    set.put(lease("T1", "a1", 0));
    let guard = store.lock().unwrap();
    store.flush(&guard, &set).unwrap();
    drop(guard);

    let reloaded = store.snapshot().unwrap();
    assert_eq!(reloaded, set);
    // The temp file never survives a successful flush.
    assert!(!dir.path().join("leases.json.tmp").exists());
}

#[test]
fn test_interrupted_write_leaves_prior_state_intact() {
    init_test_logging();
    let dir = TempDir::new().unwrap();
    let manager = create_test_manager(&dir);

    let request = ClaimRequest::new("a1", vec![ClaimCandidate::task("T1")]);
    assert!(manager.claim(&request).unwrap().is_granted());
    let before = fs::read(dir.path().join("leases.json")).unwrap();

    // Simulate a crash mid-write: the new state reached the temp location
    // but the atomic rename never happened.
    fs::write(dir.path().join("leases.json.tmp"), b"{\"leases\":{").unwrap();

    let store = LeaseStore::from_config(&test_store_config(&dir)).unwrap();
    let recovered = store.snapshot().unwrap();
    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered.get("T1").unwrap().holder_agent_id, "a1");
    assert_eq!(fs::read(dir.path().join("leases.json")).unwrap(), before);

    // The next mutation simply overwrites the stale temp file.
    let request = ClaimRequest::new("a1", vec![ClaimCandidate::task("T2")]);
    assert!(manager.claim(&request).unwrap().is_granted());
    assert_eq!(store.snapshot().unwrap().len(), 2);
}

// ============================================================================
// Corruption
// ============================================================================

#[test]
fn test_corrupted_store_refuses_to_operate_and_is_left_untouched() {
    init_test_logging();
    let dir = TempDir::new().unwrap();
    let manager = create_test_manager(&dir);
    fs::write(dir.path().join("leases.json"), b"not json at all").unwrap();

    let request = ClaimRequest::new("a1", vec![ClaimCandidate::task("T1")]);
    assert!(matches!(
        manager.claim(&request),
        Err(CoordError::Corrupted { .. })
    ));
    assert!(matches!(
        manager.list_leases(None),
        Err(CoordError::Corrupted { .. })
    ));

    // The corrupted file stays as-is for manual inspection.
    assert_eq!(
        fs::read(dir.path().join("leases.json")).unwrap(),
        b"not json at all"
    );
}

// ============================================================================
// Advisory lock
// ============================================================================

#[test]
fn test_lock_times_out_with_store_busy_while_held() {
    init_test_logging();
    let dir = TempDir::new().unwrap();
    let holder = LeaseStore::from_config(&test_store_config(&dir)).unwrap();
    let _guard = holder.lock().unwrap();

    let contender = LeaseStore::from_config(&StoreConfig {
        dir: dir.path().to_path_buf(),
        lock_timeout_ms: 100,
        lock_poll_interval_ms: 5,
    })
    .unwrap();
    assert!(matches!(
        contender.lock(),
        Err(CoordError::StoreBusy { waited_ms: 100, .. })
    ));
}

#[test]
fn test_claim_surfaces_store_busy_instead_of_hanging() {
    init_test_logging();
    let dir = TempDir::new().unwrap();
    let holder = LeaseStore::from_config(&test_store_config(&dir)).unwrap();
    let _guard = holder.lock().unwrap();

    let manager = LeaseManager::from_config(&StoreConfig {
        dir: dir.path().to_path_buf(),
        lock_timeout_ms: 100,
        lock_poll_interval_ms: 5,
    })
    .unwrap();
    let request = ClaimRequest::new("a1", vec![ClaimCandidate::task("T1")]);
    assert!(matches!(
        manager.claim(&request),
        Err(CoordError::StoreBusy { .. })
    ));

    // Dry-run never touches the mutation lock.
    let request = ClaimRequest::new("a1", vec![ClaimCandidate::task("T1")]).dry_run();
    assert!(matches!(
        manager.claim(&request).unwrap(),
        agent_lease_common::ClaimResult::Simulated {
            would_grant: true,
            ..
        }
    ));
}

#[test]
fn test_lock_is_released_on_guard_drop() {
    init_test_logging();
    let dir = TempDir::new().unwrap();
    let store = LeaseStore::from_config(&test_store_config(&dir)).unwrap();

    drop(store.lock().unwrap());
    // Immediately lockable again.
    drop(store.lock().unwrap());
}
