//! Shared helpers for coordination integration tests

use std::sync::Once;

use agent_lease_common::{StoreConfig, TaskRecord, TaskStatus};
use agent_lease_coordination::LeaseManager;
use tempfile::TempDir;

static INIT: Once = Once::new();

/// Initialize logging for tests
pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Store config pointing at a temp directory, with short lock timeouts so
/// contention tests finish quickly.
pub fn test_store_config(dir: &TempDir) -> StoreConfig {
    StoreConfig {
        dir: dir.path().to_path_buf(),
        lock_timeout_ms: 2_000,
        lock_poll_interval_ms: 5,
    }
}

pub fn create_test_manager(dir: &TempDir) -> LeaseManager {
    LeaseManager::from_config(&test_store_config(dir)).expect("failed to open lease manager")
}

pub fn open_task(id: &str) -> TaskRecord {
    TaskRecord {
        id: id.to_string(),
        title: Some(format!("task {id}")),
        status: TaskStatus::Open,
        labels: Vec::new(),
    }
}

pub fn labeled_task(id: &str, labels: &[&str]) -> TaskRecord {
    TaskRecord {
        labels: labels.iter().map(|l| l.to_string()).collect(),
        ..open_task(id)
    }
}
