//! Durable lease store: one JSON document guarded by an advisory file lock.
//!
//! Writes go to a temp file and are atomically renamed over the previous
//! copy, so readers always observe a consistent point-in-time state and a
//! crash mid-write leaves the prior durable state intact. All
//! read-modify-write sequences run between `lock()` and guard drop.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use agent_lease_common::{CoordError, Lease, Result, StoreConfig};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

const STORE_FILE: &str = "leases.json";
const LOCK_FILE: &str = "leases.lock";
const TMP_FILE: &str = "leases.json.tmp";

/// Membership set of live leases, keyed by resource key so at most one
/// lease per key can exist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseSet {
    leases: BTreeMap<String, Lease>,
}

/// Outcome of removing a lease from the set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed(Lease),
    NotHolder { holder: String },
    NotFound,
}

impl LeaseSet {
    pub fn len(&self) -> usize {
        self.leases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }

    pub fn get(&self, resource_key: &str) -> Option<&Lease> {
        self.leases.get(resource_key)
    }

    pub fn put(&mut self, lease: Lease) {
        self.leases.insert(lease.resource_key.clone(), lease);
    }

    /// Remove the lease on `resource_key` iff `agent_id` is the holder.
    pub fn remove(&mut self, resource_key: &str, agent_id: &str) -> RemoveOutcome {
        match self.leases.entry(resource_key.to_string()) {
            Entry::Vacant(_) => RemoveOutcome::NotFound,
            Entry::Occupied(entry) if entry.get().holder_agent_id != agent_id => {
                RemoveOutcome::NotHolder {
                    holder: entry.get().holder_agent_id.clone(),
                }
            }
            Entry::Occupied(entry) => RemoveOutcome::Removed(entry.remove()),
        }
    }

    /// Live leases in stable order: `acquired_at` ascending, ties broken by
    /// resource key.
    pub fn list(&self) -> Vec<Lease> {
        let mut leases: Vec<Lease> = self.leases.values().cloned().collect();
        leases.sort_by(|a, b| {
            a.acquired_at
                .cmp(&b.acquired_at)
                .then_with(|| a.resource_key.cmp(&b.resource_key))
        });
        leases
    }
}

/// RAII guard for the store's advisory lock. Dropping it releases the lock,
/// on success and failure paths alike.
#[derive(Debug)]
pub struct StoreGuard {
    file: File,
}

impl Drop for StoreGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Handle on the store's durable location.
#[derive(Debug, Clone)]
pub struct LeaseStore {
    dir: PathBuf,
    lock_timeout: Duration,
    lock_poll_interval: Duration,
}

impl LeaseStore {
    /// Open (creating if needed) the store directory with default lock
    /// timeouts.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::from_config(&StoreConfig {
            dir: dir.into(),
            ..StoreConfig::default()
        })
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.dir)
            .map_err(|e| CoordError::unavailable(format!("creating {}", config.dir.display()), e))?;
        Ok(Self {
            dir: config.dir.clone(),
            lock_timeout: Duration::from_millis(config.lock_timeout_ms),
            lock_poll_interval: Duration::from_millis(config.lock_poll_interval_ms.max(1)),
        })
    }

    pub fn store_path(&self) -> PathBuf {
        self.dir.join(STORE_FILE)
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    /// Consistent point-in-time read. Never takes the mutation lock: the
    /// atomic-rename write discipline means the durable file is always a
    /// complete document. A missing file is an empty store; an unparseable
    /// file is `Corrupted` and is left untouched for manual inspection.
    pub fn snapshot(&self) -> Result<LeaseSet> {
        let path = self.store_path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(LeaseSet::default()),
            Err(e) => {
                return Err(CoordError::unavailable(
                    format!("reading {}", path.display()),
                    e,
                ))
            }
        };
        serde_json::from_slice(&bytes).map_err(|e| CoordError::Corrupted {
            path,
            detail: e.to_string(),
        })
    }

    /// Acquire the exclusive advisory lock, polling up to the configured
    /// timeout before failing with `StoreBusy`.
    pub fn lock(&self) -> Result<StoreGuard> {
        let path = self.lock_path();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(|e| CoordError::unavailable(format!("opening {}", path.display()), e))?;

        let contended = fs2::lock_contended_error();
        let start = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(StoreGuard { file }),
                Err(e) if e.raw_os_error() == contended.raw_os_error() => {
                    if start.elapsed() >= self.lock_timeout {
                        return Err(CoordError::StoreBusy {
                            path,
                            waited_ms: self.lock_timeout.as_millis() as u64,
                        });
                    }
                    std::thread::sleep(self.lock_poll_interval);
                }
                Err(e) => {
                    return Err(CoordError::unavailable(
                        format!("locking {}", path.display()),
                        e,
                    ))
                }
            }
        }
    }

    /// Durably replace the store contents. Requires the lock guard so every
    /// flush sits inside a read-modify-write sequence.
    pub fn flush(&self, _guard: &StoreGuard, set: &LeaseSet) -> Result<()> {
        let tmp = self.dir.join(TMP_FILE);
        let data = serde_json::to_vec_pretty(set).map_err(|e| {
            CoordError::unavailable("serializing lease set", io::Error::new(io::ErrorKind::Other, e))
        })?;
        write_all_synced(&tmp, &data)?;
        fs::rename(&tmp, self.store_path()).map_err(|e| {
            CoordError::unavailable(format!("replacing {}", self.store_path().display()), e)
        })
    }
}

fn write_all_synced(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = File::create(path)
        .map_err(|e| CoordError::unavailable(format!("creating {}", path.display()), e))?;
    file.write_all(data)
        .map_err(|e| CoordError::unavailable(format!("writing {}", path.display()), e))?;
    file.sync_all()
        .map_err(|e| CoordError::unavailable(format!("syncing {}", path.display()), e))
}
