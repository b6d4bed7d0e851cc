//! Lease manager: claim, release, and list operations over the durable
//! store. Owns the store exclusively; every mutation runs inside one
//! lock/flush sequence so partial application is impossible.

use agent_lease_common::{
    ClaimRequest, ClaimResult, CoordError, Lease, ReleaseOutcome, ReleaseRequest, Result,
    StoreConfig,
};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::conflict::{self, Detection};
use crate::store::{LeaseStore, RemoveOutcome};

pub struct LeaseManager {
    store: LeaseStore,
}

impl LeaseManager {
    pub fn new(store: LeaseStore) -> Self {
        Self { store }
    }

    pub fn open(dir: impl Into<std::path::PathBuf>) -> Result<Self> {
        Ok(Self::new(LeaseStore::open(dir)?))
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        Ok(Self::new(LeaseStore::from_config(config)?))
    }

    /// Attempt to claim the first unconflicted candidate, in the exact
    /// order the caller supplied. Dry-run performs identical detection
    /// against a lock-free snapshot and never mutates the store.
    pub fn claim(&self, request: &ClaimRequest) -> Result<ClaimResult> {
        validate_claim(request)?;
        if request.candidates.is_empty() {
            return Ok(ClaimResult::NoCandidate);
        }

        if request.dry_run {
            let set = self.store.snapshot()?;
            let mut blocking = None;
            for candidate in &request.candidates {
                match conflict::detect(&set, candidate)? {
                    Detection::NoConflict => {
                        debug!(agent = %request.agent_id, key = %candidate.resource_key,
                               "dry run: claim would be granted");
                        return Ok(ClaimResult::Simulated {
                            would_grant: true,
                            blocking: None,
                        });
                    }
                    Detection::ConflictWith(lease) => {
                        blocking.get_or_insert(lease);
                    }
                }
            }
            return Ok(ClaimResult::Simulated {
                would_grant: false,
                blocking,
            });
        }

        let guard = self.store.lock()?;
        let mut set = self.store.snapshot()?;
        let mut first_conflict = None;
        for candidate in &request.candidates {
            match conflict::detect(&set, candidate)? {
                Detection::ConflictWith(lease) => {
                    first_conflict.get_or_insert(lease);
                }
                Detection::NoConflict => {
                    let lease = build_lease(request, &candidate.resource_key)?;
                    set.put(lease.clone());
                    self.store.flush(&guard, &set)?;
                    info!(agent = %lease.holder_agent_id, key = %lease.resource_key,
                          "lease granted");
                    return Ok(ClaimResult::Granted { lease });
                }
            }
        }
        drop(guard);

        match first_conflict {
            Some(existing) => {
                debug!(agent = %request.agent_id, holder = %existing.holder_agent_id,
                       key = %existing.resource_key, "claim blocked by existing lease");
                Ok(ClaimResult::Conflict { existing })
            }
            // Candidates were non-empty, so each one either granted or
            // conflicted.
            None => Ok(ClaimResult::NoCandidate),
        }
    }

    /// Release one lease. Never transfers ownership: a request from a
    /// non-holder leaves the lease in place and reports `NotHolder`.
    pub fn release(&self, request: &ReleaseRequest) -> Result<ReleaseOutcome> {
        if request.agent_id.trim().is_empty() {
            return Err(CoordError::InvalidRequest(
                "agent id must not be empty".to_string(),
            ));
        }
        if request.resource_key.trim().is_empty() {
            return Err(CoordError::InvalidRequest(
                "resource key must not be empty".to_string(),
            ));
        }

        let guard = self.store.lock()?;
        let mut set = self.store.snapshot()?;
        match set.remove(&request.resource_key, &request.agent_id) {
            RemoveOutcome::Removed(lease) => {
                self.store.flush(&guard, &set)?;
                info!(agent = %request.agent_id, key = %request.resource_key,
                      reason = request.reason.as_deref().unwrap_or(""), "lease released");
                Ok(ReleaseOutcome::Released { lease })
            }
            RemoveOutcome::NotHolder { holder } => {
                warn!(agent = %request.agent_id, holder = %holder,
                      key = %request.resource_key, "refused release: not the holder");
                Ok(ReleaseOutcome::NotHolder { holder })
            }
            RemoveOutcome::NotFound => Ok(ReleaseOutcome::NotFound),
        }
    }

    /// Release every lease held by `agent_id`, returning the released keys
    /// in stable order. Used for crash/timeout cleanup; an agent holding
    /// nothing yields an empty list, not an error.
    pub fn release_all(&self, agent_id: &str) -> Result<Vec<String>> {
        if agent_id.trim().is_empty() {
            return Err(CoordError::InvalidRequest(
                "agent id must not be empty".to_string(),
            ));
        }

        let guard = self.store.lock()?;
        let mut set = self.store.snapshot()?;
        let keys: Vec<String> = set
            .list()
            .into_iter()
            .filter(|l| l.holder_agent_id == agent_id)
            .map(|l| l.resource_key)
            .collect();
        if keys.is_empty() {
            return Ok(keys);
        }
        for key in &keys {
            set.remove(key, agent_id);
        }
        self.store.flush(&guard, &set)?;
        info!(agent = %agent_id, count = keys.len(), "released all leases for agent");
        Ok(keys)
    }

    /// Remove leases whose `expires_at` has passed. The policy of when to
    /// sweep belongs to the calling layer.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let guard = self.store.lock()?;
        let mut set = self.store.snapshot()?;
        let expired: Vec<Lease> = set
            .list()
            .into_iter()
            .filter(|l| l.is_expired(now))
            .collect();
        if expired.is_empty() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::with_capacity(expired.len());
        for lease in expired {
            set.remove(&lease.resource_key, &lease.holder_agent_id);
            info!(agent = %lease.holder_agent_id, key = %lease.resource_key,
                  "swept expired lease");
            keys.push(lease.resource_key);
        }
        self.store.flush(&guard, &set)?;
        Ok(keys)
    }

    /// Read-only snapshot of live leases, optionally filtered by holder.
    pub fn list_leases(&self, filter_agent: Option<&str>) -> Result<Vec<Lease>> {
        let set = self.store.snapshot()?;
        Ok(set
            .list()
            .into_iter()
            .filter(|l| filter_agent.map_or(true, |a| l.holder_agent_id == a))
            .collect())
    }
}

fn validate_claim(request: &ClaimRequest) -> Result<()> {
    if request.agent_id.trim().is_empty() {
        return Err(CoordError::InvalidRequest(
            "agent id must not be empty".to_string(),
        ));
    }
    for candidate in &request.candidates {
        if candidate.resource_key.trim().is_empty() {
            return Err(CoordError::InvalidRequest(
                "resource key must not be empty".to_string(),
            ));
        }
        if !candidate.match_paths.is_empty() {
            conflict::ensure_pattern(&candidate.resource_key)?;
        }
    }
    if let Some(ttl) = request.ttl {
        chrono::Duration::from_std(ttl)
            .map_err(|e| CoordError::InvalidRequest(format!("ttl out of range: {e}")))?;
    }
    Ok(())
}

fn build_lease(request: &ClaimRequest, resource_key: &str) -> Result<Lease> {
    let acquired_at = Utc::now();
    let expires_at = match request.ttl {
        None => None,
        Some(ttl) => {
            let ttl = chrono::Duration::from_std(ttl)
                .map_err(|e| CoordError::InvalidRequest(format!("ttl out of range: {e}")))?;
            Some(acquired_at + ttl)
        }
    };
    Ok(Lease {
        resource_key: resource_key.to_string(),
        holder_agent_id: request.agent_id.clone(),
        acquired_at,
        reason: request.reason.clone(),
        expires_at,
    })
}
