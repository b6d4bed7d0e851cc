//! Conflict detection between a proposed claim and the live lease set.
//!
//! Pure and deterministic so dry-run and real claims exercise identical
//! logic. Glob overlap is decided by concrete path-set intersection: the
//! candidate carries its own match set (expanded by the caller against the
//! current path universe) and each stored key is compiled as a glob and
//! tested against that set. No filesystem access happens here.

use agent_lease_common::{ClaimCandidate, CoordError, Lease, Result};
use globset::{GlobBuilder, GlobMatcher};

use crate::store::LeaseSet;

/// Result of checking one candidate against the lease set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    NoConflict,
    ConflictWith(Lease),
}

/// Check `candidate` against every live lease, in the set's stable order,
/// so the first blocking lease is deterministic for identical inputs.
pub fn detect(set: &LeaseSet, candidate: &ClaimCandidate) -> Result<Detection> {
    // A candidate pattern that does not compile is the caller's mistake and
    // must surface before any lease can be granted on it.
    if !candidate.match_paths.is_empty() {
        ensure_pattern(&candidate.resource_key)?;
    }

    for lease in set.list() {
        if lease.resource_key == candidate.resource_key {
            return Ok(Detection::ConflictWith(lease));
        }
        if candidate.match_paths.is_empty() {
            continue;
        }
        // A stored key that no longer compiles falls back to the equality
        // rule above instead of failing every future claim.
        if let Ok(matcher) = compile(&lease.resource_key) {
            if candidate.match_paths.iter().any(|p| matcher.is_match(p)) {
                return Ok(Detection::ConflictWith(lease));
            }
        }
    }
    Ok(Detection::NoConflict)
}

/// Validate that a resource key is usable as a path pattern.
pub(crate) fn ensure_pattern(resource_key: &str) -> Result<()> {
    compile(resource_key).map(|_| ())
}

fn compile(pattern: &str) -> Result<GlobMatcher> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|e| CoordError::InvalidRequest(format!("invalid resource pattern {pattern:?}: {e}")))
}
