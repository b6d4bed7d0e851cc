use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// A grant of exclusive access to one resource key.
///
/// Leases are immutable once granted; a change of holder is always
/// release-then-claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// Task id or file-path glob this lease covers.
    pub resource_key: String,
    pub holder_agent_id: String,
    pub acquired_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Advisory expiry. An expired lease still blocks claims until it is
    /// swept or released.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Lease {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

impl fmt::Display for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} (acquired {})",
            self.resource_key, self.holder_agent_id, self.acquired_at
        )
    }
}

/// One claimable resource key together with its concrete match set.
///
/// `match_paths` is the key's expansion against the caller's current path
/// universe; the core never touches the filesystem to expand globs. Plain
/// task-id keys carry an empty match set and conflict only on exact
/// equality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimCandidate {
    pub resource_key: String,
    #[serde(default)]
    pub match_paths: Vec<String>,
}

impl ClaimCandidate {
    /// Candidate for a plain task id.
    pub fn task(id: impl Into<String>) -> Self {
        Self {
            resource_key: id.into(),
            match_paths: Vec::new(),
        }
    }

    /// Candidate for a file-path pattern with its pre-expanded match set.
    pub fn paths(pattern: impl Into<String>, match_paths: Vec<String>) -> Self {
        Self {
            resource_key: pattern.into(),
            match_paths,
        }
    }
}

/// A claim attempt over an ordered list of candidate resource keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRequest {
    pub agent_id: String,
    /// Tried strictly in this order; the manager never reorders.
    pub candidates: Vec<ClaimCandidate>,
    /// Label filter the caller applied when selecting candidates; carried
    /// for reporting.
    pub labels: Vec<String>,
    pub reason: Option<String>,
    /// Optional time-to-live recorded as `expires_at` on the granted lease.
    pub ttl: Option<Duration>,
    pub dry_run: bool,
}

impl ClaimRequest {
    pub fn new(agent_id: impl Into<String>, candidates: Vec<ClaimCandidate>) -> Self {
        Self {
            agent_id: agent_id.into(),
            candidates,
            labels: Vec::new(),
            reason: None,
            ttl: None,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }
}

/// Outcome of a claim attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClaimResult {
    Granted { lease: Lease },
    Conflict { existing: Lease },
    NoCandidate,
    Simulated { would_grant: bool, blocking: Option<Lease> },
}

impl ClaimResult {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted { .. })
    }
}

impl fmt::Display for ClaimResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Granted { lease } => write!(
                f,
                "granted {} to {} at {}",
                lease.resource_key, lease.holder_agent_id, lease.acquired_at
            ),
            Self::Conflict { existing } => write!(
                f,
                "conflict: {} held by {} since {}",
                existing.resource_key, existing.holder_agent_id, existing.acquired_at
            ),
            Self::NoCandidate => write!(f, "no eligible resource"),
            Self::Simulated {
                would_grant: true, ..
            } => write!(f, "dry run: claim would be granted"),
            Self::Simulated { blocking, .. } => match blocking {
                Some(lease) => write!(
                    f,
                    "dry run: blocked by {} on {}",
                    lease.holder_agent_id, lease.resource_key
                ),
                None => write!(f, "dry run: claim would be refused"),
            },
        }
    }
}

/// Request to release one lease. Valid only when `agent_id` is the current
/// holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRequest {
    pub agent_id: String,
    pub resource_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ReleaseRequest {
    pub fn new(agent_id: impl Into<String>, resource_key: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            resource_key: resource_key.into(),
            reason: None,
        }
    }
}

/// Outcome of a release attempt. `NotHolder` and `NotFound` are distinct so
/// callers can tell "someone else holds it" from "no one holds it".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReleaseOutcome {
    Released { lease: Lease },
    NotHolder { holder: String },
    NotFound,
}

/// Lifecycle state of a backlog task as reported by the external source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Open,
    InProgress,
    Blocked,
    Closed,
}

/// One claimable unit of work from the external task source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl TaskRecord {
    /// Whether the source considers this task ready for assignment.
    pub fn is_claimable(&self) -> bool {
        matches!(self.status, TaskStatus::Open | TaskStatus::InProgress)
    }

    /// Whether the task carries every requested label.
    pub fn has_labels(&self, wanted: &[String]) -> bool {
        wanted.iter().all(|l| self.labels.contains(l))
    }
}

/// Message importance understood by the agent mail channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailImportance {
    #[default]
    Normal,
    High,
    Urgent,
}

/// Human-readable notification sent after a successful claim. Delivery is
/// fire-and-forget and never affects the claim itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimNotice {
    pub id: Uuid,
    pub from_agent: String,
    pub subject: String,
    pub body: String,
    pub importance: MailImportance,
}

impl ClaimNotice {
    pub fn for_grant(lease: &Lease, task: Option<&TaskRecord>) -> Self {
        let title = task
            .and_then(|t| t.title.as_deref())
            .unwrap_or(lease.resource_key.as_str());
        Self {
            id: Uuid::new_v4(),
            from_agent: lease.holder_agent_id.clone(),
            subject: format!("Claimed {}: {}", lease.resource_key, title),
            body: format!(
                "{} claimed {} at {}.",
                lease.holder_agent_id, lease.resource_key, lease.acquired_at
            ),
            importance: MailImportance::Normal,
        }
    }
}

/// Claim outcome paired with the task record when one was granted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskClaim {
    pub result: ClaimResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskRecord>,
}

/// Snapshot of the backlog and the live leases, for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklogStatus {
    pub ready: Vec<TaskRecord>,
    pub leased: Vec<Lease>,
    /// Ids of ready tasks with no live lease.
    pub available: Vec<String>,
}
