//! Structured and human-readable reporting of claim outcomes, plus the
//! exit-status taxonomy the command-line layer maps onto.

use agent_lease_common::{ClaimResult, CoordError, ReleaseOutcome, TaskClaim};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Machine-parseable record of a claim outcome.
#[derive(Debug, Clone, Serialize)]
pub struct ClaimReport {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holder_agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquired_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub would_grant: Option<bool>,
    /// Human-readable one-line summary of the same outcome.
    pub summary: String,
}

impl ClaimReport {
    pub fn from_result(result: &ClaimResult) -> Self {
        let summary = result.to_string();
        match result {
            ClaimResult::Granted { lease } => Self {
                outcome: "granted",
                resource_key: Some(lease.resource_key.clone()),
                holder_agent_id: Some(lease.holder_agent_id.clone()),
                acquired_at: Some(lease.acquired_at),
                task_id: None,
                would_grant: None,
                summary,
            },
            ClaimResult::Conflict { existing } => Self {
                outcome: "conflict",
                resource_key: Some(existing.resource_key.clone()),
                holder_agent_id: Some(existing.holder_agent_id.clone()),
                acquired_at: Some(existing.acquired_at),
                task_id: None,
                would_grant: None,
                summary,
            },
            ClaimResult::NoCandidate => Self {
                outcome: "no_candidate",
                resource_key: None,
                holder_agent_id: None,
                acquired_at: None,
                task_id: None,
                would_grant: None,
                summary,
            },
            ClaimResult::Simulated {
                would_grant,
                blocking,
            } => Self {
                outcome: "simulated",
                resource_key: blocking.as_ref().map(|l| l.resource_key.clone()),
                holder_agent_id: blocking.as_ref().map(|l| l.holder_agent_id.clone()),
                acquired_at: blocking.as_ref().map(|l| l.acquired_at),
                task_id: None,
                would_grant: Some(*would_grant),
                summary,
            },
        }
    }

    pub fn from_task_claim(claim: &TaskClaim) -> Self {
        let mut report = Self::from_result(&claim.result);
        report.task_id = claim.task.as_ref().map(|t| t.id.clone());
        report
    }
}

impl fmt::Display for ClaimReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary)
    }
}

/// Process exit taxonomy expected by the calling CLI layer. Every core
/// outcome maps onto exactly one of these without collapsing kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Failure,
    InvalidInput,
    NoCandidate,
    Conflict,
}

impl ExitStatus {
    pub const fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::InvalidInput => 2,
            Self::NoCandidate => 3,
            Self::Conflict => 4,
        }
    }
}

impl From<&ClaimResult> for ExitStatus {
    fn from(result: &ClaimResult) -> Self {
        match result {
            ClaimResult::Granted { .. } => Self::Success,
            ClaimResult::Conflict { .. } => Self::Conflict,
            ClaimResult::NoCandidate => Self::NoCandidate,
            ClaimResult::Simulated { would_grant, .. } => {
                if *would_grant {
                    Self::Success
                } else {
                    Self::Conflict
                }
            }
        }
    }
}

impl From<&ReleaseOutcome> for ExitStatus {
    fn from(outcome: &ReleaseOutcome) -> Self {
        match outcome {
            ReleaseOutcome::Released { .. } => Self::Success,
            ReleaseOutcome::NotHolder { .. } => Self::Conflict,
            ReleaseOutcome::NotFound => Self::Failure,
        }
    }
}

impl From<&CoordError> for ExitStatus {
    fn from(error: &CoordError) -> Self {
        match error {
            CoordError::InvalidRequest(_) | CoordError::Config(_) => Self::InvalidInput,
            _ => Self::Failure,
        }
    }
}
