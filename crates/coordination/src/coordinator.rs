//! Composition of the lease manager with the external task source and the
//! agent mail channel. Selection is strict first-fit over the source's
//! natural priority order; retry/backoff policy belongs to the caller.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use agent_lease_common::{
    BacklogStatus, ClaimCandidate, ClaimNotice, ClaimRequest, ClaimResult, CoordError, Lease,
    Result, TaskClaim, TaskRecord,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::manager::LeaseManager;

/// External backlog supplying claimable tasks in priority order.
#[async_trait]
pub trait TaskSource: Send + Sync {
    async fn ready_tasks(&self) -> Result<Vec<TaskRecord>>;
}

/// External notification channel. Human-readable only; delivery failures
/// never affect claim correctness.
#[async_trait]
pub trait AgentMail: Send + Sync {
    async fn send(&self, notice: &ClaimNotice) -> Result<()>;
}

pub struct Coordinator {
    manager: LeaseManager,
    source: Arc<dyn TaskSource>,
    mail: Option<Arc<dyn AgentMail>>,
    default_ttl: Option<Duration>,
}

impl Coordinator {
    pub fn new(manager: LeaseManager, source: Arc<dyn TaskSource>) -> Self {
        Self {
            manager,
            source,
            mail: None,
            default_ttl: None,
        }
    }

    pub fn with_mail(mut self, mail: Arc<dyn AgentMail>) -> Self {
        self.mail = Some(mail);
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    pub fn manager(&self) -> &LeaseManager {
        &self.manager
    }

    /// Claim the first eligible task from the backlog for `agent_id`.
    ///
    /// Eligible means: claimable status, carries every requested label, and
    /// not already leased (a snapshot pre-filter; the claim itself
    /// re-checks under the store lock). On `Granted` the task record is
    /// attached and the mail channel is notified fire-and-forget.
    pub async fn claim_next_task(
        &self,
        agent_id: &str,
        label_filters: &[String],
        dry_run: bool,
    ) -> Result<TaskClaim> {
        if agent_id.trim().is_empty() {
            return Err(CoordError::InvalidRequest(
                "agent id must not be empty".to_string(),
            ));
        }

        let tasks = self.source.ready_tasks().await?;
        let held: HashSet<String> = self
            .manager
            .list_leases(None)?
            .into_iter()
            .map(|l| l.resource_key)
            .collect();
        let eligible: Vec<TaskRecord> = tasks
            .into_iter()
            .filter(|t| t.is_claimable())
            .filter(|t| t.has_labels(label_filters))
            .filter(|t| !held.contains(&t.id))
            .collect();
        debug!(agent = %agent_id, candidates = eligible.len(), "selecting from backlog");

        let mut request = ClaimRequest::new(
            agent_id,
            eligible
                .iter()
                .map(|t| ClaimCandidate::task(t.id.as_str()))
                .collect(),
        )
        .with_labels(label_filters.to_vec());
        if let Some(ttl) = self.default_ttl {
            request = request.with_ttl(ttl);
        }
        if dry_run {
            request = request.dry_run();
        }

        let result = self.manager.claim(&request)?;
        let task = match &result {
            ClaimResult::Granted { lease } => {
                let task = eligible.into_iter().find(|t| t.id == lease.resource_key);
                self.notify(lease, task.as_ref()).await;
                task
            }
            _ => None,
        };
        Ok(TaskClaim { result, task })
    }

    async fn notify(&self, lease: &Lease, task: Option<&TaskRecord>) {
        let Some(mail) = &self.mail else { return };
        let notice = ClaimNotice::for_grant(lease, task);
        if let Err(err) = mail.send(&notice).await {
            warn!(error = %err, key = %lease.resource_key, "agent mail notification failed");
        }
    }

    /// Read-only view of the backlog against the live leases.
    pub async fn status(&self) -> Result<BacklogStatus> {
        let ready: Vec<TaskRecord> = self
            .source
            .ready_tasks()
            .await?
            .into_iter()
            .filter(|t| t.is_claimable())
            .collect();
        let leased = self.manager.list_leases(None)?;
        let held: HashSet<&str> = leased.iter().map(|l| l.resource_key.as_str()).collect();
        let available = ready
            .iter()
            .filter(|t| !held.contains(t.id.as_str()))
            .map(|t| t.id.clone())
            .collect();
        Ok(BacklogStatus {
            ready,
            leased,
            available,
        })
    }
}
