use async_trait::async_trait;
use chrono::{DateTime, Utc};
use followup_core::{FollowUpJob, JobKind, NewFollowUpJob};
use uuid::Uuid;

use crate::error::StorageError;
use crate::types::JobStats;

/// Durable table of follow-up jobs.
///
/// Terminal transitions are compare-and-set on `status = 'PENDING'`: they
/// return `false` instead of failing when the job is already terminal.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a PENDING job, cancelling every other PENDING job of the same lead
    /// in the same atomic step. Returns the new job id.
    ///
    /// Fails with [`StorageError::Validation`] when `scheduled_at` lies further in
    /// the past than the store's create grace window.
    async fn create(&self, job: NewFollowUpJob) -> Result<Uuid, StorageError>;

    /// Cancel all PENDING jobs of a lead. Returns the number of jobs affected.
    async fn cancel_pending(&self, lead_id: Uuid, reason: &str) -> Result<usize, StorageError>;

    /// Unclaimed PENDING jobs with `scheduled_at <= now`, oldest first, at most `limit`.
    async fn fetch_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<FollowUpJob>, StorageError>;

    /// Marks a PENDING job as handed to the notifier. Only one caller ever
    /// wins; a claimed job is excluded from [`JobStore::fetch_due`] so it can
    /// not be delivered twice even if its terminal write is lost.
    async fn claim_send(&self, id: Uuid) -> Result<bool, StorageError>;

    async fn mark_executed(
        &self,
        id: Uuid,
        delivery_id: Option<&str>,
    ) -> Result<bool, StorageError>;

    async fn mark_failed(&self, id: Uuid, reason: &str) -> Result<bool, StorageError>;

    async fn mark_cancelled(&self, id: Uuid, reason: &str) -> Result<bool, StorageError>;

    async fn get(&self, id: Uuid) -> Result<Option<FollowUpJob>, StorageError>;

    /// PENDING jobs of one lead (normally zero or one).
    async fn pending_for_lead(&self, lead_id: Uuid) -> Result<Vec<FollowUpJob>, StorageError>;

    /// Whether the lead has any job, in any status, of `kind` for the
    /// calendar event `event_id`.
    async fn exists_for_event(
        &self,
        lead_id: Uuid,
        kind: JobKind,
        event_id: &str,
    ) -> Result<bool, StorageError>;

    /// Job counts per status.
    async fn stats(&self) -> Result<JobStats, StorageError>;
}
