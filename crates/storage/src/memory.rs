//! In-process storage backend.
//!
//! Implements every storage trait over a single mutex-guarded state. Locks and
//! job transitions are atomic within one process only, so this backend is meant
//! for tests, local runs and the CLI without `DATABASE_URL`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use followup_core::constants::{reason, DEFAULT_CREATE_GRACE_SECS};
use followup_core::{
    ConversationMessage, FollowUpJob, JobKind, JobStatus, Lead, LeadStatus, Meeting, MessageDirection,
    NewFollowUpJob, ReminderFlag,
};
use uuid::Uuid;

use crate::error::StorageError;
use crate::traits::{ActivityOracle, ConversationLog, DistributedLock, JobStore, LeadStore};
use crate::types::JobStats;

#[derive(Debug)]
struct Lease {
    owner: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct MemoryState {
    jobs: HashMap<Uuid, FollowUpJob>,
    leads: HashMap<Uuid, Lead>,
    messages: Vec<ConversationMessage>,
    leases: HashMap<String, Lease>,
}

impl MemoryState {
    fn finish(&mut self, id: Uuid, status: JobStatus, reason: Option<&str>) -> bool {
        match self.jobs.get_mut(&id) {
            Some(job) if job.status == JobStatus::Pending => {
                job.status = status;
                job.executed_at = Some(Utc::now());
                job.error_reason = reason.map(str::to_owned);
                true
            },
            _ => false,
        }
    }

    fn cancel_pending(&mut self, lead_id: Uuid, reason: &str) -> usize {
        let now = Utc::now();
        let mut count = 0;
        for job in self.jobs.values_mut() {
            if job.lead_id == lead_id && job.status == JobStatus::Pending {
                job.status = JobStatus::Cancelled;
                job.executed_at = Some(now);
                job.error_reason = Some(reason.to_owned());
                count += 1;
            }
        }
        count
    }
}

#[derive(Clone, Debug)]
pub struct MemoryStorage {
    state: Arc<Mutex<MemoryState>>,
    create_grace: chrono::Duration,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            create_grace: chrono::Duration::seconds(i64::from(DEFAULT_CREATE_GRACE_SECS)),
        }
    }

    #[must_use]
    pub fn with_create_grace(mut self, grace: chrono::Duration) -> Self {
        self.create_grace = grace;
        self
    }

    /// A poisoned mutex only means another task panicked mid-update; every
    /// mutation here is a single assignment so the state is still consistent.
    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl JobStore for MemoryStorage {
    async fn create(&self, job: NewFollowUpJob) -> Result<Uuid, StorageError> {
        let now = Utc::now();
        job.validate(now, self.create_grace)?;
        let mut state = self.state();
        let superseded = state.cancel_pending(job.lead_id, reason::SUPERSEDED);
        if superseded > 0 {
            tracing::debug!(lead_id = %job.lead_id, superseded, "cancelled previous pending jobs");
        }
        let row = FollowUpJob::pending(job, now);
        let id = row.id;
        state.jobs.insert(id, row);
        Ok(id)
    }

    async fn cancel_pending(&self, lead_id: Uuid, reason: &str) -> Result<usize, StorageError> {
        Ok(self.state().cancel_pending(lead_id, reason))
    }

    async fn fetch_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<FollowUpJob>, StorageError> {
        let state = self.state();
        let mut due: Vec<FollowUpJob> =
            state.jobs.values().filter(|job| job.is_due(now)).cloned().collect();
        due.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at).then(a.created_at.cmp(&b.created_at)));
        due.truncate(limit);
        Ok(due)
    }

    async fn claim_send(&self, id: Uuid) -> Result<bool, StorageError> {
        let mut state = self.state();
        match state.jobs.get_mut(&id) {
            Some(job) if job.status == JobStatus::Pending && job.send_claimed_at.is_none() => {
                job.send_claimed_at = Some(Utc::now());
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    async fn mark_executed(
        &self,
        id: Uuid,
        delivery_id: Option<&str>,
    ) -> Result<bool, StorageError> {
        let mut state = self.state();
        let changed = state.finish(id, JobStatus::Executed, None);
        if changed {
            if let Some(job) = state.jobs.get_mut(&id) {
                job.delivery_id = delivery_id.map(str::to_owned);
            }
        }
        Ok(changed)
    }

    async fn mark_failed(&self, id: Uuid, reason: &str) -> Result<bool, StorageError> {
        Ok(self.state().finish(id, JobStatus::Failed, Some(reason)))
    }

    async fn mark_cancelled(&self, id: Uuid, reason: &str) -> Result<bool, StorageError> {
        Ok(self.state().finish(id, JobStatus::Cancelled, Some(reason)))
    }

    async fn get(&self, id: Uuid) -> Result<Option<FollowUpJob>, StorageError> {
        Ok(self.state().jobs.get(&id).cloned())
    }

    async fn pending_for_lead(&self, lead_id: Uuid) -> Result<Vec<FollowUpJob>, StorageError> {
        let state = self.state();
        let mut jobs: Vec<FollowUpJob> = state
            .jobs
            .values()
            .filter(|job| job.lead_id == lead_id && job.status == JobStatus::Pending)
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.scheduled_at);
        Ok(jobs)
    }

    async fn exists_for_event(
        &self,
        lead_id: Uuid,
        kind: JobKind,
        event_id: &str,
    ) -> Result<bool, StorageError> {
        Ok(self.state().jobs.values().any(|job| {
            job.lead_id == lead_id && job.kind == kind && job.trigger_context.event_id() == Some(event_id)
        }))
    }

    async fn stats(&self) -> Result<JobStats, StorageError> {
        let state = self.state();
        let mut stats = JobStats::default();
        for job in state.jobs.values() {
            stats.add(job.status, 1);
        }
        Ok(stats)
    }
}

#[async_trait]
impl DistributedLock for MemoryStorage {
    async fn acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool, StorageError> {
        let now = Instant::now();
        let mut state = self.state();
        if let Some(lease) = state.leases.get(key) {
            if lease.expires_at > now {
                return Ok(false);
            }
        }
        state
            .leases
            .insert(key.to_owned(), Lease { owner: owner.to_owned(), expires_at: now + ttl });
        Ok(true)
    }

    async fn release(&self, key: &str, owner: &str) -> Result<bool, StorageError> {
        let mut state = self.state();
        if state.leases.get(key).is_some_and(|lease| lease.owner == owner) {
            state.leases.remove(key);
            return Ok(true);
        }
        Ok(false)
    }
}

#[async_trait]
impl ConversationLog for MemoryStorage {
    async fn append_message(&self, message: &ConversationMessage) -> Result<(), StorageError> {
        self.state().messages.push(message.clone());
        Ok(())
    }

    async fn latest_inbound_at(&self, lead_id: Uuid) -> Result<Option<DateTime<Utc>>, StorageError> {
        Ok(self
            .state()
            .messages
            .iter()
            .filter(|m| m.lead_id == lead_id && m.direction == MessageDirection::Inbound)
            .map(|m| m.created_at)
            .max())
    }

    async fn recent_messages(
        &self,
        lead_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>, StorageError> {
        let state = self.state();
        let mut messages: Vec<ConversationMessage> =
            state.messages.iter().filter(|m| m.lead_id == lead_id).cloned().collect();
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        messages.truncate(limit);
        Ok(messages)
    }
}

#[async_trait]
impl ActivityOracle for MemoryStorage {
    async fn has_responded_since(
        &self,
        lead_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        Ok(self.latest_inbound_at(lead_id).await?.is_some_and(|latest| latest > since))
    }
}

#[async_trait]
impl LeadStore for MemoryStorage {
    async fn upsert_lead(&self, lead: &Lead) -> Result<(), StorageError> {
        let mut state = self.state();
        match state.leads.get_mut(&lead.id) {
            Some(existing) => {
                existing.name.clone_from(&lead.name);
                existing.phone.clone_from(&lead.phone);
                existing.updated_at = Utc::now();
            },
            None => {
                state.leads.insert(lead.id, lead.clone());
            },
        }
        Ok(())
    }

    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, StorageError> {
        Ok(self.state().leads.get(&id).cloned())
    }

    async fn set_lead_status(&self, id: Uuid, status: LeadStatus) -> Result<bool, StorageError> {
        let mut state = self.state();
        let Some(lead) = state.leads.get_mut(&id) else {
            return Ok(false);
        };
        lead.status = status;
        lead.updated_at = Utc::now();
        Ok(true)
    }

    async fn set_meeting(&self, id: Uuid, meeting: &Meeting) -> Result<bool, StorageError> {
        let mut state = self.state();
        let Some(lead) = state.leads.get_mut(&id) else {
            return Ok(false);
        };
        if lead.meeting.as_ref() != Some(meeting) {
            lead.clear_flags();
        }
        lead.meeting = Some(meeting.clone());
        lead.status = LeadStatus::MeetingScheduled;
        lead.updated_at = Utc::now();
        Ok(true)
    }

    async fn clear_meeting(&self, id: Uuid) -> Result<bool, StorageError> {
        let mut state = self.state();
        let Some(lead) = state.leads.get_mut(&id) else {
            return Ok(false);
        };
        lead.meeting = None;
        lead.clear_flags();
        if lead.status != LeadStatus::Closed {
            lead.status = LeadStatus::Open;
        }
        lead.updated_at = Utc::now();
        Ok(true)
    }

    async fn claim_reminder_flag(
        &self,
        id: Uuid,
        flag: ReminderFlag,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let mut state = self.state();
        let Some(lead) = state.leads.get_mut(&id) else {
            return Err(StorageError::NotFound { entity: "lead", id: id.to_string() });
        };
        if lead.flag(flag).is_some() {
            return Ok(false);
        }
        lead.set_flag(flag, at);
        Ok(true)
    }

    async fn leads_with_meetings_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Lead>, StorageError> {
        let state = self.state();
        let mut leads: Vec<Lead> = state
            .leads
            .values()
            .filter(|lead| {
                lead.status == LeadStatus::MeetingScheduled
                    && lead.meeting.as_ref().is_some_and(|m| m.starts_at >= from && m.starts_at < to)
            })
            .cloned()
            .collect();
        leads.sort_by_key(|lead| lead.meeting.as_ref().map(|m| m.starts_at));
        Ok(leads)
    }
}
