//! Unified storage backend with enum dispatch.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use followup_core::{
    ConversationMessage, FollowUpJob, JobKind, Lead, LeadStatus, Meeting, NewFollowUpJob, ReminderFlag,
};
use uuid::Uuid;

use crate::error::StorageError;
use crate::traits::{ActivityOracle, ConversationLog, DistributedLock, JobStore, LeadStore};
use crate::types::JobStats;

macro_rules! dispatch {
    ($self:expr, $trait:path, $method:ident ( $($arg:expr),* $(,)? )) => {
        match $self {
            StorageBackend::Memory(s) => <crate::MemoryStorage as $trait>::$method(s, $($arg),*).await,
            #[cfg(feature = "postgres")]
            StorageBackend::Postgres(s) => <crate::pg_storage::PgStorage as $trait>::$method(s, $($arg),*).await,
        }
    };
}

#[derive(Clone, Debug)]
pub enum StorageBackend {
    Memory(crate::MemoryStorage),
    #[cfg(feature = "postgres")]
    Postgres(crate::pg_storage::PgStorage),
}

impl StorageBackend {
    #[must_use]
    pub fn new_memory() -> Self {
        Self::Memory(crate::MemoryStorage::new())
    }

    #[cfg(feature = "postgres")]
    pub async fn new_postgres(database_url: &str) -> Result<Self, StorageError> {
        Ok(Self::Postgres(crate::pg_storage::PgStorage::new(database_url).await?))
    }

    /// Postgres when a URL is given, in-memory otherwise.
    pub async fn connect(database_url: Option<&str>) -> Result<Self, StorageError> {
        match database_url {
            #[cfg(feature = "postgres")]
            Some(url) => Self::new_postgres(url).await,
            #[cfg(not(feature = "postgres"))]
            Some(_) => Err(StorageError::Validation(
                "DATABASE_URL set but the postgres feature is disabled".to_owned(),
            )),
            None => {
                tracing::warn!(
                    "DATABASE_URL not set, using in-memory storage (single process, not durable)"
                );
                Ok(Self::new_memory())
            },
        }
    }

    #[must_use]
    pub fn with_create_grace(self, grace: chrono::Duration) -> Self {
        match self {
            Self::Memory(s) => Self::Memory(s.with_create_grace(grace)),
            #[cfg(feature = "postgres")]
            Self::Postgres(s) => Self::Postgres(s.with_create_grace(grace)),
        }
    }

    #[must_use]
    pub const fn is_durable(&self) -> bool {
        !matches!(self, Self::Memory(_))
    }
}

// ── JobStore ─────────────────────────────────────────────────────

#[async_trait]
impl JobStore for StorageBackend {
    async fn create(&self, job: NewFollowUpJob) -> Result<Uuid, StorageError> {
        dispatch!(self, JobStore, create(job))
    }

    async fn cancel_pending(&self, lead_id: Uuid, reason: &str) -> Result<usize, StorageError> {
        dispatch!(self, JobStore, cancel_pending(lead_id, reason))
    }

    async fn fetch_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<FollowUpJob>, StorageError> {
        dispatch!(self, JobStore, fetch_due(now, limit))
    }

    async fn claim_send(&self, id: Uuid) -> Result<bool, StorageError> {
        dispatch!(self, JobStore, claim_send(id))
    }

    async fn mark_executed(
        &self,
        id: Uuid,
        delivery_id: Option<&str>,
    ) -> Result<bool, StorageError> {
        dispatch!(self, JobStore, mark_executed(id, delivery_id))
    }

    async fn mark_failed(&self, id: Uuid, reason: &str) -> Result<bool, StorageError> {
        dispatch!(self, JobStore, mark_failed(id, reason))
    }

    async fn mark_cancelled(&self, id: Uuid, reason: &str) -> Result<bool, StorageError> {
        dispatch!(self, JobStore, mark_cancelled(id, reason))
    }

    async fn get(&self, id: Uuid) -> Result<Option<FollowUpJob>, StorageError> {
        dispatch!(self, JobStore, get(id))
    }

    async fn pending_for_lead(&self, lead_id: Uuid) -> Result<Vec<FollowUpJob>, StorageError> {
        dispatch!(self, JobStore, pending_for_lead(lead_id))
    }

    async fn exists_for_event(
        &self,
        lead_id: Uuid,
        kind: JobKind,
        event_id: &str,
    ) -> Result<bool, StorageError> {
        dispatch!(self, JobStore, exists_for_event(lead_id, kind, event_id))
    }

    async fn stats(&self) -> Result<JobStats, StorageError> {
        dispatch!(self, JobStore, stats())
    }
}

// ── DistributedLock ──────────────────────────────────────────────

#[async_trait]
impl DistributedLock for StorageBackend {
    async fn acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool, StorageError> {
        dispatch!(self, DistributedLock, acquire(key, owner, ttl))
    }

    async fn release(&self, key: &str, owner: &str) -> Result<bool, StorageError> {
        dispatch!(self, DistributedLock, release(key, owner))
    }
}

// ── ActivityOracle ───────────────────────────────────────────────

#[async_trait]
impl ActivityOracle for StorageBackend {
    async fn has_responded_since(
        &self,
        lead_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        dispatch!(self, ActivityOracle, has_responded_since(lead_id, since))
    }
}

// ── ConversationLog ──────────────────────────────────────────────

#[async_trait]
impl ConversationLog for StorageBackend {
    async fn append_message(&self, message: &ConversationMessage) -> Result<(), StorageError> {
        dispatch!(self, ConversationLog, append_message(message))
    }

    async fn latest_inbound_at(&self, lead_id: Uuid) -> Result<Option<DateTime<Utc>>, StorageError> {
        dispatch!(self, ConversationLog, latest_inbound_at(lead_id))
    }

    async fn recent_messages(
        &self,
        lead_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>, StorageError> {
        dispatch!(self, ConversationLog, recent_messages(lead_id, limit))
    }
}

// ── LeadStore ────────────────────────────────────────────────────

#[async_trait]
impl LeadStore for StorageBackend {
    async fn upsert_lead(&self, lead: &Lead) -> Result<(), StorageError> {
        dispatch!(self, LeadStore, upsert_lead(lead))
    }

    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, StorageError> {
        dispatch!(self, LeadStore, get_lead(id))
    }

    async fn set_lead_status(&self, id: Uuid, status: LeadStatus) -> Result<bool, StorageError> {
        dispatch!(self, LeadStore, set_lead_status(id, status))
    }

    async fn set_meeting(&self, id: Uuid, meeting: &Meeting) -> Result<bool, StorageError> {
        dispatch!(self, LeadStore, set_meeting(id, meeting))
    }

    async fn clear_meeting(&self, id: Uuid) -> Result<bool, StorageError> {
        dispatch!(self, LeadStore, clear_meeting(id))
    }

    async fn claim_reminder_flag(
        &self,
        id: Uuid,
        flag: ReminderFlag,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        dispatch!(self, LeadStore, claim_reminder_flag(id, flag, at))
    }

    async fn leads_with_meetings_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Lead>, StorageError> {
        dispatch!(self, LeadStore, leads_with_meetings_between(from, to))
    }
}
