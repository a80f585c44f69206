//! PostgreSQL storage backend using sqlx.
//!
//! Split into modular files by domain concern.

// Row counts are bounded by PostgreSQL limits
#![allow(
    clippy::arithmetic_side_effects,
    reason = "DB row counts are bounded by PostgreSQL limits"
)]
// Absolute paths in error handling are acceptable
#![allow(clippy::absolute_paths, reason = "std paths in error handling are clear")]

mod conversation;
mod jobs;
mod leads;
mod locks;

use crate::error::StorageError;
use chrono::{DateTime, Utc};
use followup_core::constants::{
    DEFAULT_CREATE_GRACE_SECS, PG_POOL_ACQUIRE_TIMEOUT_SECS, PG_POOL_IDLE_TIMEOUT_SECS,
    PG_POOL_MAX_CONNECTIONS,
};
use followup_core::{
    ConversationMessage, FollowUpJob, JobKind, JobStatus, Lead, LeadStatus, Meeting,
    MessageDirection, TriggerContext,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::pg_migrations::run_pg_migrations;

#[derive(Clone, Debug)]
pub struct PgStorage {
    pool: PgPool,
    create_grace: chrono::Duration,
}

impl PgStorage {
    /// Connect, run migrations and return a ready store.
    pub async fn new(database_url: &str) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(PG_POOL_MAX_CONNECTIONS)
            .acquire_timeout(std::time::Duration::from_secs(PG_POOL_ACQUIRE_TIMEOUT_SECS))
            .idle_timeout(std::time::Duration::from_secs(PG_POOL_IDLE_TIMEOUT_SECS))
            .test_before_acquire(true)
            .connect(database_url)
            .await?;
        run_pg_migrations(&pool).await.map_err(|e| StorageError::Migration(e.to_string()))?;
        tracing::info!("PgStorage initialized");
        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool. Migrations are not run.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool, create_grace: chrono::Duration::seconds(i64::from(DEFAULT_CREATE_GRACE_SECS)) }
    }

    #[must_use]
    pub fn with_create_grace(mut self, grace: chrono::Duration) -> Self {
        self.create_grace = grace;
        self
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const JOB_COLUMNS: &str = "id, lead_id, kind, status, scheduled_at, attempt, trigger_context,
     created_at, executed_at, error_reason, delivery_id, send_claimed_at";

const LEAD_COLUMNS: &str = "id, name, phone, status, meeting_event_id, meeting_starts_at,
     confirmation_sent_at, reminder_24h_sent_at, reminder_2h_sent_at, created_at, updated_at";

/// Convert `usize` to `i64` for SQL LIMIT binds.
/// Saturates to `i64::MAX` on overflow (only possible on 128-bit targets).
pub(crate) fn usize_to_i64(val: usize) -> i64 {
    i64::try_from(val).unwrap_or(i64::MAX)
}

pub(crate) fn rows_to_usize(rows: u64) -> usize {
    usize::try_from(rows).unwrap_or(usize::MAX)
}

pub(crate) fn row_to_job(row: &sqlx::postgres::PgRow) -> Result<FollowUpJob, StorageError> {
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    let attempt: i32 = row.try_get("attempt")?;
    let context: serde_json::Value = row.try_get("trigger_context")?;
    Ok(FollowUpJob {
        id: row.try_get("id")?,
        lead_id: row.try_get("lead_id")?,
        kind: kind
            .parse::<JobKind>()
            .map_err(|e| StorageError::corrupt("followup_jobs.kind", e))?,
        status: status
            .parse::<JobStatus>()
            .map_err(|e| StorageError::corrupt("followup_jobs.status", e))?,
        scheduled_at: row.try_get("scheduled_at")?,
        attempt: u32::try_from(attempt)
            .map_err(|e| StorageError::corrupt("followup_jobs.attempt", e))?,
        trigger_context: TriggerContext::from_json(&context)
            .map_err(|e| StorageError::corrupt("followup_jobs.trigger_context", e))?,
        created_at: row.try_get("created_at")?,
        executed_at: row.try_get("executed_at")?,
        error_reason: row.try_get("error_reason")?,
        delivery_id: row.try_get("delivery_id")?,
        send_claimed_at: row.try_get("send_claimed_at")?,
    })
}

pub(crate) fn row_to_lead(row: &sqlx::postgres::PgRow) -> Result<Lead, StorageError> {
    let status: String = row.try_get("status")?;
    let event_id: Option<String> = row.try_get("meeting_event_id")?;
    let starts_at: Option<DateTime<Utc>> = row.try_get("meeting_starts_at")?;
    Ok(Lead {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        phone: row.try_get("phone")?,
        status: status
            .parse::<LeadStatus>()
            .map_err(|e| StorageError::corrupt("leads.status", e))?,
        meeting: event_id.zip(starts_at).map(|(event_id, starts_at)| Meeting { event_id, starts_at }),
        confirmation_sent_at: row.try_get("confirmation_sent_at")?,
        reminder_24h_sent_at: row.try_get("reminder_24h_sent_at")?,
        reminder_2h_sent_at: row.try_get("reminder_2h_sent_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(crate) fn row_to_message(
    row: &sqlx::postgres::PgRow,
) -> Result<ConversationMessage, StorageError> {
    let direction: String = row.try_get("direction")?;
    Ok(ConversationMessage {
        lead_id: row.try_get("lead_id")?,
        conversation_id: row.try_get("conversation_id")?,
        direction: direction
            .parse::<MessageDirection>()
            .map_err(|e| StorageError::corrupt("lead_messages.direction", e))?,
        body: row.try_get("body")?,
        created_at: row.try_get("created_at")?,
    })
}

pub(crate) fn lead_not_found(id: Uuid) -> StorageError {
    StorageError::NotFound { entity: "lead", id: id.to_string() }
}
