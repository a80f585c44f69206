use async_trait::async_trait;
use chrono::{DateTime, Utc};
use followup_core::{Lead, LeadStatus, Meeting, ReminderFlag};
use uuid::Uuid;

use crate::error::StorageError;

/// Qualification records of leads.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Insert or replace name and phone; status, meeting and flags of an
    /// existing lead are kept.
    async fn upsert_lead(&self, lead: &Lead) -> Result<(), StorageError>;

    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, StorageError>;

    /// Returns `false` when the lead does not exist.
    async fn set_lead_status(&self, id: Uuid, status: LeadStatus) -> Result<bool, StorageError>;

    /// Record a booked meeting, move the lead to MEETING_SCHEDULED and reset
    /// the reminder flags when the event or start time changed.
    async fn set_meeting(&self, id: Uuid, meeting: &Meeting) -> Result<bool, StorageError>;

    /// Drop the meeting and return the lead to OPEN unless it is CLOSED.
    async fn clear_meeting(&self, id: Uuid) -> Result<bool, StorageError>;

    /// Atomically set `flag` to `at` if it is unset. `true` means this caller
    /// won the flag and may send; `false` means it was already set.
    async fn claim_reminder_flag(
        &self,
        id: Uuid,
        flag: ReminderFlag,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError>;

    /// Leads whose meeting starts in `[from, to)`, earliest first.
    async fn leads_with_meetings_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Lead>, StorageError>;
}
