//! Test utilities and module declarations for storage tests.

use chrono::{DateTime, Duration, Utc};
use followup_core::{JobKind, Lead, NewFollowUpJob, TriggerContext};
use uuid::Uuid;

use crate::MemoryStorage;

pub fn create_test_storage() -> MemoryStorage {
    MemoryStorage::new()
}

pub fn reengagement_job(lead_id: Uuid, scheduled_at: DateTime<Utc>) -> NewFollowUpJob {
    NewFollowUpJob::new(
        lead_id,
        JobKind::ReengagementImmediate,
        scheduled_at,
        TriggerContext::reengagement(scheduled_at - Duration::minutes(30), None),
    )
}

pub fn create_test_lead(phone: Option<&str>) -> Lead {
    Lead::new(Uuid::new_v4(), Some("Test Lead".to_owned()), phone.map(str::to_owned))
}

mod job_tests;
mod lock_tests;
