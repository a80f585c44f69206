//! Integration tests for PgStorage.
//! Run with: DATABASE_URL=... cargo test -p followup-storage -- --ignored pg_

#![cfg(feature = "postgres")]
#![allow(clippy::unwrap_used, reason = "integration test code")]

use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use followup_core::constants::reason;
use followup_core::{
    ConversationMessage, JobKind, JobStatus, Lead, LeadStatus, Meeting, NewFollowUpJob,
    ReminderFlag, TriggerContext,
};
use followup_storage::traits::{
    ActivityOracle, ConversationLog, DistributedLock, JobStore, LeadStore,
};
use followup_storage::{PgStorage, StorageError};
use uuid::Uuid;

async fn create_pg_storage() -> PgStorage {
    let url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for PgStorage integration tests");
    PgStorage::new(&url).await.expect("Failed to connect to PostgreSQL")
}

fn reengagement(lead_id: Uuid, offset: Duration) -> NewFollowUpJob {
    let at = Utc::now() + offset;
    NewFollowUpJob::new(
        lead_id,
        JobKind::ReengagementImmediate,
        at,
        TriggerContext::reengagement(at - Duration::minutes(30), Some("conv-pg".to_owned())),
    )
}

// ── JobStore ─────────────────────────────────────────────────────

#[tokio::test]
#[ignore]
async fn pg_create_supersedes_pending() {
    let storage = create_pg_storage().await;
    let lead = Uuid::new_v4();
    let first = storage.create(reengagement(lead, Duration::minutes(5))).await.unwrap();
    let second = storage.create(reengagement(lead, Duration::minutes(10))).await.unwrap();

    let first = storage.get(first).await.unwrap().unwrap();
    assert_eq!(first.status, JobStatus::Cancelled);
    assert_eq!(first.error_reason.as_deref(), Some(reason::SUPERSEDED));

    let pending = storage.pending_for_lead(lead).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, second);
    assert_eq!(pending[0].trigger_context.conversation_id(), Some("conv-pg"));
}

#[tokio::test]
#[ignore]
async fn pg_concurrent_creates_keep_one_pending() {
    let storage = create_pg_storage().await;
    let lead = Uuid::new_v4();
    let mut handles = Vec::new();
    for i in 0..8 {
        let storage = storage.clone();
        handles.push(tokio::spawn(async move {
            storage.create(reengagement(lead, Duration::minutes(i))).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(storage.pending_for_lead(lead).await.unwrap().len(), 1);
}

#[tokio::test]
#[ignore]
async fn pg_create_rejects_stale_schedule() {
    let storage = create_pg_storage().await.with_create_grace(Duration::seconds(30));
    let result = storage.create(reengagement(Uuid::new_v4(), Duration::hours(-1))).await;
    assert!(matches!(result, Err(StorageError::Validation(_))));
}

#[tokio::test]
#[ignore]
async fn pg_fetch_due_and_terminal_cas() {
    let storage = create_pg_storage().await;
    let lead = Uuid::new_v4();
    let id = storage.create(reengagement(lead, Duration::seconds(-1))).await.unwrap();

    let due = storage.fetch_due(Utc::now(), 1000).await.unwrap();
    assert!(due.iter().any(|j| j.id == id));

    assert!(storage.mark_executed(id, Some("provider-1")).await.unwrap());
    assert!(!storage.mark_failed(id, reason::SEND_ERROR).await.unwrap());
    let job = storage.get(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Executed);
    assert_eq!(job.delivery_id.as_deref(), Some("provider-1"));

    let due = storage.fetch_due(Utc::now(), 1000).await.unwrap();
    assert!(!due.iter().any(|j| j.id == id));
}

#[tokio::test]
#[ignore]
async fn pg_send_claim_and_event_lookup() {
    let storage = create_pg_storage().await;
    let lead = Uuid::new_v4();
    let event = format!("evt-{}", Uuid::new_v4());
    let job = NewFollowUpJob::new(
        lead,
        JobKind::MeetingReminder24h,
        Utc::now(),
        TriggerContext::meeting(&event, Utc::now() + Duration::hours(20)),
    );
    let id = storage.create(job).await.unwrap();

    assert!(storage.claim_send(id).await.unwrap());
    assert!(!storage.claim_send(id).await.unwrap());
    let due = storage.fetch_due(Utc::now(), 1000).await.unwrap();
    assert!(!due.iter().any(|j| j.id == id));
    assert!(storage.get(id).await.unwrap().unwrap().send_claimed_at.is_some());

    assert!(storage.exists_for_event(lead, JobKind::MeetingReminder24h, &event).await.unwrap());
    assert!(!storage.exists_for_event(lead, JobKind::MeetingReminder2h, &event).await.unwrap());
}

#[tokio::test]
#[ignore]
async fn pg_stats_count_statuses() {
    let storage = create_pg_storage().await;
    let before = storage.stats().await.unwrap();
    let id = storage.create(reengagement(Uuid::new_v4(), Duration::minutes(1))).await.unwrap();
    storage.mark_cancelled(id, reason::OPERATOR_CANCELLED).await.unwrap();
    let after = storage.stats().await.unwrap();
    assert!(after.cancelled > before.cancelled);
}

// ── DistributedLock ──────────────────────────────────────────────

#[tokio::test]
#[ignore]
async fn pg_lock_exclusive_and_expiring() {
    let storage = create_pg_storage().await;
    let key = format!("followup:{}", Uuid::new_v4());

    assert!(storage.acquire(&key, "w1", StdDuration::from_secs(60)).await.unwrap());
    assert!(!storage.acquire(&key, "w2", StdDuration::from_secs(60)).await.unwrap());
    assert!(!storage.release(&key, "w2").await.unwrap());
    assert!(storage.release(&key, "w1").await.unwrap());

    assert!(storage.acquire(&key, "w1", StdDuration::from_millis(200)).await.unwrap());
    tokio::time::sleep(StdDuration::from_millis(400)).await;
    assert!(storage.acquire(&key, "w2", StdDuration::from_secs(60)).await.unwrap());
    assert!(!storage.release(&key, "w1").await.unwrap());
    storage.release(&key, "w2").await.unwrap();
}

// ── LeadStore / ConversationLog / ActivityOracle ─────────────────

#[tokio::test]
#[ignore]
async fn pg_lead_flags_and_meetings() {
    let storage = create_pg_storage().await;
    let lead = Lead::new(Uuid::new_v4(), Some("Ana Souza".to_owned()), Some("+5511999".to_owned()));
    storage.upsert_lead(&lead).await.unwrap();

    let meeting = Meeting { event_id: "evt-pg".to_owned(), starts_at: Utc::now() + Duration::hours(3) };
    assert!(storage.set_meeting(lead.id, &meeting).await.unwrap());
    assert!(storage.claim_reminder_flag(lead.id, ReminderFlag::Reminder2h, Utc::now()).await.unwrap());
    assert!(!storage.claim_reminder_flag(lead.id, ReminderFlag::Reminder2h, Utc::now()).await.unwrap());

    let stored = storage.get_lead(lead.id).await.unwrap().unwrap();
    assert_eq!(stored.status, LeadStatus::MeetingScheduled);
    assert_eq!(stored.meeting.as_ref().map(|m| m.event_id.as_str()), Some("evt-pg"));
    assert!(stored.reminder_2h_sent_at.is_some());

    let window = storage
        .leads_with_meetings_between(Utc::now(), Utc::now() + Duration::hours(24))
        .await
        .unwrap();
    assert!(window.iter().any(|l| l.id == lead.id));

    assert!(storage.clear_meeting(lead.id).await.unwrap());
    let stored = storage.get_lead(lead.id).await.unwrap().unwrap();
    assert_eq!(stored.status, LeadStatus::Open);
    assert!(stored.reminder_2h_sent_at.is_none());
}

#[tokio::test]
#[ignore]
async fn pg_activity_oracle() {
    let storage = create_pg_storage().await;
    let lead = Uuid::new_v4();
    let anchor = Utc::now() - Duration::minutes(40);
    assert!(!storage.has_responded_since(lead, anchor).await.unwrap());

    storage
        .append_message(&ConversationMessage::inbound(lead, "oi", anchor + Duration::minutes(30)))
        .await
        .unwrap();
    assert!(storage.has_responded_since(lead, anchor).await.unwrap());
    assert!(!storage.has_responded_since(lead, anchor + Duration::minutes(31)).await.unwrap());
    assert_eq!(storage.recent_messages(lead, 10).await.unwrap().len(), 1);
}
