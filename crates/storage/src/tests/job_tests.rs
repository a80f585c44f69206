use chrono::{Duration, Utc};
use followup_core::constants::reason;
use followup_core::{JobKind, JobStatus, NewFollowUpJob, TriggerContext};
use proptest::prelude::*;
use uuid::Uuid;

use super::{create_test_storage, reengagement_job};
use crate::traits::JobStore;
use crate::StorageError;

#[tokio::test]
#[expect(clippy::unwrap_used, reason = "test code")]
async fn create_cancels_previous_pending_job() {
    let storage = create_test_storage();
    let lead = Uuid::new_v4();
    let now = Utc::now();

    let first = storage.create(reengagement_job(lead, now + Duration::minutes(5))).await.unwrap();
    let second = storage.create(reengagement_job(lead, now + Duration::minutes(10))).await.unwrap();

    let first = storage.get(first).await.unwrap().unwrap();
    assert_eq!(first.status, JobStatus::Cancelled);
    assert_eq!(first.error_reason.as_deref(), Some(reason::SUPERSEDED));

    let pending = storage.pending_for_lead(lead).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, second);
}

#[tokio::test]
#[expect(clippy::unwrap_used, reason = "test code")]
async fn create_leaves_other_leads_alone() {
    let storage = create_test_storage();
    let now = Utc::now();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    storage.create(reengagement_job(a, now)).await.unwrap();
    storage.create(reengagement_job(b, now)).await.unwrap();

    let stats = storage.stats().await.unwrap();
    assert_eq!(stats.pending, 2);
    assert_eq!(stats.cancelled, 0);
}

#[tokio::test]
async fn create_rejects_schedule_beyond_grace() {
    let storage = create_test_storage().with_create_grace(Duration::seconds(60));
    let job = reengagement_job(Uuid::new_v4(), Utc::now() - Duration::minutes(10));
    let err = storage.create(job).await;
    assert!(matches!(err, Err(StorageError::Validation(_))));
}

#[tokio::test]
#[expect(clippy::unwrap_used, reason = "test code")]
async fn create_accepts_slightly_past_schedule() {
    let storage = create_test_storage();
    let id = storage
        .create(reengagement_job(Uuid::new_v4(), Utc::now() - Duration::seconds(1)))
        .await
        .unwrap();
    let due = storage.fetch_due(Utc::now(), 10).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].id, id);
}

#[tokio::test]
#[expect(clippy::unwrap_used, reason = "test code")]
async fn fetch_due_orders_and_limits() {
    let storage = create_test_storage();
    let now = Utc::now();
    let late = storage.create(reengagement_job(Uuid::new_v4(), now - Duration::seconds(10))).await.unwrap();
    let early = storage.create(reengagement_job(Uuid::new_v4(), now - Duration::seconds(50))).await.unwrap();
    let middle = storage.create(reengagement_job(Uuid::new_v4(), now - Duration::seconds(30))).await.unwrap();
    storage.create(reengagement_job(Uuid::new_v4(), now + Duration::hours(1))).await.unwrap();

    let due = storage.fetch_due(now, 10).await.unwrap();
    let ids: Vec<Uuid> = due.iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![early, middle, late]);

    let limited = storage.fetch_due(now, 2).await.unwrap();
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0].id, early);
}

#[tokio::test]
#[expect(clippy::unwrap_used, reason = "test code")]
async fn terminal_transitions_are_first_write_wins() {
    let storage = create_test_storage();
    let id = storage.create(reengagement_job(Uuid::new_v4(), Utc::now())).await.unwrap();

    assert!(storage.mark_executed(id, Some("wamid.1")).await.unwrap());
    assert!(!storage.mark_failed(id, reason::SEND_ERROR).await.unwrap());
    assert!(!storage.mark_cancelled(id, reason::USER_RESPONDED).await.unwrap());
    assert!(!storage.mark_executed(id, Some("wamid.2")).await.unwrap());

    let job = storage.get(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Executed);
    assert_eq!(job.delivery_id.as_deref(), Some("wamid.1"));
    assert!(job.error_reason.is_none());
    assert!(job.executed_at.is_some());
}

#[tokio::test]
#[expect(clippy::unwrap_used, reason = "test code")]
async fn mark_on_unknown_job_is_noop() {
    let storage = create_test_storage();
    assert!(!storage.mark_failed(Uuid::new_v4(), "x").await.unwrap());
}

#[tokio::test]
#[expect(clippy::unwrap_used, reason = "test code")]
async fn cancel_pending_counts_affected() {
    let storage = create_test_storage();
    let lead = Uuid::new_v4();
    let id = storage.create(reengagement_job(lead, Utc::now())).await.unwrap();
    assert_eq!(storage.cancel_pending(lead, reason::MEETING_SCHEDULED).await.unwrap(), 1);
    assert_eq!(storage.cancel_pending(lead, reason::MEETING_SCHEDULED).await.unwrap(), 0);
    let job = storage.get(id).await.unwrap().unwrap();
    assert_eq!(job.error_reason.as_deref(), Some(reason::MEETING_SCHEDULED));
}

#[tokio::test]
#[expect(clippy::unwrap_used, reason = "test code")]
async fn trigger_context_survives_storage() {
    let storage = create_test_storage();
    let starts = Utc::now() + Duration::hours(3);
    let job = NewFollowUpJob::new(
        Uuid::new_v4(),
        JobKind::MeetingReminder2h,
        Utc::now(),
        TriggerContext::meeting("evt-42", starts),
    );
    let id = storage.create(job).await.unwrap();
    let stored = storage.get(id).await.unwrap().unwrap();
    assert_eq!(stored.trigger_context.event_id(), Some("evt-42"));
    assert_eq!(stored.kind, JobKind::MeetingReminder2h);
}

#[tokio::test]
#[expect(clippy::unwrap_used, reason = "test code")]
async fn send_claim_is_single_winner_and_hides_job() {
    let storage = create_test_storage();
    let id = storage.create(reengagement_job(Uuid::new_v4(), Utc::now())).await.unwrap();

    assert!(storage.claim_send(id).await.unwrap());
    assert!(!storage.claim_send(id).await.unwrap());
    assert!(storage.fetch_due(Utc::now(), 10).await.unwrap().is_empty());

    // Still PENDING, so the terminal write after delivery succeeds.
    assert!(storage.mark_executed(id, Some("m-1")).await.unwrap());
    assert!(!storage.claim_send(id).await.unwrap());
}

#[tokio::test]
#[expect(clippy::unwrap_used, reason = "test code")]
async fn exists_for_event_sees_terminal_jobs() {
    let storage = create_test_storage();
    let lead = Uuid::new_v4();
    let starts = Utc::now() + Duration::hours(1);
    let job = NewFollowUpJob::new(
        lead,
        JobKind::MeetingReminder2h,
        Utc::now(),
        TriggerContext::meeting("evt-1", starts),
    );
    let id = storage.create(job).await.unwrap();
    storage.mark_failed(id, reason::COMPOSE_ERROR).await.unwrap();

    assert!(storage.exists_for_event(lead, JobKind::MeetingReminder2h, "evt-1").await.unwrap());
    assert!(!storage.exists_for_event(lead, JobKind::MeetingReminder24h, "evt-1").await.unwrap());
    assert!(!storage.exists_for_event(lead, JobKind::MeetingReminder2h, "evt-2").await.unwrap());
    assert!(!storage.exists_for_event(Uuid::new_v4(), JobKind::MeetingReminder2h, "evt-1").await.unwrap());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    #[expect(clippy::unwrap_used, reason = "test code")]
    fn at_most_one_pending_per_lead(ops in prop::collection::vec((0usize..4, 0i64..240), 1..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let storage = create_test_storage();
            let leads: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
            let now = Utc::now();
            for (lead_idx, offset) in &ops {
                storage
                    .create(reengagement_job(leads[*lead_idx], now + Duration::minutes(*offset)))
                    .await
                    .unwrap();
            }
            for lead in &leads {
                let pending = storage.pending_for_lead(*lead).await.unwrap();
                prop_assert!(pending.len() <= 1);
            }
            let stats = storage.stats().await.unwrap();
            prop_assert_eq!(stats.total(), ops.len() as u64);
            Ok(())
        })?;
    }
}
