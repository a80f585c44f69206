//! Test doubles and harness shared by the service tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use followup_core::{
    BusinessHours, CalendarEventStatus, FollowUpJob, JobKind, Lead, NewFollowUpJob, TriggerContext,
};
use followup_storage::traits::{JobStore, LeadStore};
use followup_storage::{JobStats, MemoryStorage, StorageBackend, StorageError};
use uuid::Uuid;

use crate::chain::ChainPolicy;
use crate::collaborators::{CalendarSource, DeliveryReceipt, MessageComposer, Notifier, Stores};
use crate::composer::DefaultComposer;
use crate::error::{CalendarError, ComposeError, NotifyError};
use crate::executor::{Executor, ExecutorSettings};

/// Records every message; optionally slow or failing.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
    delay: Option<Duration>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn slow(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::default() }
    }

    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, phone: &str, text: &str) -> Result<DeliveryReceipt, NotifyError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(NotifyError::Status { code: 400, body: "invalid number".to_owned() });
        }
        let mut sent = self.sent.lock().unwrap_or_else(PoisonError::into_inner);
        sent.push((phone.to_owned(), text.to_owned()));
        Ok(DeliveryReceipt { delivered: true, provider_id: format!("msg-{}", sent.len()) })
    }
}

/// Returns a fixed text, fails, or hangs.
pub enum StubComposer {
    Text(&'static str),
    Fail,
    Hang,
}

#[async_trait]
impl MessageComposer for StubComposer {
    async fn compose(&self, _lead: &Lead, _job: &FollowUpJob) -> Result<String, ComposeError> {
        match self {
            Self::Text(text) => Ok((*text).to_owned()),
            Self::Fail => Err(ComposeError::Empty),
            Self::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok("too late".to_owned())
            },
        }
    }
}

pub struct StubCalendar(pub CalendarEventStatus);

#[async_trait]
impl CalendarSource for StubCalendar {
    async fn event_status(&self, _event_id: &str) -> Result<CalendarEventStatus, CalendarError> {
        Ok(self.0)
    }
}

/// Takes one unit from `counter` if any are left.
fn take_one(counter: &AtomicUsize) -> bool {
    counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok()
}

/// Memory job store whose first `fetch_failures` fetches and first
/// `finalize_failures` EXECUTED writes fail with a pool timeout.
pub struct FaultyJobs {
    inner: MemoryStorage,
    fetch_failures: AtomicUsize,
    finalize_failures: AtomicUsize,
}

impl FaultyJobs {
    pub fn new(inner: MemoryStorage) -> Self {
        Self { inner, fetch_failures: AtomicUsize::new(0), finalize_failures: AtomicUsize::new(0) }
    }

    pub fn failing_fetches(self, n: usize) -> Self {
        self.fetch_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn failing_finalizes(self, n: usize) -> Self {
        self.finalize_failures.store(n, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl JobStore for FaultyJobs {
    async fn create(&self, job: NewFollowUpJob) -> Result<Uuid, StorageError> {
        self.inner.create(job).await
    }

    async fn cancel_pending(&self, lead_id: Uuid, reason: &str) -> Result<usize, StorageError> {
        self.inner.cancel_pending(lead_id, reason).await
    }

    async fn fetch_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<FollowUpJob>, StorageError> {
        if take_one(&self.fetch_failures) {
            return Err(StorageError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.fetch_due(now, limit).await
    }

    async fn claim_send(&self, id: Uuid) -> Result<bool, StorageError> {
        self.inner.claim_send(id).await
    }

    async fn mark_executed(&self, id: Uuid, delivery_id: Option<&str>) -> Result<bool, StorageError> {
        if take_one(&self.finalize_failures) {
            return Err(StorageError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.mark_executed(id, delivery_id).await
    }

    async fn mark_failed(&self, id: Uuid, reason: &str) -> Result<bool, StorageError> {
        self.inner.mark_failed(id, reason).await
    }

    async fn mark_cancelled(&self, id: Uuid, reason: &str) -> Result<bool, StorageError> {
        self.inner.mark_cancelled(id, reason).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<FollowUpJob>, StorageError> {
        self.inner.get(id).await
    }

    async fn pending_for_lead(&self, lead_id: Uuid) -> Result<Vec<FollowUpJob>, StorageError> {
        self.inner.pending_for_lead(lead_id).await
    }

    async fn exists_for_event(
        &self,
        lead_id: Uuid,
        kind: JobKind,
        event_id: &str,
    ) -> Result<bool, StorageError> {
        self.inner.exists_for_event(lead_id, kind, event_id).await
    }

    async fn stats(&self) -> Result<JobStats, StorageError> {
        self.inner.stats().await
    }
}

pub fn test_settings() -> ExecutorSettings {
    ExecutorSettings {
        compose_timeout: Duration::from_millis(200),
        send_timeout: Duration::from_secs(2),
        chain: ChainPolicy {
            business_hours: BusinessHours::always_open(),
            ..ChainPolicy::default()
        },
        ..ExecutorSettings::default()
    }
}

pub struct Harness {
    pub storage: MemoryStorage,
    pub stores: Stores,
    pub notifier: Arc<RecordingNotifier>,
    pub executor: Arc<Executor>,
}

pub struct HarnessBuilder {
    storage: MemoryStorage,
    stores: Stores,
    notifier: RecordingNotifier,
    composer: Option<Arc<dyn MessageComposer>>,
    calendar: Option<Arc<dyn CalendarSource>>,
    settings: ExecutorSettings,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        let storage = MemoryStorage::new();
        let stores = Stores::from_backend(Arc::new(StorageBackend::Memory(storage.clone())));
        Self {
            storage,
            stores,
            notifier: RecordingNotifier::default(),
            composer: None,
            calendar: None,
            settings: test_settings(),
        }
    }

    /// Handle to the shared memory backend.
    pub fn storage(&self) -> MemoryStorage {
        self.storage.clone()
    }

    pub fn notifier(mut self, notifier: RecordingNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn composer(mut self, composer: StubComposer) -> Self {
        self.composer = Some(Arc::new(composer));
        self
    }

    pub fn calendar(mut self, status: CalendarEventStatus) -> Self {
        self.calendar = Some(Arc::new(StubCalendar(status)));
        self
    }

    pub fn settings(mut self, settings: ExecutorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replaces the job store, keeping everything else on the memory backend.
    pub fn jobs(mut self, jobs: Arc<dyn JobStore>) -> Self {
        self.stores.jobs = jobs;
        self
    }

    pub fn build(self) -> Harness {
        let composer = self.composer.unwrap_or_else(|| {
            Arc::new(DefaultComposer::templates(Arc::clone(&self.stores.conversations), Tz::UTC))
        });
        let notifier = Arc::new(self.notifier);
        let mut executor = Executor::new(
            self.stores.clone(),
            composer,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            self.settings,
        );
        if let Some(calendar) = self.calendar {
            executor = executor.with_calendar(calendar);
        }
        Harness { storage: self.storage, stores: self.stores, notifier, executor: Arc::new(executor) }
    }
}

pub fn harness() -> Harness {
    HarnessBuilder::new().build()
}

impl Harness {
    #[expect(clippy::unwrap_used, reason = "test code")]
    pub async fn lead(&self, phone: Option<&str>) -> Lead {
        let lead = Lead::new(Uuid::new_v4(), Some("Ana Souza".to_owned()), phone.map(str::to_owned));
        self.storage.upsert_lead(&lead).await.unwrap();
        lead
    }

    #[expect(clippy::unwrap_used, reason = "test code")]
    pub async fn job(&self, id: Uuid) -> FollowUpJob {
        self.storage.get(id).await.unwrap().unwrap()
    }
}

/// REENGAGEMENT_IMMEDIATE due one second ago, anchored 40 minutes ago.
pub fn due_reengagement(lead_id: Uuid, now: DateTime<Utc>) -> NewFollowUpJob {
    NewFollowUpJob::new(
        lead_id,
        JobKind::ReengagementImmediate,
        now - chrono::Duration::seconds(1),
        TriggerContext::reengagement(now - chrono::Duration::minutes(40), Some("conv-1".to_owned())),
    )
}
