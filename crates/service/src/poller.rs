//! Periodic dispatch of due jobs (`Poller`) and meeting reminders (`ReminderPoller`).
//!
//! Each tick dispatches at most as many jobs as there are free worker permits
//! and returns without waiting for them, so a slow job never delays the next tick.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use followup_core::constants::{REMINDER_24H_WINDOW_HOURS, REMINDER_2H_WINDOW_HOURS};
use followup_core::{
    EngineConfig, FollowUpJob, JobKind, Lead, MeetingContext, NewFollowUpJob, TriggerContext,
};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::executor::{lock_key, ExecutionOutcome, Executor};

#[derive(Debug, Clone, Copy)]
pub struct PollerSettings {
    pub interval: Duration,
    pub fetch_limit: usize,
    pub max_workers: usize,
}

impl PollerSettings {
    #[must_use]
    pub fn jobs(config: &EngineConfig) -> Self {
        Self {
            interval: config.poll_interval,
            fetch_limit: config.fetch_limit,
            max_workers: config.max_workers,
        }
    }

    #[must_use]
    pub fn reminders(config: &EngineConfig) -> Self {
        Self { interval: config.reminder_poll_interval, ..Self::jobs(config) }
    }
}

type InFlight = Arc<Mutex<HashSet<Uuid>>>;

/// Marks a job as running in this process until dropped.
struct InFlightGuard {
    set: InFlight,
    id: Uuid,
}

impl InFlightGuard {
    fn claim(set: &InFlight, id: Uuid) -> Option<Self> {
        let inserted = set.lock().unwrap_or_else(PoisonError::into_inner).insert(id);
        inserted.then(|| Self { set: Arc::clone(set), id })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.id);
    }
}

async fn join_all(handles: Vec<JoinHandle<ExecutionOutcome>>) -> Vec<ExecutionOutcome> {
    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => tracing::error!(error = %e, "follow-up task panicked"),
        }
    }
    outcomes
}

/// Ticks every `period` until `shutdown` flips to true or its sender is dropped.
async fn every_tick<F, Fut>(name: &str, period: Duration, shutdown: &mut watch::Receiver<bool>, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(poller = name, interval_secs = period.as_secs(), "poller started");
    loop {
        tokio::select! {
            _ = interval.tick() => tick().await,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            },
        }
    }
    tracing::info!(poller = name, "poller stopping");
}

async fn drain(semaphore: &Semaphore, max_workers: usize) {
    let permits = u32::try_from(max_workers).unwrap_or(u32::MAX);
    match semaphore.acquire_many(permits).await {
        Ok(_all) => {},
        Err(e) => tracing::warn!(error = %e, "worker pool closed while draining"),
    }
}

/// Pulls due jobs and hands them to the [`Executor`].
pub struct Poller {
    executor: Arc<Executor>,
    settings: PollerSettings,
    semaphore: Arc<Semaphore>,
    in_flight: InFlight,
}

impl Poller {
    #[must_use]
    pub fn new(executor: Arc<Executor>, settings: PollerSettings) -> Self {
        let settings = PollerSettings { max_workers: settings.max_workers.max(1), ..settings };
        Self {
            executor,
            semaphore: Arc::new(Semaphore::new(settings.max_workers)),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            settings,
        }
    }

    /// Jobs dispatched by this process that have not finished yet.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// One poll: fetch due jobs and spawn an execution for each one a worker
    /// permit is free for. Fetch errors are logged and yield no work.
    pub async fn tick(&self, now: DateTime<Utc>) -> Vec<JoinHandle<ExecutionOutcome>> {
        let available = self.semaphore.available_permits();
        if available == 0 {
            tracing::debug!("all workers busy, skipping poll");
            return Vec::new();
        }
        let limit = available.saturating_add(self.in_flight()).min(self.settings.fetch_limit);

        let jobs = match self.executor.stores().jobs.fetch_due(now, limit).await {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!(error = %e, "fetching due jobs failed, retrying next tick");
                return Vec::new();
            },
        };

        let mut handles = Vec::with_capacity(jobs.len());
        for job in jobs {
            let Some(guard) = InFlightGuard::claim(&self.in_flight, job.id) else {
                continue;
            };
            let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
                break;
            };
            let executor = Arc::clone(&self.executor);
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let _guard = guard;
                executor.run(&job).await
            }));
        }
        if !handles.is_empty() {
            tracing::info!(dispatched = handles.len(), "dispatched due follow-ups");
        }
        handles
    }

    /// One poll, waiting for every dispatched job.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Vec<ExecutionOutcome> {
        join_all(self.tick(now).await).await
    }

    /// Polls until shutdown, then waits for running jobs to finish.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        every_tick("jobs", self.settings.interval, &mut shutdown, || async move {
            // Detached: the next tick must not wait for these.
            let _handles = self.tick(Utc::now()).await;
        })
        .await;
        drain(&self.semaphore, self.settings.max_workers).await;
    }
}

/// Reminder due for a lead's meeting at `now`, if any.
///
/// The 2h window wins over the 24h one; a flag that is already set is never
/// due again.
#[must_use]
pub fn due_reminder(lead: &Lead, now: DateTime<Utc>) -> Option<JobKind> {
    let meeting = lead.meeting.as_ref()?;
    let until = meeting.starts_at - now;
    if until <= chrono::Duration::zero() {
        return None;
    }
    if until <= chrono::Duration::hours(REMINDER_2H_WINDOW_HOURS) {
        return lead.reminder_2h_sent_at.is_none().then_some(JobKind::MeetingReminder2h);
    }
    if until <= chrono::Duration::hours(REMINDER_24H_WINDOW_HOURS) && lead.reminder_24h_sent_at.is_none() {
        return Some(JobKind::MeetingReminder24h);
    }
    None
}

/// Creates the reminder job unless the lead already has a meeting job pending
/// or this reminder was already attempted for the same event, whatever its outcome.
async fn materialize_reminder(
    executor: &Executor,
    lead: &Lead,
    kind: JobKind,
    now: DateTime<Utc>,
) -> Result<Option<FollowUpJob>, ServiceError> {
    let Some(meeting) = lead.meeting.as_ref() else {
        return Ok(None);
    };
    let jobs = &executor.stores().jobs;
    if jobs.pending_for_lead(lead.id).await?.iter().any(|j| j.kind.is_meeting_class()) {
        return Ok(None);
    }
    if jobs.exists_for_event(lead.id, kind, &meeting.event_id).await? {
        return Ok(None);
    }
    let hours_before = match kind {
        JobKind::MeetingReminder2h => REMINDER_2H_WINDOW_HOURS,
        _ => REMINDER_24H_WINDOW_HOURS,
    };
    let context = TriggerContext::Meeting(MeetingContext {
        event_id: meeting.event_id.clone(),
        starts_at: meeting.starts_at,
        hours_before: u32::try_from(hours_before).ok(),
        location: None,
    });
    let id = jobs.create(NewFollowUpJob::new(lead.id, kind, now, context)).await?;
    Ok(jobs.get(id).await?)
}

async fn remind(executor: Arc<Executor>, lead: Lead, kind: JobKind, now: DateTime<Utc>) -> ExecutionOutcome {
    let locks = &executor.stores().locks;
    let key = lock_key(lead.id);
    let owner = Uuid::new_v4().to_string();
    match locks.acquire(&key, &owner, executor.settings().lock_ttl).await {
        Ok(true) => {},
        Ok(false) => return ExecutionOutcome::Skipped,
        Err(e) => {
            tracing::error!(lead_id = %lead.id, error = %e, "lock backend unavailable, reminder deferred");
            return ExecutionOutcome::Deferred;
        },
    }
    let created = materialize_reminder(&executor, &lead, kind, now).await;
    if let Err(e) = locks.release(&key, &owner).await {
        tracing::warn!(lead_id = %lead.id, error = %e, "lock release failed, lease will expire");
    }

    match created {
        Ok(Some(job)) => {
            tracing::debug!(job_id = %job.id, lead_id = %lead.id, kind = %kind, "reminder job created");
            executor.run(&job).await
        },
        Ok(None) => ExecutionOutcome::Skipped,
        Err(e) => {
            tracing::warn!(lead_id = %lead.id, kind = %kind, error = %e, "could not create reminder job");
            ExecutionOutcome::Deferred
        },
    }
}

/// Scans upcoming meetings and sends the reminder that is due for each.
pub struct ReminderPoller {
    executor: Arc<Executor>,
    settings: PollerSettings,
    semaphore: Arc<Semaphore>,
}

impl ReminderPoller {
    #[must_use]
    pub fn new(executor: Arc<Executor>, settings: PollerSettings) -> Self {
        let settings = PollerSettings { max_workers: settings.max_workers.max(1), ..settings };
        Self { executor, semaphore: Arc::new(Semaphore::new(settings.max_workers)), settings }
    }

    pub async fn tick(&self, now: DateTime<Utc>) -> Vec<JoinHandle<ExecutionOutcome>> {
        let horizon = now + chrono::Duration::hours(REMINDER_24H_WINDOW_HOURS);
        let leads = match self.executor.stores().leads.leads_with_meetings_between(now, horizon).await {
            Ok(leads) => leads,
            Err(e) => {
                tracing::error!(error = %e, "fetching upcoming meetings failed, retrying next tick");
                return Vec::new();
            },
        };

        let due = leads
            .into_iter()
            .filter_map(|lead| due_reminder(&lead, now).map(|kind| (lead, kind)))
            .take(self.settings.fetch_limit);

        let mut handles = Vec::new();
        for (lead, kind) in due {
            let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
                break;
            };
            let executor = Arc::clone(&self.executor);
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                remind(executor, lead, kind, now).await
            }));
        }
        if !handles.is_empty() {
            tracing::info!(dispatched = handles.len(), "dispatched meeting reminders");
        }
        handles
    }

    pub async fn run_once(&self, now: DateTime<Utc>) -> Vec<ExecutionOutcome> {
        join_all(self.tick(now).await).await
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        every_tick("reminders", self.settings.interval, &mut shutdown, || async move {
            let _handles = self.tick(Utc::now()).await;
        })
        .await;
        drain(&self.semaphore, self.settings.max_workers).await;
    }
}
