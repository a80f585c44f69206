//! Per-job pipeline: lock → validate → compose → sanitize → send → finalize → chain.
//!
//! Every failure is contained to the job it happened in. Infrastructure
//! errors that look transient before the send leave the job PENDING for
//! the next tick; everything else ends in a terminal status written with
//! compare-and-set. Once the notifier has been called the job is claimed
//! and is never picked up again.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use followup_core::constants::{reason, LOCK_KEY_PREFIX};
use followup_core::sanitize::{sanitize_outbound, DEFAULT_MAX_LINES};
use followup_core::{ConversationMessage, EngineConfig, FollowUpJob, Lead, LeadStatus};
use followup_storage::StorageError;
use uuid::Uuid;

use crate::calendar::AssumeConfirmed;
use crate::chain::ChainPolicy;
use crate::collaborators::{CalendarSource, MessageComposer, Notifier, Stores};
use crate::error::{ComposeError, ServiceError};

/// Where in the pipeline an execution stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStage {
    Fetched,
    Locked,
    Validated,
    Composed,
    Sent,
    Finalized,
}

impl ExecutionStage {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match *self {
            Self::Fetched => "fetched",
            Self::Locked => "locked",
            Self::Validated => "validated",
            Self::Composed => "composed",
            Self::Sent => "sent",
            Self::Finalized => "finalized",
        }
    }
}

impl fmt::Display for ExecutionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one [`Executor::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Another worker holds the lead lock.
    Skipped,
    /// The job was no longer PENDING when this worker got to it.
    AlreadyFinalized,
    /// Transient infrastructure failure; the job stays PENDING.
    Deferred,
    Cancelled(String),
    Failed(String),
    Executed { delivery_id: Option<String>, next_job: Option<Uuid> },
    /// Delivered, but the EXECUTED write kept failing. The job stays
    /// claimed and PENDING and needs an operator.
    Unrecorded { delivery_id: Option<String> },
}

impl ExecutionOutcome {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match *self {
            Self::Skipped => "skipped",
            Self::AlreadyFinalized => "already_finalized",
            Self::Deferred => "deferred",
            Self::Cancelled(_) => "cancelled",
            Self::Failed(_) => "failed",
            Self::Executed { .. } => "executed",
            Self::Unrecorded { .. } => "unrecorded",
        }
    }

    #[must_use]
    pub const fn is_executed(&self) -> bool {
        matches!(*self, Self::Executed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub lock_ttl: Duration,
    pub compose_timeout: Duration,
    pub send_timeout: Duration,
    /// A lead message counts as a reply only this long after the anchor.
    pub activity_skew: chrono::Duration,
    pub max_lines: usize,
    pub chain: ChainPolicy,
}

impl ExecutorSettings {
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            lock_ttl: config.lock_ttl,
            compose_timeout: config.compose_timeout,
            send_timeout: config.send_timeout,
            activity_skew: config.activity_skew,
            max_lines: DEFAULT_MAX_LINES,
            chain: ChainPolicy::from_config(config),
        }
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Lock key guarding every execution for one lead.
#[must_use]
pub fn lock_key(lead_id: Uuid) -> String {
    format!("{LOCK_KEY_PREFIX}{lead_id}")
}

/// Backoff between EXECUTED write attempts after a delivery.
const FINALIZE_RETRY_DELAYS: [Duration; 2] = [Duration::from_millis(100), Duration::from_millis(500)];

fn with_detail(reason: &str, detail: impl fmt::Display) -> String {
    format!("{reason}: {detail}")
}

pub struct Executor {
    stores: Stores,
    composer: Arc<dyn MessageComposer>,
    notifier: Arc<dyn Notifier>,
    calendar: Arc<dyn CalendarSource>,
    settings: ExecutorSettings,
}

impl Executor {
    #[must_use]
    pub fn new(
        stores: Stores,
        composer: Arc<dyn MessageComposer>,
        notifier: Arc<dyn Notifier>,
        settings: ExecutorSettings,
    ) -> Self {
        Self { stores, composer, notifier, calendar: Arc::new(AssumeConfirmed), settings }
    }

    #[must_use]
    pub fn with_calendar(mut self, calendar: Arc<dyn CalendarSource>) -> Self {
        self.calendar = calendar;
        self
    }

    #[must_use]
    pub const fn stores(&self) -> &Stores {
        &self.stores
    }

    #[must_use]
    pub const fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Runs one job under its lead lock. Never fails: errors end up in the
    /// returned outcome and, when terminal, in the job row.
    pub async fn run(&self, job: &FollowUpJob) -> ExecutionOutcome {
        let key = lock_key(job.lead_id);
        let owner = Uuid::new_v4().to_string();

        match self.stores.locks.acquire(&key, &owner, self.settings.lock_ttl).await {
            Ok(true) => {
                tracing::debug!(job_id = %job.id, stage = %ExecutionStage::Locked, "lead lock acquired");
            },
            Ok(false) => {
                tracing::debug!(job_id = %job.id, lead_id = %job.lead_id, "lead locked by another worker, skipping");
                return ExecutionOutcome::Skipped;
            },
            Err(e) => {
                tracing::error!(
                    job_id = %job.id,
                    stage = %ExecutionStage::Fetched,
                    error = %e,
                    "lock backend unavailable, job stays pending"
                );
                return ExecutionOutcome::Deferred;
            },
        }

        let outcome = match self.execute(job).await {
            Ok(outcome) => outcome,
            Err(e) => self.contain(job, e).await,
        };

        if let Err(e) = self.stores.locks.release(&key, &owner).await {
            tracing::warn!(lead_id = %job.lead_id, error = %e, "lock release failed, lease will expire");
        }

        match &outcome {
            ExecutionOutcome::Executed { delivery_id, next_job } => tracing::info!(
                job_id = %job.id,
                lead_id = %job.lead_id,
                kind = %job.kind,
                stage = %ExecutionStage::Finalized,
                outcome = outcome.as_str(),
                delivery_id = delivery_id.as_deref().unwrap_or(""),
                next_job = ?next_job,
                "follow-up delivered"
            ),
            ExecutionOutcome::Cancelled(reason) | ExecutionOutcome::Failed(reason) => tracing::info!(
                job_id = %job.id,
                lead_id = %job.lead_id,
                kind = %job.kind,
                outcome = outcome.as_str(),
                reason = %reason,
                "follow-up finalized without delivery"
            ),
            ExecutionOutcome::Unrecorded { delivery_id } => tracing::error!(
                job_id = %job.id,
                lead_id = %job.lead_id,
                kind = %job.kind,
                stage = %ExecutionStage::Sent,
                outcome = outcome.as_str(),
                delivery_id = delivery_id.as_deref().unwrap_or(""),
                "follow-up delivered but not recorded, job parked"
            ),
            _ => tracing::debug!(job_id = %job.id, outcome = outcome.as_str(), "follow-up not finalized"),
        }
        outcome
    }

    async fn execute(&self, fetched: &FollowUpJob) -> Result<ExecutionOutcome, ServiceError> {
        // The fetched copy may be stale by the time the lock is ours.
        let Some(job) = self.stores.jobs.get(fetched.id).await? else {
            return Ok(ExecutionOutcome::AlreadyFinalized);
        };
        if job.status.is_terminal() {
            return Ok(ExecutionOutcome::AlreadyFinalized);
        }

        let Some(lead) = self.stores.leads.get_lead(job.lead_id).await? else {
            return self.fail(&job, reason::LEAD_NOT_FOUND.to_owned()).await;
        };
        if let Some(reason) = precheck(&job, &lead) {
            return self.cancel(&job, reason).await;
        }
        if job.kind.is_reengagement_class() && self.lead_replied(&job).await? {
            return self.cancel(&job, reason::USER_RESPONDED).await;
        }
        if job.kind.is_meeting_class() && self.event_cancelled(&job).await? {
            return self.cancel(&job, reason::EVENT_CANCELLED).await;
        }
        let Some(phone) = lead.phone.as_deref().map(str::trim).filter(|p| !p.is_empty()) else {
            return self.fail(&job, reason::NO_PHONE.to_owned()).await;
        };
        tracing::debug!(job_id = %job.id, stage = %ExecutionStage::Validated, "job validated");

        let composed =
            match tokio::time::timeout(self.settings.compose_timeout, self.composer.compose(&lead, &job)).await {
                Ok(Ok(text)) => text,
                Ok(Err(ComposeError::Context(e))) if e.is_transient() => return Err(e.into()),
                Ok(Err(e)) => {
                    tracing::warn!(job_id = %job.id, stage = %ExecutionStage::Validated, error = %e, "compose failed");
                    return self.fail(&job, with_detail(reason::COMPOSE_ERROR, e)).await;
                },
                Err(_) => {
                    let e = ComposeError::Timeout(self.settings.compose_timeout);
                    tracing::warn!(job_id = %job.id, stage = %ExecutionStage::Validated, error = %e, "compose failed");
                    return self.fail(&job, with_detail(reason::COMPOSE_ERROR, e)).await;
                },
            };
        let text = sanitize_outbound(&composed, self.settings.max_lines);
        if text.is_empty() {
            return self.fail(&job, reason::EMPTY_MESSAGE.to_owned()).await;
        }
        tracing::debug!(job_id = %job.id, stage = %ExecutionStage::Composed, chars = text.chars().count(), "message composed");

        if let Some(flag) = job.kind.reminder_flag() {
            // Claimed before sending: a crash after delivery must not resend.
            if !self.stores.leads.claim_reminder_flag(lead.id, flag, Utc::now()).await? {
                return self.cancel(&job, reason::REMINDER_ALREADY_SENT).await;
            }
        }

        if !self.stores.jobs.claim_send(job.id).await? {
            return Ok(ExecutionOutcome::AlreadyFinalized);
        }

        let receipt = match tokio::time::timeout(self.settings.send_timeout, self.notifier.send(phone, &text)).await {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(e)) => {
                tracing::warn!(job_id = %job.id, stage = %ExecutionStage::Composed, error = %e, "send failed");
                return self.fail(&job, with_detail(reason::SEND_ERROR, e)).await;
            },
            Err(_) => {
                tracing::warn!(job_id = %job.id, stage = %ExecutionStage::Composed, "send timed out");
                let detail = format!("timed out after {:?}", self.settings.send_timeout);
                return self.fail(&job, with_detail(reason::SEND_ERROR, detail)).await;
            },
        };
        if !receipt.delivered {
            return self.fail(&job, with_detail(reason::SEND_ERROR, "not delivered")).await;
        }
        let sent_at = Utc::now();
        tracing::debug!(job_id = %job.id, stage = %ExecutionStage::Sent, provider_id = %receipt.provider_id, "message sent");

        let outbound = ConversationMessage::outbound(lead.id, text, sent_at)
            .in_conversation(job.trigger_context.conversation_id().map(str::to_owned));
        if let Err(e) = self.stores.conversations.append_message(&outbound).await {
            tracing::warn!(job_id = %job.id, error = %e, "failed to log delivered follow-up");
        }

        let delivery_id = Some(receipt.provider_id).filter(|id| !id.is_empty());
        match self.finalize(&job, delivery_id.as_deref()).await {
            Ok(true) => {},
            Ok(false) => {
                tracing::warn!(job_id = %job.id, stage = %ExecutionStage::Sent, "job finalized elsewhere while sending");
                return Ok(ExecutionOutcome::AlreadyFinalized);
            },
            Err(e) => {
                tracing::error!(job_id = %job.id, stage = %ExecutionStage::Sent, error = %e, "could not mark delivered job executed");
                return Ok(ExecutionOutcome::Unrecorded { delivery_id });
            },
        }

        let next_job = match self.settings.chain.next_job(&job, sent_at) {
            Some(next) => match self.stores.jobs.create(next).await {
                Ok(id) => Some(id),
                Err(e) => {
                    tracing::error!(job_id = %job.id, error = %e, "failed to schedule next follow-up");
                    None
                },
            },
            None => None,
        };
        Ok(ExecutionOutcome::Executed { delivery_id, next_job })
    }

    /// EXECUTED write for a delivered job, retried while the error is transient.
    async fn finalize(&self, job: &FollowUpJob, delivery_id: Option<&str>) -> Result<bool, StorageError> {
        for delay in FINALIZE_RETRY_DELAYS {
            match self.stores.jobs.mark_executed(job.id, delivery_id).await {
                Err(e) if e.is_transient() => {
                    tracing::warn!(job_id = %job.id, error = %e, retry_in = ?delay, "EXECUTED write failed, retrying");
                    tokio::time::sleep(delay).await;
                },
                other => return other,
            }
        }
        self.stores.jobs.mark_executed(job.id, delivery_id).await
    }

    async fn lead_replied(&self, job: &FollowUpJob) -> Result<bool, ServiceError> {
        // No anchor means no way to tell; send anyway.
        let Some(anchor) = job.trigger_context.agent_response_at() else {
            return Ok(false);
        };
        Ok(self.stores.activity.has_responded_since(job.lead_id, anchor + self.settings.activity_skew).await?)
    }

    async fn event_cancelled(&self, job: &FollowUpJob) -> Result<bool, ServiceError> {
        let Some(event_id) = job.trigger_context.event_id() else {
            return Ok(false);
        };
        match self.calendar.event_status(event_id).await {
            Ok(status) => Ok(status.is_cancelled()),
            Err(e) if e.is_transient() => Err(e.into()),
            Err(e) => {
                tracing::warn!(job_id = %job.id, event_id, error = %e, "calendar lookup failed, assuming event is on");
                Ok(false)
            },
        }
    }

    async fn cancel(&self, job: &FollowUpJob, reason: &str) -> Result<ExecutionOutcome, ServiceError> {
        if self.stores.jobs.mark_cancelled(job.id, reason).await? {
            Ok(ExecutionOutcome::Cancelled(reason.to_owned()))
        } else {
            Ok(ExecutionOutcome::AlreadyFinalized)
        }
    }

    async fn fail(&self, job: &FollowUpJob, reason: String) -> Result<ExecutionOutcome, ServiceError> {
        if self.stores.jobs.mark_failed(job.id, &reason).await? {
            Ok(ExecutionOutcome::Failed(reason))
        } else {
            Ok(ExecutionOutcome::AlreadyFinalized)
        }
    }

    async fn contain(&self, job: &FollowUpJob, err: ServiceError) -> ExecutionOutcome {
        if err.is_transient() {
            tracing::warn!(job_id = %job.id, error = %err, "transient failure, job stays pending");
            return ExecutionOutcome::Deferred;
        }
        tracing::error!(job_id = %job.id, error = %err, "job failed");
        match self.fail(job, with_detail(reason::INTERNAL_ERROR, &err)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "could not record job failure");
                ExecutionOutcome::Deferred
            },
        }
    }
}

/// Lead-state checks that cancel a job before any external call.
fn precheck(job: &FollowUpJob, lead: &Lead) -> Option<&'static str> {
    if lead.status == LeadStatus::Closed {
        return Some(reason::LEAD_CLOSED);
    }
    if job.kind.is_reengagement_class() && lead.status == LeadStatus::MeetingScheduled {
        return Some(reason::MEETING_ALREADY_SCHEDULED);
    }
    if job.kind.is_meeting_class() {
        let current = lead.meeting.as_ref().map(|m| m.event_id.as_str());
        if current.is_none() || current != job.trigger_context.event_id() {
            return Some(reason::MEETING_CHANGED);
        }
    }
    None
}
