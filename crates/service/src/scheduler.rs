//! Creation path: turns conversation events into follow-up jobs.

use chrono::{DateTime, Duration, Utc};
use followup_core::constants::reason;
use followup_core::{
    ConversationMessage, EngineConfig, JobKind, LeadStatus, Meeting, MeetingContext,
    NewFollowUpJob, ReengagementContext, TriggerContext,
};
use followup_storage::StorageError;
use uuid::Uuid;

use crate::collaborators::Stores;
use crate::error::ServiceError;

fn lead_not_found(id: Uuid) -> ServiceError {
    ServiceError::Storage(StorageError::NotFound { entity: "lead", id: id.to_string() })
}

pub struct FollowUpScheduler {
    stores: Stores,
    reengagement_delay: Duration,
}

impl FollowUpScheduler {
    #[must_use]
    pub fn new(stores: Stores, reengagement_delay: Duration) -> Self {
        Self { stores, reengagement_delay }
    }

    #[must_use]
    pub fn from_config(stores: Stores, config: &EngineConfig) -> Self {
        Self::new(stores, config.reengagement_delay)
    }

    /// Records a lead-authored message. Pending reengagement jobs are not
    /// touched here; the executor cancels them when they come due.
    pub async fn on_lead_message(
        &self,
        lead_id: Uuid,
        conversation_id: Option<String>,
        body: &str,
        at: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let message = ConversationMessage::inbound(lead_id, body, at).in_conversation(conversation_id);
        Ok(self.stores.conversations.append_message(&message).await?)
    }

    /// Called after the agent replied. Schedules a REENGAGEMENT_IMMEDIATE
    /// nudge when the lead is still open, replacing any pending job.
    pub async fn on_agent_message(
        &self,
        lead_id: Uuid,
        conversation_id: Option<String>,
        body: Option<&str>,
        sent_at: DateTime<Utc>,
    ) -> Result<Option<Uuid>, ServiceError> {
        if let Some(body) = body {
            let message = ConversationMessage::outbound(lead_id, body, sent_at)
                .in_conversation(conversation_id.clone());
            self.stores.conversations.append_message(&message).await?;
        }

        let lead = self.stores.leads.get_lead(lead_id).await?.ok_or_else(|| lead_not_found(lead_id))?;
        if lead.status != LeadStatus::Open {
            tracing::debug!(%lead_id, status = %lead.status, "lead not open, no reengagement scheduled");
            return Ok(None);
        }

        let context = TriggerContext::Reengagement(ReengagementContext {
            agent_response_at: Some(sent_at),
            conversation_id,
            last_agent_message: body.map(str::to_owned),
        });
        let job = NewFollowUpJob::new(
            lead_id,
            JobKind::ReengagementImmediate,
            sent_at + self.reengagement_delay,
            context,
        );
        let id = self.stores.jobs.create(job).await?;
        tracing::info!(%lead_id, job_id = %id, "reengagement follow-up scheduled");
        Ok(Some(id))
    }

    /// Records the meeting, cancels pending follow-ups and queues the confirmation.
    pub async fn on_meeting_booked(
        &self,
        lead_id: Uuid,
        event_id: &str,
        starts_at: DateTime<Utc>,
        location: Option<String>,
    ) -> Result<Uuid, ServiceError> {
        let meeting = Meeting { event_id: event_id.to_owned(), starts_at };
        if !self.stores.leads.set_meeting(lead_id, &meeting).await? {
            return Err(lead_not_found(lead_id));
        }
        let cancelled = self.stores.jobs.cancel_pending(lead_id, reason::MEETING_SCHEDULED).await?;

        let context = TriggerContext::Meeting(MeetingContext {
            event_id: event_id.to_owned(),
            starts_at,
            hours_before: None,
            location,
        });
        let job = NewFollowUpJob::new(lead_id, JobKind::MeetingConfirmation, Utc::now(), context);
        let id = self.stores.jobs.create(job).await?;
        tracing::info!(%lead_id, job_id = %id, event_id, cancelled, "meeting booked, confirmation queued");
        Ok(id)
    }

    /// Drops the meeting and any meeting job still pending.
    pub async fn on_meeting_cancelled(&self, lead_id: Uuid) -> Result<usize, ServiceError> {
        if !self.stores.leads.clear_meeting(lead_id).await? {
            return Err(lead_not_found(lead_id));
        }
        Ok(self.stores.jobs.cancel_pending(lead_id, reason::EVENT_CANCELLED).await?)
    }

    /// Marks the lead CLOSED and cancels its pending jobs.
    pub async fn on_lead_closed(&self, lead_id: Uuid) -> Result<usize, ServiceError> {
        if !self.stores.leads.set_lead_status(lead_id, LeadStatus::Closed).await? {
            return Err(lead_not_found(lead_id));
        }
        let cancelled = self.stores.jobs.cancel_pending(lead_id, reason::LEAD_CLOSED).await?;
        tracing::info!(%lead_id, cancelled, "lead closed");
        Ok(cancelled)
    }

    /// Operator-scheduled message; `text` is sent verbatim when given.
    pub async fn schedule_custom(
        &self,
        lead_id: Uuid,
        at: DateTime<Utc>,
        text: Option<String>,
    ) -> Result<Uuid, ServiceError> {
        if self.stores.leads.get_lead(lead_id).await?.is_none() {
            return Err(lead_not_found(lead_id));
        }
        let job = NewFollowUpJob::new(lead_id, JobKind::Custom, at, TriggerContext::custom(text));
        Ok(self.stores.jobs.create(job).await?)
    }

    /// Nudge for a lead who stopped mid-qualification. Cancelled like any
    /// reengagement job if the lead answers after `asked_at`.
    pub async fn schedule_abandonment_check(
        &self,
        lead_id: Uuid,
        conversation_id: Option<String>,
        asked_at: DateTime<Utc>,
    ) -> Result<Uuid, ServiceError> {
        if self.stores.leads.get_lead(lead_id).await?.is_none() {
            return Err(lead_not_found(lead_id));
        }
        let job = NewFollowUpJob::new(
            lead_id,
            JobKind::AbandonmentCheck,
            asked_at + self.reengagement_delay,
            TriggerContext::reengagement(asked_at, conversation_id),
        );
        Ok(self.stores.jobs.create(job).await?)
    }

    /// Operator cancellation of everything pending for a lead.
    pub async fn cancel_lead(&self, lead_id: Uuid) -> Result<usize, ServiceError> {
        Ok(self.stores.jobs.cancel_pending(lead_id, reason::OPERATOR_CANCELLED).await?)
    }

    /// Operator cancellation of one job. `false` when it was already terminal.
    pub async fn cancel_job(&self, job_id: Uuid) -> Result<bool, ServiceError> {
        Ok(self.stores.jobs.mark_cancelled(job_id, reason::OPERATOR_CANCELLED).await?)
    }
}
