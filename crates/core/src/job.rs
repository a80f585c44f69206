//! Follow-up job model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;
use crate::lead::ReminderFlag;
use crate::trigger::TriggerContext;

/// What a follow-up job is for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobKind {
    /// First nudge after the lead went quiet.
    ReengagementImmediate,
    /// Daily nurture in the bounded sequence that follows a reengagement.
    DailyNurture,
    /// Check-in for a lead that dropped out mid-qualification.
    AbandonmentCheck,
    /// Confirmation right after a meeting was booked.
    MeetingConfirmation,
    MeetingReminder24h,
    MeetingReminder2h,
    /// Operator-scheduled message.
    Custom,
}

impl JobKind {
    pub const ALL: &'static [Self] = &[
        Self::ReengagementImmediate,
        Self::DailyNurture,
        Self::AbandonmentCheck,
        Self::MeetingConfirmation,
        Self::MeetingReminder24h,
        Self::MeetingReminder2h,
        Self::Custom,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match *self {
            Self::ReengagementImmediate => "REENGAGEMENT_IMMEDIATE",
            Self::DailyNurture => "DAILY_NURTURE",
            Self::AbandonmentCheck => "ABANDONMENT_CHECK",
            Self::MeetingConfirmation => "MEETING_CONFIRMATION",
            Self::MeetingReminder24h => "MEETING_REMINDER_24H",
            Self::MeetingReminder2h => "MEETING_REMINDER_2H",
            Self::Custom => "CUSTOM",
        }
    }

    /// Kinds that are cancelled when the lead replied after the anchor.
    #[must_use]
    pub const fn is_reengagement_class(&self) -> bool {
        matches!(*self, Self::ReengagementImmediate | Self::DailyNurture | Self::AbandonmentCheck)
    }

    /// Kinds tied to a calendar event; they skip the activity check.
    #[must_use]
    pub const fn is_meeting_class(&self) -> bool {
        matches!(
            *self,
            Self::MeetingConfirmation | Self::MeetingReminder24h | Self::MeetingReminder2h
        )
    }

    /// Flag on the lead record that guards against sending this kind twice.
    #[must_use]
    pub const fn reminder_flag(&self) -> Option<ReminderFlag> {
        match *self {
            Self::MeetingConfirmation => Some(ReminderFlag::Confirmation),
            Self::MeetingReminder24h => Some(ReminderFlag::Reminder24h),
            Self::MeetingReminder2h => Some(ReminderFlag::Reminder2h),
            _ => None,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == upper)
            .ok_or_else(|| CoreError::InvalidJobKind(s.to_owned()))
    }
}

/// Lifecycle state. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Executed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: &'static [Self] = &[Self::Pending, Self::Executed, Self::Failed, Self::Cancelled];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match *self {
            Self::Pending => "PENDING",
            Self::Executed => "EXECUTED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(*self, Self::Pending)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "EXECUTED" => Ok(Self::Executed),
            "FAILED" => Ok(Self::Failed),
            "CANCELLED" => Ok(Self::Cancelled),
            _ => Err(CoreError::InvalidJobStatus(s.to_owned())),
        }
    }
}

/// A persisted follow-up job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpJob {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub kind: JobKind,
    pub status: JobStatus,
    pub scheduled_at: DateTime<Utc>,
    pub attempt: u32,
    pub trigger_context: TriggerContext,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub error_reason: Option<String>,
    /// Provider message id reported by the notifier on delivery.
    pub delivery_id: Option<String>,
    /// Set right before the notifier is called. A claimed job is never
    /// fetched again, even if it stays PENDING.
    #[serde(default)]
    pub send_claimed_at: Option<DateTime<Utc>>,
}

impl FollowUpJob {
    /// Materialize a new pending row from a creation request.
    #[must_use]
    pub fn pending(new: NewFollowUpJob, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            lead_id: new.lead_id,
            kind: new.kind,
            status: JobStatus::Pending,
            scheduled_at: new.scheduled_at,
            attempt: new.attempt,
            trigger_context: new.trigger_context,
            created_at: now,
            executed_at: None,
            error_reason: None,
            delivery_id: None,
            send_claimed_at: None,
        }
    }

    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.send_claimed_at.is_none() && self.scheduled_at <= now
    }
}

/// Creation request for a job; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFollowUpJob {
    pub lead_id: Uuid,
    pub kind: JobKind,
    pub scheduled_at: DateTime<Utc>,
    pub attempt: u32,
    pub trigger_context: TriggerContext,
}

impl NewFollowUpJob {
    #[must_use]
    pub const fn new(
        lead_id: Uuid,
        kind: JobKind,
        scheduled_at: DateTime<Utc>,
        trigger_context: TriggerContext,
    ) -> Self {
        Self { lead_id, kind, scheduled_at, attempt: 0, trigger_context }
    }

    #[must_use]
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    /// Checks that the request may be inserted at `now`.
    ///
    /// `scheduled_at` may lie in the past by at most `grace`; the anchor of a
    /// reengagement context must be strictly older than `scheduled_at`.
    pub fn validate(&self, now: DateTime<Utc>, grace: Duration) -> Result<(), CoreError> {
        if self.scheduled_at < now - grace {
            return Err(CoreError::InvalidJob(format!(
                "scheduled_at {} is more than {}s in the past",
                self.scheduled_at.to_rfc3339(),
                grace.num_seconds()
            )));
        }
        if !self.trigger_context.fits(self.kind) {
            return Err(CoreError::InvalidJob(format!(
                "trigger context does not match kind {}",
                self.kind
            )));
        }
        if let Some(anchor) = self.trigger_context.agent_response_at() {
            if anchor >= self.scheduled_at {
                return Err(CoreError::InvalidJob(
                    "agent_response_at must be older than scheduled_at".to_owned(),
                ));
            }
        }
        Ok(())
    }
}
