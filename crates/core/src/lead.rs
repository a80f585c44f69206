//! Lead (qualification record) and conversation log types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadStatus {
    /// Still in conversation; eligible for reengagement follow-ups.
    #[default]
    Open,
    MeetingScheduled,
    Closed,
}

impl LeadStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match *self {
            Self::Open => "OPEN",
            Self::MeetingScheduled => "MEETING_SCHEDULED",
            Self::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Ok(Self::Open),
            "MEETING_SCHEDULED" => Ok(Self::MeetingScheduled),
            "CLOSED" => Ok(Self::Closed),
            _ => Err(CoreError::InvalidLeadStatus(s.to_owned())),
        }
    }
}

/// "Already sent" markers on the qualification record.
///
/// Written before the send attempt completes so a retried job never resends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReminderFlag {
    Confirmation,
    Reminder24h,
    Reminder2h,
}

impl ReminderFlag {
    /// Column on the `leads` table that stores this flag.
    #[must_use]
    pub const fn column(&self) -> &'static str {
        match *self {
            Self::Confirmation => "confirmation_sent_at",
            Self::Reminder24h => "reminder_24h_sent_at",
            Self::Reminder2h => "reminder_2h_sent_at",
        }
    }
}

impl FromStr for ReminderFlag {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmation" => Ok(Self::Confirmation),
            "reminder_24h" => Ok(Self::Reminder24h),
            "reminder_2h" => Ok(Self::Reminder2h),
            other => Err(CoreError::InvalidReminderFlag(other.to_owned())),
        }
    }
}

/// Meeting booked for a lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meeting {
    pub event_id: String,
    pub starts_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub name: Option<String>,
    /// E.164 phone number the notifier delivers to.
    pub phone: Option<String>,
    pub status: LeadStatus,
    pub meeting: Option<Meeting>,
    pub confirmation_sent_at: Option<DateTime<Utc>>,
    pub reminder_24h_sent_at: Option<DateTime<Utc>>,
    pub reminder_2h_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    #[must_use]
    pub fn new(id: Uuid, name: Option<String>, phone: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            phone,
            status: LeadStatus::Open,
            meeting: None,
            confirmation_sent_at: None,
            reminder_24h_sent_at: None,
            reminder_2h_sent_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn flag(&self, flag: ReminderFlag) -> Option<DateTime<Utc>> {
        match flag {
            ReminderFlag::Confirmation => self.confirmation_sent_at,
            ReminderFlag::Reminder24h => self.reminder_24h_sent_at,
            ReminderFlag::Reminder2h => self.reminder_2h_sent_at,
        }
    }

    pub fn set_flag(&mut self, flag: ReminderFlag, at: DateTime<Utc>) {
        match flag {
            ReminderFlag::Confirmation => self.confirmation_sent_at = Some(at),
            ReminderFlag::Reminder24h => self.reminder_24h_sent_at = Some(at),
            ReminderFlag::Reminder2h => self.reminder_2h_sent_at = Some(at),
        }
    }

    pub fn clear_flags(&mut self) {
        self.confirmation_sent_at = None;
        self.reminder_24h_sent_at = None;
        self.reminder_2h_sent_at = None;
    }

    #[must_use]
    pub fn first_name(&self) -> Option<&str> {
        self.name.as_deref().and_then(|n| n.split_whitespace().next())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageDirection {
    /// Authored by the lead.
    Inbound,
    /// Authored by the agent or this engine.
    Outbound,
}

impl MessageDirection {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match *self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

impl FromStr for MessageDirection {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inbound" => Ok(Self::Inbound),
            "outbound" => Ok(Self::Outbound),
            other => Err(CoreError::InvalidJob(format!("unknown message direction: {other}"))),
        }
    }
}

/// One entry of a lead's conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub lead_id: Uuid,
    pub conversation_id: Option<String>,
    pub direction: MessageDirection,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl ConversationMessage {
    #[must_use]
    pub fn inbound(lead_id: Uuid, body: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            lead_id,
            conversation_id: None,
            direction: MessageDirection::Inbound,
            body: body.into(),
            created_at,
        }
    }

    #[must_use]
    pub fn outbound(lead_id: Uuid, body: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            lead_id,
            conversation_id: None,
            direction: MessageDirection::Outbound,
            body: body.into(),
            created_at,
        }
    }

    #[must_use]
    pub fn in_conversation(mut self, conversation_id: Option<String>) -> Self {
        self.conversation_id = conversation_id;
        self
    }
}

/// State of a calendar event as reported by the calendar source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CalendarEventStatus {
    Confirmed,
    Tentative,
    Cancelled,
    /// Source could not say; treated like confirmed.
    Unknown,
}

impl CalendarEventStatus {
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(*self, Self::Cancelled)
    }
}
