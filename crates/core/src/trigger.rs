//! Immutable snapshot of the state that justified scheduling a job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::job::JobKind;

/// State captured when a reengagement-class job was scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReengagementContext {
    /// Timestamp of the outbound agent message that started the inactivity clock.
    /// Absent means the staleness check is skipped and the job is sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_response_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Last thing the agent said, handed to the composer for continuity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_agent_message: Option<String>,
}

/// Calendar event a meeting job refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingContext {
    pub event_id: String,
    pub starts_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours_before: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Operator-scheduled message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomContext {
    /// Literal text to send; when absent the composer writes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Per-kind trigger context. Stored as a JSON object tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerContext {
    Reengagement(ReengagementContext),
    Meeting(MeetingContext),
    Custom(CustomContext),
}

impl TriggerContext {
    #[must_use]
    pub fn reengagement(agent_response_at: DateTime<Utc>, conversation_id: Option<String>) -> Self {
        Self::Reengagement(ReengagementContext {
            agent_response_at: Some(agent_response_at),
            conversation_id,
            last_agent_message: None,
        })
    }

    #[must_use]
    pub fn meeting(event_id: impl Into<String>, starts_at: DateTime<Utc>) -> Self {
        Self::Meeting(MeetingContext {
            event_id: event_id.into(),
            starts_at,
            hours_before: None,
            location: None,
        })
    }

    #[must_use]
    pub fn custom(text: Option<String>) -> Self {
        Self::Custom(CustomContext { text, note: None })
    }

    /// Anchor of the inactivity check, if this context carries one.
    #[must_use]
    pub fn agent_response_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Reengagement(ctx) => ctx.agent_response_at,
            Self::Meeting(_) | Self::Custom(_) => None,
        }
    }

    #[must_use]
    pub fn event_id(&self) -> Option<&str> {
        match self {
            Self::Meeting(ctx) => Some(ctx.event_id.as_str()),
            Self::Reengagement(_) | Self::Custom(_) => None,
        }
    }

    #[must_use]
    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            Self::Reengagement(ctx) => ctx.conversation_id.as_deref(),
            Self::Meeting(_) | Self::Custom(_) => None,
        }
    }

    /// Whether this context variant is the one `kind` expects.
    #[must_use]
    pub const fn fits(&self, kind: JobKind) -> bool {
        match self {
            Self::Reengagement(_) => kind.is_reengagement_class(),
            Self::Meeting(_) => kind.is_meeting_class(),
            Self::Custom(_) => matches!(kind, JobKind::Custom),
        }
    }

    /// Copy of this context re-anchored at `at`, used when chaining the next job.
    #[must_use]
    pub fn reanchored(&self, at: DateTime<Utc>) -> Self {
        match self {
            Self::Reengagement(ctx) => Self::Reengagement(ReengagementContext {
                agent_response_at: Some(at),
                conversation_id: ctx.conversation_id.clone(),
                last_agent_message: None,
            }),
            other => other.clone(),
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value, CoreError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_json(value: &serde_json::Value) -> Result<Self, CoreError> {
        serde_json::from_value(value.clone())
            .map_err(|e| CoreError::InvalidTriggerContext(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn serializes_with_type_tag() {
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        let ctx = TriggerContext::reengagement(at, Some("conv-1".to_owned()));
        let json = ctx.to_json().unwrap();
        assert_eq!(json["type"], "reengagement");
        assert_eq!(json["conversation_id"], "conv-1");
        assert!(json.get("last_agent_message").is_none());
        assert_eq!(TriggerContext::from_json(&json).unwrap(), ctx);
    }

    #[test]
    fn missing_anchor_parses_as_none() {
        let json = serde_json::json!({ "type": "reengagement" });
        let ctx = TriggerContext::from_json(&json).unwrap();
        assert_eq!(ctx.agent_response_at(), None);
    }

    #[test]
    fn rejects_unknown_variant() {
        let json = serde_json::json!({ "type": "webinar", "event_id": "x" });
        assert!(TriggerContext::from_json(&json).is_err());
    }

    #[test]
    fn fits_matches_kind_families() {
        let now = Utc::now();
        let reeng = TriggerContext::reengagement(now, None);
        let meeting = TriggerContext::meeting("evt", now);
        assert!(reeng.fits(JobKind::DailyNurture));
        assert!(!reeng.fits(JobKind::MeetingReminder2h));
        assert!(meeting.fits(JobKind::MeetingConfirmation));
        assert!(!meeting.fits(JobKind::Custom));
        assert!(TriggerContext::custom(None).fits(JobKind::Custom));
    }

    #[test]
    fn reanchoring_keeps_conversation() {
        let t0 = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2026, 3, 3, 10, 0, 0).unwrap();
        let ctx = TriggerContext::Reengagement(ReengagementContext {
            agent_response_at: Some(t0),
            conversation_id: Some("c".to_owned()),
            last_agent_message: Some("hi".to_owned()),
        });
        let next = ctx.reanchored(t1);
        assert_eq!(next.agent_response_at(), Some(t1));
        assert_eq!(next.conversation_id(), Some("c"));
    }
}
