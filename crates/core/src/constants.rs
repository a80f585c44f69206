//! Shared constants for the follow-up engine.
//!
//! Centralizes defaults and reason strings used by several crates.

/// PostgreSQL connection pool: maximum connections.
pub const PG_POOL_MAX_CONNECTIONS: u32 = 20;

/// PostgreSQL connection pool: acquire timeout in seconds.
pub const PG_POOL_ACQUIRE_TIMEOUT_SECS: u64 = 10;

/// PostgreSQL connection pool: idle timeout in seconds.
pub const PG_POOL_IDLE_TIMEOUT_SECS: u64 = 300;

/// Upper bound for any listing query (CLI `due`, `pending_for_lead`).
pub const MAX_QUERY_LIMIT: usize = 1000;

/// Prefix of the per-lead execution lock key.
pub const LOCK_KEY_PREFIX: &str = "followup:";

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_REMINDER_POLL_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_FETCH_LIMIT: usize = 50;
pub const DEFAULT_MAX_WORKERS: usize = 8;
pub const DEFAULT_LOCK_TTL_SECS: u64 = 120;
pub const DEFAULT_COMPOSE_TIMEOUT_SECS: u64 = 45;
pub const DEFAULT_SEND_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_CALENDAR_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CREATE_GRACE_SECS: u32 = 300;
pub const DEFAULT_REENGAGEMENT_DELAY_MINS: u32 = 30;
pub const DEFAULT_NURTURE_INTERVAL_HOURS: u32 = 24;
pub const DEFAULT_MAX_NURTURE_ATTEMPTS: u32 = 3;
pub const DEFAULT_ACTIVITY_SKEW_SECS: u32 = 5;

/// Lock TTL headroom above the calendar, compose and send timeouts combined.
pub const LOCK_TTL_MARGIN_SECS: u64 = 15;

/// Reminder windows, in hours before the meeting.
pub const REMINDER_24H_WINDOW_HOURS: i64 = 24;
pub const REMINDER_2H_WINDOW_HOURS: i64 = 2;

/// Terminal reasons recorded in `error_reason`.
pub mod reason {
    pub const USER_RESPONDED: &str = "user_responded_before_followup";
    pub const SUPERSEDED: &str = "superseded_by_new_followup";
    pub const MEETING_SCHEDULED: &str = "meeting_scheduled";
    pub const MEETING_ALREADY_SCHEDULED: &str = "meeting_already_scheduled";
    pub const LEAD_CLOSED: &str = "lead_closed";
    pub const EVENT_CANCELLED: &str = "calendar_event_cancelled";
    pub const MEETING_CHANGED: &str = "meeting_no_longer_scheduled";
    pub const REMINDER_ALREADY_SENT: &str = "reminder_already_sent";
    pub const OPERATOR_CANCELLED: &str = "cancelled_by_operator";
    pub const LEAD_NOT_FOUND: &str = "lead-not-found";
    pub const NO_PHONE: &str = "no-phone";
    pub const COMPOSE_ERROR: &str = "compose-error";
    pub const SEND_ERROR: &str = "send-error";
    pub const EMPTY_MESSAGE: &str = "compose-error: empty message";
    pub const INTERNAL_ERROR: &str = "internal-error";
}
