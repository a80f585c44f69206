//! Engine configuration loaded from `FOLLOWUP_*` environment variables.

use std::fmt;
use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::business_hours::BusinessHours;
use crate::constants::{
    DEFAULT_ACTIVITY_SKEW_SECS, DEFAULT_CALENDAR_TIMEOUT_SECS, DEFAULT_COMPOSE_TIMEOUT_SECS, DEFAULT_CREATE_GRACE_SECS,
    DEFAULT_FETCH_LIMIT, DEFAULT_LOCK_TTL_SECS, DEFAULT_MAX_NURTURE_ATTEMPTS, DEFAULT_MAX_WORKERS,
    DEFAULT_NURTURE_INTERVAL_HOURS, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_REENGAGEMENT_DELAY_MINS,
    DEFAULT_REMINDER_POLL_INTERVAL_SECS, DEFAULT_SEND_TIMEOUT_SECS, LOCK_TTL_MARGIN_SECS,
};
use crate::env_config::{non_empty, parse_with_default};
use crate::error::CoreError;

/// OpenAI-compatible chat completion endpoint used by the composer.
#[derive(Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &"[REDACTED]")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .finish()
    }
}

/// Outbound webhook that delivers chat messages.
#[derive(Clone)]
pub struct NotifierConfig {
    pub url: String,
    pub token: Option<String>,
}

impl fmt::Debug for NotifierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifierConfig")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub database_url: Option<String>,
    pub poll_interval: StdDuration,
    pub reminder_poll_interval: StdDuration,
    pub fetch_limit: usize,
    pub max_workers: usize,
    /// Always greater than `calendar_timeout + compose_timeout + send_timeout`.
    pub lock_ttl: StdDuration,
    pub compose_timeout: StdDuration,
    pub send_timeout: StdDuration,
    /// Bound on one calendar status lookup.
    pub calendar_timeout: StdDuration,
    pub create_grace: Duration,
    pub reengagement_delay: Duration,
    pub nurture_interval: Duration,
    pub max_nurture_attempts: u32,
    pub activity_skew: Duration,
    pub business_hours: BusinessHours,
    pub llm: Option<LlmConfig>,
    pub notifier: Option<NotifierConfig>,
    pub calendar_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            poll_interval: StdDuration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            reminder_poll_interval: StdDuration::from_secs(DEFAULT_REMINDER_POLL_INTERVAL_SECS),
            fetch_limit: DEFAULT_FETCH_LIMIT,
            max_workers: DEFAULT_MAX_WORKERS,
            lock_ttl: StdDuration::from_secs(DEFAULT_LOCK_TTL_SECS),
            compose_timeout: StdDuration::from_secs(DEFAULT_COMPOSE_TIMEOUT_SECS),
            send_timeout: StdDuration::from_secs(DEFAULT_SEND_TIMEOUT_SECS),
            calendar_timeout: StdDuration::from_secs(DEFAULT_CALENDAR_TIMEOUT_SECS),
            create_grace: Duration::seconds(i64::from(DEFAULT_CREATE_GRACE_SECS)),
            reengagement_delay: Duration::minutes(i64::from(DEFAULT_REENGAGEMENT_DELAY_MINS)),
            nurture_interval: Duration::hours(i64::from(DEFAULT_NURTURE_INTERVAL_HOURS)),
            max_nurture_attempts: DEFAULT_MAX_NURTURE_ATTEMPTS,
            activity_skew: Duration::seconds(i64::from(DEFAULT_ACTIVITY_SKEW_SECS)),
            business_hours: BusinessHours::default(),
            llm: None,
            notifier: None,
            calendar_url: None,
        }
    }
}

impl EngineConfig {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let num = |key: &str, default: u64| -> u64 {
            parse_with_default(key, lookup(key).as_deref(), default)
        };
        let small = |key: &str, default: u32| -> u32 {
            parse_with_default(key, lookup(key).as_deref(), default)
        };
        let count = |key: &str, default: usize| -> usize {
            parse_with_default::<usize>(key, lookup(key).as_deref(), default).max(1)
        };

        let tz = BusinessHours::parse_tz(
            &non_empty(lookup("FOLLOWUP_BUSINESS_TZ")).unwrap_or_else(|| "UTC".to_owned()),
        )?;
        let days = BusinessHours::parse_days(
            &non_empty(lookup("FOLLOWUP_BUSINESS_DAYS"))
                .unwrap_or_else(|| "mon,tue,wed,thu,fri".to_owned()),
        )?;
        let business_hours = BusinessHours::new(
            tz,
            small("FOLLOWUP_BUSINESS_START_HOUR", 9),
            small("FOLLOWUP_BUSINESS_END_HOUR", 18),
            days,
        )?;

        let llm = match (
            non_empty(lookup("FOLLOWUP_LLM_API_KEY")),
            non_empty(lookup("FOLLOWUP_LLM_API_URL")),
            non_empty(lookup("FOLLOWUP_LLM_MODEL")),
        ) {
            (Some(api_key), Some(api_url), Some(model)) => Some(LlmConfig { api_key, api_url, model }),
            (None, None, None) => None,
            _ => {
                tracing::warn!(
                    "FOLLOWUP_LLM_API_KEY, FOLLOWUP_LLM_API_URL and FOLLOWUP_LLM_MODEL must all be set; using templates"
                );
                None
            },
        };

        let notifier = non_empty(lookup("FOLLOWUP_NOTIFIER_URL")).map(|url| NotifierConfig {
            url,
            token: non_empty(lookup("FOLLOWUP_NOTIFIER_TOKEN")),
        });

        let config = Self {
            database_url: non_empty(lookup("DATABASE_URL")),
            poll_interval: StdDuration::from_secs(
                num("FOLLOWUP_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS).max(1),
            ),
            reminder_poll_interval: StdDuration::from_secs(
                num("FOLLOWUP_REMINDER_POLL_INTERVAL_SECS", DEFAULT_REMINDER_POLL_INTERVAL_SECS).max(1),
            ),
            fetch_limit: count("FOLLOWUP_FETCH_LIMIT", DEFAULT_FETCH_LIMIT),
            max_workers: count("FOLLOWUP_MAX_WORKERS", DEFAULT_MAX_WORKERS),
            lock_ttl: StdDuration::from_secs(num("FOLLOWUP_LOCK_TTL_SECS", DEFAULT_LOCK_TTL_SECS)),
            compose_timeout: StdDuration::from_secs(
                num("FOLLOWUP_COMPOSE_TIMEOUT_SECS", DEFAULT_COMPOSE_TIMEOUT_SECS).max(1),
            ),
            send_timeout: StdDuration::from_secs(
                num("FOLLOWUP_SEND_TIMEOUT_SECS", DEFAULT_SEND_TIMEOUT_SECS).max(1),
            ),
            calendar_timeout: StdDuration::from_secs(
                num("FOLLOWUP_CALENDAR_TIMEOUT_SECS", DEFAULT_CALENDAR_TIMEOUT_SECS).max(1),
            ),
            create_grace: Duration::seconds(i64::from(small(
                "FOLLOWUP_CREATE_GRACE_SECS",
                DEFAULT_CREATE_GRACE_SECS,
            ))),
            reengagement_delay: Duration::minutes(i64::from(small(
                "FOLLOWUP_REENGAGEMENT_DELAY_MINS",
                DEFAULT_REENGAGEMENT_DELAY_MINS,
            ))),
            nurture_interval: Duration::hours(i64::from(small(
                "FOLLOWUP_NURTURE_INTERVAL_HOURS",
                DEFAULT_NURTURE_INTERVAL_HOURS,
            ))),
            max_nurture_attempts: small("FOLLOWUP_MAX_NURTURE_ATTEMPTS", DEFAULT_MAX_NURTURE_ATTEMPTS),
            activity_skew: Duration::seconds(i64::from(small(
                "FOLLOWUP_ACTIVITY_SKEW_SECS",
                DEFAULT_ACTIVITY_SKEW_SECS,
            ))),
            business_hours,
            llm,
            notifier,
            calendar_url: non_empty(lookup("FOLLOWUP_CALENDAR_URL")),
        };
        Ok(config.with_safe_lock_ttl())
    }

    /// Raises `lock_ttl` above the worst-case executor runtime if needed.
    #[must_use]
    pub fn with_safe_lock_ttl(mut self) -> Self {
        let floor = self.calendar_timeout
            + self.compose_timeout
            + self.send_timeout
            + StdDuration::from_secs(LOCK_TTL_MARGIN_SECS);
        if self.lock_ttl < floor {
            tracing::warn!(
                configured_secs = self.lock_ttl.as_secs(),
                raised_secs = floor.as_secs(),
                "lock TTL shorter than calendar + compose + send timeouts, raising"
            );
            self.lock_ttl = floor;
        }
        self
    }
}
