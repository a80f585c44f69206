//! Follow-up sequence policy: which job, if any, comes after a delivered one.

use chrono::{DateTime, Duration, Utc};
use followup_core::{BusinessHours, EngineConfig, FollowUpJob, JobKind, NewFollowUpJob};

/// REENGAGEMENT_IMMEDIATE → DAILY_NURTURE 1 → ... → DAILY_NURTURE `max_nurture_attempts`.
#[derive(Debug, Clone)]
pub struct ChainPolicy {
    pub business_hours: BusinessHours,
    pub nurture_interval: Duration,
    pub max_nurture_attempts: u32,
}

impl ChainPolicy {
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            business_hours: config.business_hours.clone(),
            nurture_interval: config.nurture_interval,
            max_nurture_attempts: config.max_nurture_attempts,
        }
    }

    /// Next job in the sequence after `job` was delivered at `now`.
    ///
    /// The child is anchored at `now`, so a reply after this delivery cancels it.
    #[must_use]
    pub fn next_job(&self, job: &FollowUpJob, now: DateTime<Utc>) -> Option<NewFollowUpJob> {
        let attempt = match job.kind {
            JobKind::ReengagementImmediate => 1,
            JobKind::DailyNurture => job.attempt.checked_add(1)?,
            _ => return None,
        };
        if attempt > self.max_nurture_attempts {
            return None;
        }
        let scheduled_at = self.business_hours.shift_forward(now + self.nurture_interval);
        Some(
            NewFollowUpJob::new(
                job.lead_id,
                JobKind::DailyNurture,
                scheduled_at,
                job.trigger_context.reanchored(now),
            )
            .with_attempt(attempt),
        )
    }
}

impl Default for ChainPolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}
