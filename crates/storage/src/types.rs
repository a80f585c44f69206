//! Storage types shared across modules

use followup_core::JobStatus;
use serde::{Deserialize, Serialize};

/// Follow-up job counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    /// Jobs waiting for their time or for a worker.
    pub pending: u64,
    /// Jobs delivered successfully.
    pub executed: u64,
    /// Jobs that ended with a compose or send error.
    pub failed: u64,
    /// Jobs invalidated before delivery.
    pub cancelled: u64,
}

impl JobStats {
    pub(crate) fn add(&mut self, status: JobStatus, count: u64) {
        match status {
            JobStatus::Pending => self.pending += count,
            JobStatus::Executed => self.executed += count,
            JobStatus::Failed => self.failed += count,
            JobStatus::Cancelled => self.cancelled += count,
        }
    }

    #[must_use]
    pub const fn total(&self) -> u64 {
        self.pending + self.executed + self.failed + self.cancelled
    }
}
