//! Contracts the executor consumes, plus the bundle of storage handles it runs on.

use std::sync::Arc;

use async_trait::async_trait;
use followup_core::{CalendarEventStatus, FollowUpJob, Lead};
use followup_storage::traits::{
    ActivityOracle, ConversationLog, DistributedLock, JobStore, LeadStore,
};
use followup_storage::StorageBackend;
use serde::{Deserialize, Serialize};

use crate::error::{CalendarError, ComposeError, NotifyError};

/// Produces the outbound text for a job.
#[async_trait]
pub trait MessageComposer: Send + Sync {
    async fn compose(&self, lead: &Lead, job: &FollowUpJob) -> Result<String, ComposeError>;
}

/// Provider answer for one outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub delivered: bool,
    pub provider_id: String,
}

/// Delivers text to a phone number.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, phone: &str, text: &str) -> Result<DeliveryReceipt, NotifyError>;
}

/// Looks up the state of a calendar event referenced by a meeting job.
#[async_trait]
pub trait CalendarSource: Send + Sync {
    async fn event_status(&self, event_id: &str) -> Result<CalendarEventStatus, CalendarError>;
}

/// Storage handles shared by the executor, pollers and scheduler.
///
/// Each concern is its own trait object so tests can swap one of them out.
#[derive(Clone)]
pub struct Stores {
    pub jobs: Arc<dyn JobStore>,
    pub locks: Arc<dyn DistributedLock>,
    pub activity: Arc<dyn ActivityOracle>,
    pub leads: Arc<dyn LeadStore>,
    pub conversations: Arc<dyn ConversationLog>,
}

impl Stores {
    /// Every concern served by one backend.
    #[must_use]
    pub fn from_backend(backend: Arc<StorageBackend>) -> Self {
        Self {
            jobs: Arc::clone(&backend) as Arc<dyn JobStore>,
            locks: Arc::clone(&backend) as Arc<dyn DistributedLock>,
            activity: Arc::clone(&backend) as Arc<dyn ActivityOracle>,
            leads: Arc::clone(&backend) as Arc<dyn LeadStore>,
            conversations: backend as Arc<dyn ConversationLog>,
        }
    }
}
