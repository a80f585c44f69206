use async_trait::async_trait;
use chrono::{DateTime, Utc};
use followup_core::ConversationMessage;
use uuid::Uuid;

use crate::error::StorageError;

/// Append-only log of messages exchanged with a lead.
#[async_trait]
pub trait ConversationLog: Send + Sync {
    async fn append_message(&self, message: &ConversationMessage) -> Result<(), StorageError>;

    async fn latest_inbound_at(&self, lead_id: Uuid) -> Result<Option<DateTime<Utc>>, StorageError>;

    /// Most recent messages of a lead, newest first.
    async fn recent_messages(
        &self,
        lead_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>, StorageError>;
}
