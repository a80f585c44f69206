use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StorageError;

/// Answers whether a lead wrote after a point in time.
#[async_trait]
pub trait ActivityOracle: Send + Sync {
    /// `true` when the lead's latest inbound message is strictly after `since`.
    /// A lead with no inbound messages has not responded.
    async fn has_responded_since(
        &self,
        lead_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<bool, StorageError>;
}
