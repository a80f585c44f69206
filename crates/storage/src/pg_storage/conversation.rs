//! ConversationLog and ActivityOracle implementations for PgStorage.

use super::*;

use crate::traits::{ActivityOracle, ConversationLog};
use async_trait::async_trait;

#[async_trait]
impl ConversationLog for PgStorage {
    async fn append_message(&self, message: &ConversationMessage) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO lead_messages (lead_id, conversation_id, direction, body, created_at)
               VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(message.lead_id)
        .bind(message.conversation_id.as_deref())
        .bind(message.direction.as_str())
        .bind(&message.body)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_inbound_at(&self, lead_id: Uuid) -> Result<Option<DateTime<Utc>>, StorageError> {
        let latest: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT MAX(created_at) FROM lead_messages
               WHERE lead_id = $1 AND direction = 'inbound'",
        )
        .bind(lead_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(latest)
    }

    async fn recent_messages(
        &self,
        lead_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>, StorageError> {
        let rows = sqlx::query(
            "SELECT lead_id, conversation_id, direction, body, created_at
               FROM lead_messages
               WHERE lead_id = $1
               ORDER BY created_at DESC, id DESC
               LIMIT $2",
        )
        .bind(lead_id)
        .bind(usize_to_i64(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_message).collect()
    }
}

#[async_trait]
impl ActivityOracle for PgStorage {
    async fn has_responded_since(
        &self,
        lead_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let responded: bool = sqlx::query_scalar(
            "SELECT EXISTS(
               SELECT 1 FROM lead_messages
               WHERE lead_id = $1 AND direction = 'inbound' AND created_at > $2
             )",
        )
        .bind(lead_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(responded)
    }
}
