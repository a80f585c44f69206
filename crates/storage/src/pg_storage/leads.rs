//! LeadStore implementation for PgStorage.

use super::*;

use crate::traits::LeadStore;
use async_trait::async_trait;
use followup_core::ReminderFlag;

#[async_trait]
impl LeadStore for PgStorage {
    async fn upsert_lead(&self, lead: &Lead) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO leads (id, name, phone, status, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $5)
               ON CONFLICT (id) DO UPDATE
                 SET name = EXCLUDED.name, phone = EXCLUDED.phone, updated_at = NOW()",
        )
        .bind(lead.id)
        .bind(lead.name.as_deref())
        .bind(lead.phone.as_deref())
        .bind(lead.status.as_str())
        .bind(lead.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, StorageError> {
        let row = sqlx::query(&format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_lead).transpose()
    }

    async fn set_lead_status(&self, id: Uuid, status: LeadStatus) -> Result<bool, StorageError> {
        let result = sqlx::query("UPDATE leads SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_meeting(&self, id: Uuid, meeting: &Meeting) -> Result<bool, StorageError> {
        // SET expressions see the old row, so flags reset only when the meeting changed.
        let result = sqlx::query(
            "UPDATE leads SET
               confirmation_sent_at = CASE WHEN meeting_event_id IS DISTINCT FROM $2
                   OR meeting_starts_at IS DISTINCT FROM $3 THEN NULL ELSE confirmation_sent_at END,
               reminder_24h_sent_at = CASE WHEN meeting_event_id IS DISTINCT FROM $2
                   OR meeting_starts_at IS DISTINCT FROM $3 THEN NULL ELSE reminder_24h_sent_at END,
               reminder_2h_sent_at = CASE WHEN meeting_event_id IS DISTINCT FROM $2
                   OR meeting_starts_at IS DISTINCT FROM $3 THEN NULL ELSE reminder_2h_sent_at END,
               meeting_event_id = $2,
               meeting_starts_at = $3,
               status = 'MEETING_SCHEDULED',
               updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(&meeting.event_id)
        .bind(meeting.starts_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_meeting(&self, id: Uuid) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE leads SET
               meeting_event_id = NULL,
               meeting_starts_at = NULL,
               confirmation_sent_at = NULL,
               reminder_24h_sent_at = NULL,
               reminder_2h_sent_at = NULL,
               status = CASE WHEN status = 'CLOSED' THEN 'CLOSED' ELSE 'OPEN' END,
               updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn claim_reminder_flag(
        &self,
        id: Uuid,
        flag: ReminderFlag,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let column = flag.column();
        let result = sqlx::query(&format!(
            "UPDATE leads SET {column} = $2, updated_at = NOW() WHERE id = $1 AND {column} IS NULL"
        ))
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM leads WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        if exists { Ok(false) } else { Err(lead_not_found(id)) }
    }

    async fn leads_with_meetings_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Lead>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {LEAD_COLUMNS} FROM leads
               WHERE status = 'MEETING_SCHEDULED'
                 AND meeting_starts_at >= $1 AND meeting_starts_at < $2
               ORDER BY meeting_starts_at ASC"
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_lead).collect()
    }
}
