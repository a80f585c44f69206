//! JobStore implementation for PgStorage.

use super::*;

use crate::traits::JobStore;
use crate::types::JobStats;
use async_trait::async_trait;
use followup_core::constants::reason;
use followup_core::NewFollowUpJob;

const FINISH_SQL: &str = "UPDATE followup_jobs
       SET status = $2, executed_at = NOW(), error_reason = $3, delivery_id = $4
       WHERE id = $1 AND status = 'PENDING'";

impl PgStorage {
    /// Compare-and-set from PENDING; `false` when the job was already terminal.
    async fn finish(
        &self,
        id: Uuid,
        status: JobStatus,
        reason: Option<&str>,
        delivery_id: Option<&str>,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(FINISH_SQL)
            .bind(id)
            .bind(status.as_str())
            .bind(reason)
            .bind(delivery_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl JobStore for PgStorage {
    async fn create(&self, job: NewFollowUpJob) -> Result<Uuid, StorageError> {
        let now = Utc::now();
        job.validate(now, self.create_grace)?;
        let row = FollowUpJob::pending(job, now);
        let context = row.trigger_context.to_json()?;
        let attempt = i32::try_from(row.attempt)
            .map_err(|_| StorageError::Validation(format!("attempt {} out of range", row.attempt)))?;

        let mut tx = self.pool.begin().await?;
        // Serializes concurrent creates for the same lead until commit.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(row.lead_id.to_string())
            .execute(&mut *tx)
            .await?;
        let superseded = sqlx::query(
            "UPDATE followup_jobs
               SET status = 'CANCELLED', executed_at = NOW(), error_reason = $2
               WHERE lead_id = $1 AND status = 'PENDING'",
        )
        .bind(row.lead_id)
        .bind(reason::SUPERSEDED)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        sqlx::query(
            "INSERT INTO followup_jobs
               (id, lead_id, kind, status, scheduled_at, attempt, trigger_context, created_at)
               VALUES ($1, $2, $3, 'PENDING', $4, $5, $6, $7)",
        )
        .bind(row.id)
        .bind(row.lead_id)
        .bind(row.kind.as_str())
        .bind(row.scheduled_at)
        .bind(attempt)
        .bind(context)
        .bind(row.created_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        if superseded > 0 {
            tracing::debug!(lead_id = %row.lead_id, superseded, "cancelled previous pending jobs");
        }
        Ok(row.id)
    }

    async fn cancel_pending(&self, lead_id: Uuid, reason: &str) -> Result<usize, StorageError> {
        let result = sqlx::query(
            "UPDATE followup_jobs
               SET status = 'CANCELLED', executed_at = NOW(), error_reason = $2
               WHERE lead_id = $1 AND status = 'PENDING'",
        )
        .bind(lead_id)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(rows_to_usize(result.rows_affected()))
    }

    async fn fetch_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<FollowUpJob>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM followup_jobs
               WHERE status = 'PENDING' AND send_claimed_at IS NULL AND scheduled_at <= $1
               ORDER BY scheduled_at ASC, created_at ASC
               LIMIT $2"
        ))
        .bind(now)
        .bind(usize_to_i64(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_job).collect()
    }

    async fn claim_send(&self, id: Uuid) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE followup_jobs SET send_claimed_at = NOW()
               WHERE id = $1 AND status = 'PENDING' AND send_claimed_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_executed(
        &self,
        id: Uuid,
        delivery_id: Option<&str>,
    ) -> Result<bool, StorageError> {
        self.finish(id, JobStatus::Executed, None, delivery_id).await
    }

    async fn mark_failed(&self, id: Uuid, reason: &str) -> Result<bool, StorageError> {
        self.finish(id, JobStatus::Failed, Some(reason), None).await
    }

    async fn mark_cancelled(&self, id: Uuid, reason: &str) -> Result<bool, StorageError> {
        self.finish(id, JobStatus::Cancelled, Some(reason), None).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<FollowUpJob>, StorageError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM followup_jobs WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_job).transpose()
    }

    async fn pending_for_lead(&self, lead_id: Uuid) -> Result<Vec<FollowUpJob>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM followup_jobs
               WHERE lead_id = $1 AND status = 'PENDING'
               ORDER BY scheduled_at ASC"
        ))
        .bind(lead_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_job).collect()
    }

    async fn exists_for_event(
        &self,
        lead_id: Uuid,
        kind: JobKind,
        event_id: &str,
    ) -> Result<bool, StorageError> {
        let row = sqlx::query(
            "SELECT EXISTS (
               SELECT 1 FROM followup_jobs
                 WHERE lead_id = $1 AND kind = $2 AND trigger_context->>'event_id' = $3
             ) AS found",
        )
        .bind(lead_id)
        .bind(kind.as_str())
        .bind(event_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("found")?)
    }

    async fn stats(&self) -> Result<JobStats, StorageError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM followup_jobs GROUP BY status")
            .fetch_all(&self.pool)
            .await?;
        let mut stats = JobStats::default();
        for row in &rows {
            let status: String = row.try_get("status")?;
            let count: i64 = row.try_get("n")?;
            let status = status
                .parse::<JobStatus>()
                .map_err(|e| StorageError::corrupt("followup_jobs.status", e))?;
            stats.add(status, u64::try_from(count).unwrap_or(0));
        }
        Ok(stats)
    }
}
