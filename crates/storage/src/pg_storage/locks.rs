//! DistributedLock implementation for PgStorage.
//!
//! A lease row per key; an expired lease is overwritten in the same statement
//! that tries to take it, so acquisition never blocks.

use super::*;

use std::time::Duration;

use crate::traits::DistributedLock;
use async_trait::async_trait;

#[async_trait]
impl DistributedLock for PgStorage {
    async fn acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool, StorageError> {
        let row = sqlx::query(
            "INSERT INTO lead_locks (key, owner, expires_at)
               VALUES ($1, $2, NOW() + make_interval(secs => $3))
               ON CONFLICT (key) DO UPDATE
                 SET owner = EXCLUDED.owner, expires_at = EXCLUDED.expires_at
                 WHERE lead_locks.expires_at < NOW()
               RETURNING owner",
        )
        .bind(key)
        .bind(owner)
        .bind(ttl.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn release(&self, key: &str, owner: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM lead_locks WHERE key = $1 AND owner = $2")
            .bind(key)
            .bind(owner)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
