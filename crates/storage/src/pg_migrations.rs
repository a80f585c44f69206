//! PostgreSQL schema migrations for the follow-up engine.

use sqlx::PgPool;

use crate::error::StorageError;

/// Run all PostgreSQL migrations. Every statement is idempotent.
pub async fn run_pg_migrations(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS followup_jobs (
            id UUID PRIMARY KEY,
            lead_id UUID NOT NULL,
            kind TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'PENDING'
                CHECK (status IN ('PENDING', 'EXECUTED', 'FAILED', 'CANCELLED')),
            scheduled_at TIMESTAMPTZ NOT NULL,
            attempt INTEGER NOT NULL DEFAULT 0 CHECK (attempt >= 0),
            trigger_context JSONB NOT NULL DEFAULT '{}',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            executed_at TIMESTAMPTZ,
            error_reason TEXT,
            delivery_id TEXT,
            send_claimed_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("ALTER TABLE followup_jobs ADD COLUMN IF NOT EXISTS send_claimed_at TIMESTAMPTZ")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_followup_status_scheduled ON followup_jobs (status, scheduled_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_followup_lead_status ON followup_jobs (lead_id, status)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_followup_lead_kind_event
           ON followup_jobs (lead_id, kind, (trigger_context->>'event_id'))",
    )
    .execute(pool)
    .await?;

    // Backstop for the single-active-job rule enforced by `create`.
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_followup_one_pending
           ON followup_jobs (lead_id) WHERE status = 'PENDING'",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lead_locks (
            key TEXT PRIMARY KEY,
            owner TEXT NOT NULL,
            expires_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS leads (
            id UUID PRIMARY KEY,
            name TEXT,
            phone TEXT,
            status TEXT NOT NULL DEFAULT 'OPEN'
                CHECK (status IN ('OPEN', 'MEETING_SCHEDULED', 'CLOSED')),
            meeting_event_id TEXT,
            meeting_starts_at TIMESTAMPTZ,
            confirmation_sent_at TIMESTAMPTZ,
            reminder_24h_sent_at TIMESTAMPTZ,
            reminder_2h_sent_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_leads_meeting_starts
           ON leads (meeting_starts_at) WHERE meeting_starts_at IS NOT NULL",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lead_messages (
            id BIGSERIAL PRIMARY KEY,
            lead_id UUID NOT NULL,
            conversation_id TEXT,
            direction TEXT NOT NULL CHECK (direction IN ('inbound', 'outbound')),
            body TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_lead_messages_latest
           ON lead_messages (lead_id, direction, created_at DESC)",
    )
    .execute(pool)
    .await?;

    tracing::debug!("PostgreSQL migrations applied");
    Ok(())
}
