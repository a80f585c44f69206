//! Operator commands against the job store.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use followup_core::EngineConfig;
use followup_service::{FollowUpScheduler, Stores};
use followup_storage::StorageBackend;
use followup_storage::traits::JobStore;
use uuid::Uuid;

use crate::ScheduleKind;

/// Operator commands only make sense against the shared PostgreSQL store.
async fn open(config: &EngineConfig) -> Result<Stores> {
    let url = config
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?;
    let backend = StorageBackend::new_postgres(url).await?.with_create_grace(config.create_grace);
    Ok(Stores::from_backend(Arc::new(backend)))
}

pub(crate) async fn schedule(
    config: &EngineConfig,
    lead: Uuid,
    kind: ScheduleKind,
    at: DateTime<Utc>,
    text: Option<String>,
) -> Result<()> {
    let scheduler = FollowUpScheduler::from_config(open(config).await?, config);
    let id = match kind {
        ScheduleKind::Custom => scheduler.schedule_custom(lead, at, text).await?,
        ScheduleKind::Abandonment => {
            if text.is_some() {
                tracing::warn!("--text is ignored for abandonment checks");
            }
            scheduler.schedule_abandonment_check(lead, None, at).await?
        },
    };
    println!("{id}");
    Ok(())
}

pub(crate) async fn cancel(config: &EngineConfig, lead: Option<Uuid>, job: Option<Uuid>) -> Result<()> {
    let scheduler = FollowUpScheduler::from_config(open(config).await?, config);
    if let Some(job) = job {
        if scheduler.cancel_job(job).await? {
            println!("Cancelled job {job}");
        } else {
            println!("Job {job} is not pending");
        }
    }
    if let Some(lead) = lead {
        let cancelled = scheduler.cancel_lead(lead).await?;
        println!("Cancelled {cancelled} pending job(s) for lead {lead}");
    }
    Ok(())
}

pub(crate) async fn due(config: &EngineConfig, limit: usize) -> Result<()> {
    let stores = open(config).await?;
    let jobs = stores.jobs.fetch_due(Utc::now(), limit).await?;
    println!("{}", serde_json::to_string_pretty(&jobs)?);
    Ok(())
}

pub(crate) async fn stats(config: &EngineConfig) -> Result<()> {
    let stats = open(config).await?.jobs.stats().await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

pub(crate) async fn show(config: &EngineConfig, id: Uuid) -> Result<()> {
    match open(config).await?.jobs.get(id).await? {
        Some(job) => println!("{}", serde_json::to_string_pretty(&job)?),
        None => println!("Job not found: {id}"),
    }
    Ok(())
}
