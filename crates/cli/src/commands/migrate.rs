//! Applies the PostgreSQL schema.
//!
//! Connecting runs pending migrations, so this only needs to open the store.

use followup_core::EngineConfig;
use followup_storage::StorageBackend;

pub(crate) async fn run(config: &EngineConfig) -> anyhow::Result<()> {
    let url = config
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set for migrate"))?;
    StorageBackend::new_postgres(url).await?;
    println!("Migrations applied.");
    Ok(())
}
