//! Storage layer for the follow-up engine
//!
//! PostgreSQL storage (sqlx) for jobs, lead leases, lead records and the
//! conversation log, plus an in-memory backend implementing the same traits.

mod backend;
pub mod error;
mod memory;
#[cfg(feature = "postgres")]
mod pg_migrations;
#[cfg(feature = "postgres")]
pub mod pg_storage;
#[cfg(test)]
mod tests;
pub mod traits;
mod types;

pub use backend::StorageBackend;
pub use error::StorageError;
pub use memory::MemoryStorage;
#[cfg(feature = "postgres")]
pub use pg_migrations::run_pg_migrations;
#[cfg(feature = "postgres")]
pub use pg_storage::PgStorage;
pub use types::JobStats;
