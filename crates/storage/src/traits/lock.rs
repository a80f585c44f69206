use std::time::Duration;

use async_trait::async_trait;

use crate::error::StorageError;

/// Named lease with a TTL, shared by every worker process.
///
/// A lease whose TTL has elapsed may be taken over by another owner, so a
/// crashed holder never blocks the key for longer than `ttl`.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Try to take `key` for `owner`. Never waits; `false` means another owner holds it.
    async fn acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool, StorageError>;

    /// Drop the lease if `owner` still holds it. Returns whether a lease was removed.
    async fn release(&self, key: &str, owner: &str) -> Result<bool, StorageError>;
}
