//! Storage backend trait abstraction
//!
//! Async domain traits for the follow-up engine's persistent state. Both the
//! PostgreSQL and in-memory backends implement every trait.

pub mod activity;
pub mod conversation;
pub mod job;
pub mod lead;
pub mod lock;

pub use activity::ActivityOracle;
pub use conversation::ConversationLog;
pub use job::JobStore;
pub use lead::LeadStore;
pub use lock::DistributedLock;
