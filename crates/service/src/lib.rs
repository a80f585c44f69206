//! Follow-up engine service layer
//!
//! Executor, pollers, chaining policy, creation path and the collaborator
//! contracts (composer, notifier, calendar) they run against.

#![allow(missing_docs, reason = "Internal crate with self-explanatory API")]
#![allow(clippy::missing_errors_doc, reason = "Errors are self-explanatory from Result types")]
#![allow(missing_debug_implementations, reason = "Internal types")]
#![allow(clippy::missing_docs_in_private_items, reason = "Internal crate")]
#![allow(clippy::implicit_return, reason = "Implicit return is idiomatic Rust")]
#![allow(clippy::question_mark_used, reason = "? operator is idiomatic Rust")]
#![allow(clippy::cognitive_complexity, reason = "Complex async flows are inherent")]
#![allow(clippy::min_ident_chars, reason = "Short error vars are idiomatic")]
#![allow(clippy::let_underscore_untyped, reason = "Type is clear from context")]

mod calendar;
mod chain;
mod collaborators;
mod composer;
pub mod error;
mod executor;
mod notifier;
mod poller;
mod scheduler;
#[cfg(test)]
mod tests;

pub use calendar::{AssumeConfirmed, HttpCalendarSource};
pub use chain::ChainPolicy;
pub use collaborators::{CalendarSource, DeliveryReceipt, MessageComposer, Notifier, Stores};
pub use composer::DefaultComposer;
pub use error::{CalendarError, ComposeError, NotifyError, ServiceError};
pub use executor::{lock_key, ExecutionOutcome, ExecutionStage, Executor, ExecutorSettings};
pub use notifier::{DryRunNotifier, WebhookNotifier};
pub use poller::{due_reminder, Poller, PollerSettings, ReminderPoller};
pub use scheduler::FollowUpScheduler;
