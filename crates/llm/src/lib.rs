//! LLM client and message templates for the follow-up engine

pub mod ai_types;
pub mod client;
pub mod error;
mod followup;
pub mod templates;

pub use client::LlmClient;
pub use error::LlmError;
pub use followup::{build_followup_request, FollowUpPrompt};
pub use templates::render_template;
