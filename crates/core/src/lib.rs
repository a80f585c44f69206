//! Core types for the follow-up engine
//!
//! This crate contains domain types and policies shared across all other crates.

mod business_hours;
mod config;
pub mod constants;
pub mod env_config;
mod error;
mod job;
mod lead;
pub mod sanitize;
mod trigger;

pub use business_hours::*;
pub use config::*;
pub use env_config::env_parse_with_default;
pub use error::*;
pub use job::*;
pub use lead::*;
pub use trigger::*;
