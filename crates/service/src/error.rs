//! Typed errors for the service layer.
//!
//! Collaborator failures (composer, notifier, calendar) each get their own
//! enum so the executor can tell a terminal failure from one worth retrying.

use followup_core::CoreError;
use followup_llm::LlmError;
use followup_storage::StorageError;
use thiserror::Error;

/// Service-layer error unifying storage, LLM and collaborator failures.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage operation failed (DB, not found, duplicate, etc.).
    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    #[error("llm: {0}")]
    Llm(#[from] LlmError),

    #[error("compose: {0}")]
    Compose(#[from] ComposeError),

    #[error("notify: {0}")]
    Notify(#[from] NotifyError),

    #[error("calendar: {0}")]
    Calendar(#[from] CalendarError),

    /// Caller provided invalid input (unknown kind, missing lead, bad time).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Required collaborator is not configured.
    #[error("not configured: {0}")]
    NotConfigured(String),
}

impl ServiceError {
    /// Whether this error is likely transient (worth retrying).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_transient(),
            Self::Llm(e) => e.is_transient(),
            Self::Compose(e) => e.is_transient(),
            Self::Notify(e) => e.is_transient(),
            Self::Calendar(e) => e.is_transient(),
            Self::InvalidInput(_) | Self::NotConfigured(_) => false,
        }
    }

    /// Whether this error represents a not-found condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Storage(StorageError::NotFound { .. }))
    }
}

impl From<CoreError> for ServiceError {
    fn from(err: CoreError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

/// Message composition failed.
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("llm: {0}")]
    Llm(#[from] LlmError),

    /// Reading conversation context failed.
    #[error("context: {0}")]
    Context(#[from] StorageError),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("composer produced an empty message")]
    Empty,
}

impl ComposeError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Llm(e) => e.is_transient(),
            Self::Context(e) => e.is_transient(),
            Self::Timeout(_) => true,
            Self::Empty => false,
        }
    }
}

/// Outbound delivery failed.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("http request: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {code}: {body}")]
    Status { code: u16, body: String },

    /// Provider answered but refused the message.
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl NotifyError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Status { code, .. } => matches!(code, 429 | 500 | 502 | 503 | 504),
            Self::Timeout(_) => true,
            Self::Rejected(_) | Self::InvalidResponse(_) => false,
        }
    }
}

/// Calendar lookup failed.
#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("http request: {0}")]
    Http(#[from] reqwest::Error),

    #[error("calendar returned {code}: {body}")]
    Status { code: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl CalendarError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Status { code, .. } => matches!(code, 429 | 500 | 502 | 503 | 504),
            Self::InvalidResponse(_) => false,
        }
    }
}
