use thiserror::Error;

/// Errors raised while building or parsing domain values.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid job kind: {0}")]
    InvalidJobKind(String),

    #[error("invalid job status: {0}")]
    InvalidJobStatus(String),

    #[error("invalid lead status: {0}")]
    InvalidLeadStatus(String),

    #[error("invalid reminder flag: {0}")]
    InvalidReminderFlag(String),

    #[error("invalid business hours: {0}")]
    InvalidBusinessHours(String),

    #[error("invalid job: {0}")]
    InvalidJob(String),

    #[error("invalid trigger context: {0}")]
    InvalidTriggerContext(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
