//! Failures of a chat completion call and of reading a follow-up out of it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request to LLM endpoint failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("LLM endpoint returned {code}: {body}")]
    Status { code: u16, body: String },
    #[error("undecodable {what}: {source}")]
    Decode {
        what: String,
        #[source]
        source: serde_json::Error,
    },
    /// No choice, or a choice whose content is missing or blank.
    #[error("completion had no content")]
    NoContent,
    /// The completion parsed but the follow-up text in it was blank.
    #[error("model returned a blank follow-up")]
    BlankMessage,
    #[error("could not build HTTP client: {0}")]
    Setup(String),
    #[error("gave up after {attempts} attempts: {last}")]
    GaveUp { attempts: usize, last: Box<LlmError> },
}

impl LlmError {
    /// Failures worth another attempt: the network, rate limits and
    /// overloaded upstreams. The client retries these itself, so callers
    /// only ever see them inside `GaveUp`, which is final.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { code, .. } => matches!(code, 408 | 429 | 500 | 502 | 503 | 504 | 529),
            _ => false,
        }
    }

    /// HTTP status behind this error, looking through `GaveUp`.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { code, .. } => Some(*code),
            Self::GaveUp { last, .. } => last.status(),
            _ => None,
        }
    }
}
