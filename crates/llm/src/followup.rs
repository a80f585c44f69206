//! LLM-written follow-up messages.

use followup_core::sanitize::strip_code_fence;
use followup_core::{ConversationMessage, JobKind, MessageDirection};

use crate::ai_types::{ChatRequest, FollowUpJson, Message, ResponseFormat};
use crate::client::{truncate, LlmClient};
use crate::error::LlmError;

/// Longest chat excerpt copied into the prompt per message.
const MAX_EXCERPT_LEN: usize = 400;

const SYSTEM_PROMPT: &str = "You are a friendly sales assistant writing a short WhatsApp follow-up \
to a lead who stopped replying. Write one or two plain sentences, no markdown, no emojis, no \
greetings longer than the first name. Never invent prices, dates or promises. \
Return JSON: {\"message\": \"...\"}";

/// Everything the model sees about the lead and the follow-up.
#[derive(Debug)]
pub struct FollowUpPrompt<'a> {
    pub kind: JobKind,
    pub attempt: u32,
    pub max_attempts: u32,
    pub first_name: Option<&'a str>,
    pub last_agent_message: Option<&'a str>,
    /// Newest first.
    pub recent: &'a [ConversationMessage],
}

impl FollowUpPrompt<'_> {
    fn goal(&self) -> String {
        match self.kind {
            JobKind::ReengagementImmediate => {
                "The lead went quiet after the agent's last message. Gently re-open the conversation."
                    .to_owned()
            },
            JobKind::DailyNurture => format!(
                "This is nurture follow-up {} of {}. Add a small new reason to reply; \
                 the last one should politely offer to pause.",
                self.attempt, self.max_attempts
            ),
            JobKind::AbandonmentCheck => {
                "The lead stopped in the middle of answering qualification questions. \
                 Invite them to continue where they left off."
                    .to_owned()
            },
            _ => "Write a short, polite check-in.".to_owned(),
        }
    }

    fn transcript(&self) -> String {
        self.recent
            .iter()
            .rev()
            .map(|m| {
                let who = match m.direction {
                    MessageDirection::Inbound => "Lead",
                    MessageDirection::Outbound => "Agent",
                };
                format!("{who}: {}", truncate(m.body.trim(), MAX_EXCERPT_LEN))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Builds the chat request for a follow-up.
#[must_use]
pub fn build_followup_request(model: &str, prompt: &FollowUpPrompt<'_>) -> ChatRequest {
    let mut user = format!("Goal: {}\n", prompt.goal());
    if let Some(name) = prompt.first_name {
        user.push_str(&format!("Lead first name: {name}\n"));
    }
    if let Some(last) = prompt.last_agent_message.filter(|m| !m.trim().is_empty()) {
        user.push_str(&format!("Agent's last message: {}\n", truncate(last.trim(), MAX_EXCERPT_LEN)));
    }
    let transcript = prompt.transcript();
    if !transcript.is_empty() {
        user.push_str(&format!("Recent conversation (oldest first):\n{transcript}\n"));
    }

    ChatRequest {
        model: model.to_owned(),
        messages: vec![Message::system(SYSTEM_PROMPT), Message::user(user)],
        response_format: Some(ResponseFormat::json_object()),
        temperature: Some(0.7),
    }
}

/// Extracts the message from the model output.
///
/// Accepts the requested JSON object and, leniently, plain text when the model
/// ignored the format.
pub(crate) fn parse_followup_content(content: &str) -> Result<String, LlmError> {
    let stripped = strip_code_fence(content);
    let message = if stripped.starts_with('{') {
        serde_json::from_str::<FollowUpJson>(stripped)
            .map_err(|e| LlmError::Decode {
                what: format!("follow-up message (content: {})", truncate(stripped, 200)),
                source: e,
            })?
            .message
    } else {
        stripped.to_owned()
    };
    let message = message.trim().to_owned();
    if message.is_empty() {
        return Err(LlmError::BlankMessage);
    }
    Ok(message)
}

impl LlmClient {
    /// Asks the model for a follow-up message.
    ///
    /// # Errors
    /// Returns an error if the API call fails or the reply holds no message.
    pub async fn write_followup(&self, prompt: &FollowUpPrompt<'_>) -> Result<String, LlmError> {
        let request = build_followup_request(&self.model, prompt);
        let content = self.chat_completion(&request).await?;
        parse_followup_content(&content)
    }
}
