//! Default message composer: LLM for reengagement, templates for everything else.

use std::sync::Arc;

use async_trait::async_trait;
use chrono_tz::Tz;
use followup_core::{FollowUpJob, Lead, MessageDirection, TriggerContext};
use followup_llm::{render_template, FollowUpPrompt, LlmClient};
use followup_storage::traits::ConversationLog;

use crate::collaborators::MessageComposer;
use crate::error::ComposeError;

/// Messages of context handed to the model.
const RECENT_MESSAGES: usize = 10;

pub struct DefaultComposer {
    llm: Option<LlmClient>,
    conversations: Arc<dyn ConversationLog>,
    tz: Tz,
    max_nurture_attempts: u32,
}

impl DefaultComposer {
    #[must_use]
    pub fn new(
        llm: Option<LlmClient>,
        conversations: Arc<dyn ConversationLog>,
        tz: Tz,
        max_nurture_attempts: u32,
    ) -> Self {
        Self { llm, conversations, tz, max_nurture_attempts }
    }

    /// Template-only composer.
    #[must_use]
    pub fn templates(conversations: Arc<dyn ConversationLog>, tz: Tz) -> Self {
        Self::new(None, conversations, tz, 0)
    }

    async fn write_with_llm(
        &self,
        llm: &LlmClient,
        lead: &Lead,
        job: &FollowUpJob,
    ) -> Result<String, ComposeError> {
        let recent = self.conversations.recent_messages(lead.id, RECENT_MESSAGES).await?;
        let from_context = match &job.trigger_context {
            TriggerContext::Reengagement(ctx) => ctx.last_agent_message.as_deref(),
            TriggerContext::Meeting(_) | TriggerContext::Custom(_) => None,
        };
        let last_agent_message = from_context.or_else(|| {
            recent
                .iter()
                .find(|m| m.direction == MessageDirection::Outbound)
                .map(|m| m.body.as_str())
        });
        let prompt = FollowUpPrompt {
            kind: job.kind,
            attempt: job.attempt,
            max_attempts: self.max_nurture_attempts,
            first_name: lead.first_name(),
            last_agent_message,
            recent: &recent,
        };
        llm.write_followup(&prompt).await.map_err(|e| {
            tracing::warn!(job_id = %job.id, upstream_status = ?e.status(), error = %e, "LLM composition failed");
            e.into()
        })
    }
}

#[async_trait]
impl MessageComposer for DefaultComposer {
    async fn compose(&self, lead: &Lead, job: &FollowUpJob) -> Result<String, ComposeError> {
        if let Some(llm) = self.llm.as_ref().filter(|_| job.kind.is_reengagement_class()) {
            tracing::debug!(job_id = %job.id, model = llm.model(), "composing with LLM");
            return self.write_with_llm(llm, lead, job).await;
        }
        Ok(render_template(job.kind, job.attempt, &job.trigger_context, lead.first_name(), self.tz))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use followup_core::{ConversationMessage, JobKind, NewFollowUpJob};
    use followup_storage::MemoryStorage;
    use uuid::Uuid;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn reengagement_job(lead_id: Uuid) -> FollowUpJob {
        let now = Utc::now();
        let new = NewFollowUpJob::new(
            lead_id,
            JobKind::ReengagementImmediate,
            now,
            TriggerContext::reengagement(now - Duration::minutes(40), None),
        );
        FollowUpJob::pending(new, now)
    }

    #[tokio::test]
    async fn templates_without_llm() {
        let storage = Arc::new(MemoryStorage::new());
        let composer = DefaultComposer::templates(storage, Tz::UTC);
        let lead = Lead::new(Uuid::new_v4(), Some("Ana Souza".to_owned()), None);
        let text = composer.compose(&lead, &reengagement_job(lead.id)).await.unwrap();
        assert!(text.starts_with("Hi Ana,"), "{text}");
    }

    #[tokio::test]
    async fn llm_sees_last_agent_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_string_contains("Want a demo on Thursday?"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "content": "{\"message\": \"Hi Ana, still keen on Thursday?\"}" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let storage = Arc::new(MemoryStorage::new());
        let lead = Lead::new(Uuid::new_v4(), Some("Ana".to_owned()), None);
        storage
            .append_message(&ConversationMessage::outbound(
                lead.id,
                "Want a demo on Thursday?",
                Utc::now() - Duration::minutes(40),
            ))
            .await
            .unwrap();
        let llm = LlmClient::new("key".to_owned(), server.uri(), "model".to_owned()).unwrap();
        let composer = DefaultComposer::new(Some(llm), storage, Tz::UTC, 3);

        let text = composer.compose(&lead, &reengagement_job(lead.id)).await.unwrap();
        assert_eq!(text, "Hi Ana, still keen on Thursday?");
    }

    #[tokio::test]
    async fn meeting_kinds_never_call_llm() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(500)).expect(0).mount(&server).await;

        let storage = Arc::new(MemoryStorage::new());
        let llm = LlmClient::new("key".to_owned(), server.uri(), "model".to_owned()).unwrap();
        let composer = DefaultComposer::new(Some(llm), storage, Tz::UTC, 3);
        let lead = Lead::new(Uuid::new_v4(), None, None);
        let now = Utc::now();
        let job = FollowUpJob::pending(
            NewFollowUpJob::new(
                lead.id,
                JobKind::MeetingReminder24h,
                now,
                TriggerContext::meeting("evt", now + Duration::hours(24)),
            ),
            now,
        );
        let text = composer.compose(&lead, &job).await.unwrap();
        assert!(text.contains("tomorrow"));
    }
}
