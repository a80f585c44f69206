//! Outbound delivery: HTTP webhook to the messaging gateway, or a logging dry run.

use std::time::Duration;

use async_trait::async_trait;
use followup_core::NotifierConfig;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collaborators::{DeliveryReceipt, Notifier};
use crate::error::NotifyError;

const MAX_ERROR_BODY: usize = 500;

#[derive(Serialize)]
struct SendRequest<'a> {
    to: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct SendResponse {
    #[serde(default = "default_delivered")]
    delivered: bool,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

const fn default_delivered() -> bool {
    true
}

/// POSTs `{to, text}` to a gateway URL and expects `{delivered, id}` back.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl std::fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookNotifier")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish()
    }
}

impl WebhookNotifier {
    pub fn new(config: &NotifierConfig, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url: config.url.clone(), token: config.token.clone() })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, phone: &str, text: &str) -> Result<DeliveryReceipt, NotifyError> {
        let mut request = self.client.post(&self.url).json(&SendRequest { to: phone, text });
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body = body.chars().take(MAX_ERROR_BODY).collect();
            return Err(NotifyError::Status { code: status.as_u16(), body });
        }

        let body: SendResponse = response
            .json()
            .await
            .map_err(|e| NotifyError::InvalidResponse(e.to_string()))?;
        if !body.delivered {
            return Err(NotifyError::Rejected(
                body.error.unwrap_or_else(|| "provider reported not delivered".to_owned()),
            ));
        }
        Ok(DeliveryReceipt { delivered: true, provider_id: body.id.unwrap_or_default() })
    }
}

/// Logs messages instead of sending them.
#[derive(Debug, Default)]
pub struct DryRunNotifier;

#[async_trait]
impl Notifier for DryRunNotifier {
    async fn send(&self, phone: &str, text: &str) -> Result<DeliveryReceipt, NotifyError> {
        let provider_id = format!("dry-run-{}", Uuid::new_v4());
        tracing::info!(to = phone, %provider_id, chars = text.chars().count(), "dry run: message not sent");
        Ok(DeliveryReceipt { delivered: true, provider_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notifier(server: &MockServer) -> WebhookNotifier {
        let config = NotifierConfig {
            url: format!("{}/send", server.uri()),
            token: Some("secret".to_owned()),
        };
        WebhookNotifier::new(&config, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn posts_message_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(header("authorization", "Bearer secret"))
            .and(body_json(serde_json::json!({ "to": "+5511999990000", "text": "Hi Ana" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "delivered": true, "id": "wamid.1" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let receipt = notifier(&server).send("+5511999990000", "Hi Ana").await.unwrap();
        assert_eq!(receipt, DeliveryReceipt { delivered: true, provider_id: "wamid.1".to_owned() });
    }

    #[tokio::test]
    async fn provider_refusal_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "delivered": false, "error": "blocked" })),
            )
            .mount(&server)
            .await;

        let err = notifier(&server).send("+1", "x").await.unwrap_err();
        assert!(matches!(err, NotifyError::Rejected(ref r) if r == "blocked"));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn server_error_is_transient_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let err = notifier(&server).send("+1", "x").await.unwrap_err();
        assert!(matches!(err, NotifyError::Status { code: 503, .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn dry_run_reports_delivered() {
        let receipt = DryRunNotifier.send("+1", "hello").await.unwrap();
        assert!(receipt.delivered);
        assert!(receipt.provider_id.starts_with("dry-run-"));
    }
}
