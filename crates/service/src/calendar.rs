//! Calendar event status lookup for meeting jobs.

use std::time::Duration;

use async_trait::async_trait;
use followup_core::CalendarEventStatus;
use serde::Deserialize;

use crate::collaborators::CalendarSource;
use crate::error::CalendarError;

#[derive(Deserialize)]
struct EventResponse {
    #[serde(default)]
    status: Option<String>,
}

fn parse_status(raw: Option<&str>) -> CalendarEventStatus {
    match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        Some("confirmed") => CalendarEventStatus::Confirmed,
        Some("tentative") => CalendarEventStatus::Tentative,
        Some("cancelled" | "canceled" | "deleted") => CalendarEventStatus::Cancelled,
        _ => CalendarEventStatus::Unknown,
    }
}

/// `GET {base_url}/events/{event_id}` returning `{"status": "..."}`.
///
/// A 404 means the event was deleted and counts as cancelled.
#[derive(Debug)]
pub struct HttpCalendarSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCalendarSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CalendarError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_owned() })
    }
}

#[async_trait]
impl CalendarSource for HttpCalendarSource {
    async fn event_status(&self, event_id: &str) -> Result<CalendarEventStatus, CalendarError> {
        let response = self
            .client
            .get(format!("{}/events/{}", self.base_url, event_id))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(CalendarEventStatus::Cancelled);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CalendarError::Status { code: status.as_u16(), body });
        }
        let event: EventResponse = response
            .json()
            .await
            .map_err(|e| CalendarError::InvalidResponse(e.to_string()))?;
        Ok(parse_status(event.status.as_deref()))
    }
}

/// Used when no calendar is configured: every event is confirmed.
#[derive(Debug, Default)]
pub struct AssumeConfirmed;

#[async_trait]
impl CalendarSource for AssumeConfirmed {
    async fn event_status(&self, _event_id: &str) -> Result<CalendarEventStatus, CalendarError> {
        Ok(CalendarEventStatus::Confirmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn status_parsing() {
        assert_eq!(parse_status(Some("Confirmed")), CalendarEventStatus::Confirmed);
        assert_eq!(parse_status(Some("canceled")), CalendarEventStatus::Cancelled);
        assert_eq!(parse_status(Some("rescheduled")), CalendarEventStatus::Unknown);
        assert_eq!(parse_status(None), CalendarEventStatus::Unknown);
    }

    #[tokio::test]
    async fn reads_event_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/events/evt-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "status": "cancelled" })),
            )
            .mount(&server)
            .await;

        let source = HttpCalendarSource::new(&server.uri(), Duration::from_secs(5)).unwrap();
        assert_eq!(source.event_status("evt-1").await.unwrap(), CalendarEventStatus::Cancelled);
    }

    #[tokio::test]
    async fn missing_event_is_cancelled() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(404)).mount(&server).await;

        let source = HttpCalendarSource::new(&server.uri(), Duration::from_secs(5)).unwrap();
        assert_eq!(source.event_status("gone").await.unwrap(), CalendarEventStatus::Cancelled);
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(502)).mount(&server).await;

        let source = HttpCalendarSource::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let err = source.event_status("evt").await.unwrap_err();
        assert!(err.is_transient());
    }
}
