//! Reminder endpoints.

use serde::Serialize;
use tracing::warn;

use super::client::ApiClient;
use super::error::ApiError;
use super::types::{MessageResponse, Reminder};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TriggerRequest {
  speaker_id: i64,
}

impl ApiClient {
  /// All reminders of one event, as the backend reports them.
  pub async fn list_reminders(&self, event_id: i64) -> Result<Vec<Reminder>, ApiError> {
    let url = self.endpoint(&format!("reminders/events/{}", event_id))?;
    let reminders: Vec<Reminder> = self.get_json(url).await?;
    log_malformed(&reminders);
    Ok(reminders)
  }

  /// Ask the backend to send the next pending reminder for a speaker now.
  pub async fn trigger_reminder(&self, speaker_id: i64) -> Result<MessageResponse, ApiError> {
    let url = self.endpoint("reminders/trigger")?;
    self
      .post_json(url, Some(&TriggerRequest { speaker_id }))
      .await
  }

  /// Every failed reminder, across events.
  pub async fn list_failed_reminders(&self) -> Result<Vec<Reminder>, ApiError> {
    let url = self.endpoint("reminders/failed")?;
    let reminders: Vec<Reminder> = self.get_json(url).await?;
    log_malformed(&reminders);
    Ok(reminders)
  }

  /// Re-attempt one failed reminder.
  pub async fn retry_reminder(&self, reminder_id: i64) -> Result<MessageResponse, ApiError> {
    let url = self.endpoint(&format!("reminders/{}/retry", reminder_id))?;
    self.post_json::<_, ()>(url, None).await
  }
}

fn log_malformed(reminders: &[Reminder]) {
  for reminder in reminders {
    if let Err(e) = reminder.validate() {
      warn!(error = %e, "backend returned inconsistent reminder");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::error::ErrorKind;
  use crate::api::types::fixtures::reminder_json;
  use crate::api::types::ReminderStatus;
  use serde_json::json;
  use std::time::Duration;
  use wiremock::matchers::{body_json, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn client(server: &MockServer) -> ApiClient {
    ApiClient::with_base_url(&server.uri(), None, Duration::from_secs(5)).unwrap()
  }

  #[tokio::test]
  async fn test_list_reminders_for_event() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/reminders/events/7"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([
        reminder_json(1, 10, "pending"),
        reminder_json(2, 11, "sent"),
      ])))
      .expect(1)
      .mount(&server)
      .await;

    let reminders = client(&server).list_reminders(7).await.unwrap();
    assert_eq!(reminders.len(), 2);
    assert_eq!(reminders[0].id, 1);
    assert_eq!(reminders[1].status, ReminderStatus::Sent);
  }

  #[tokio::test]
  async fn test_list_reminders_404_classifies_as_not_implemented() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/reminders/events/7"))
      .respond_with(ResponseTemplate::new(404).set_body_string("Cannot GET"))
      .mount(&server)
      .await;

    let err = client(&server).list_reminders(7).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotImplemented);
    match err {
      ApiError::Status { body, .. } => assert_eq!(body, "Cannot GET"),
      other => panic!("unexpected error: {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_trigger_sends_speaker_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/reminders/trigger"))
      .and(body_json(json!({"speakerId": 42})))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "Reminder sent"})))
      .expect(1)
      .mount(&server)
      .await;

    let ack = client(&server).trigger_reminder(42).await.unwrap();
    assert_eq!(ack.message, "Reminder sent");
  }

  #[tokio::test]
  async fn test_trigger_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/reminders/trigger"))
      .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
      .expect(1)
      .mount(&server)
      .await;

    let err = client(&server).trigger_reminder(1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transient);
    assert_eq!(err.status().map(|s| s.as_u16()), Some(502));
  }

  #[tokio::test]
  async fn test_failed_and_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/reminders/failed"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([reminder_json(
        9, 3, "failed"
      )])))
      .mount(&server)
      .await;
    Mock::given(method("POST"))
      .and(path("/reminders/9/retry"))
      .respond_with(ResponseTemplate::new(201).set_body_json(json!({"message": "Retry queued"})))
      .expect(1)
      .mount(&server)
      .await;

    let api = client(&server);
    let failed = api.list_failed_reminders().await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].error_text(), Some("mailbox unavailable"));

    let ack = api.retry_reminder(9).await.unwrap();
    assert_eq!(ack.message, "Retry queued");
  }

  #[tokio::test]
  async fn test_unexpected_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/reminders/failed"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
      .mount(&server)
      .await;

    let err = client(&server).list_failed_reminders().await.unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)));
    assert_eq!(err.kind(), ErrorKind::Transient);
  }
}
