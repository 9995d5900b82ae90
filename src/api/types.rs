//! Data shapes returned by the event backend.
//!
//! Field names follow the backend's camelCase JSON; timestamps are ISO-8601
//! strings parsed into UTC.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;

/// Delivery state of a reminder. Transitions happen on the backend only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderStatus {
  Pending,
  Sent,
  Failed,
}

impl ReminderStatus {
  pub fn label(&self) -> &'static str {
    match self {
      ReminderStatus::Pending => "pending",
      ReminderStatus::Sent => "sent",
      ReminderStatus::Failed => "failed",
    }
  }
}

impl fmt::Display for ReminderStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeakerSummary {
  pub id: i64,
  #[serde(default)]
  pub name: String,
  pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
  pub id: i64,
  #[serde(default)]
  pub name: String,
}

/// A scheduled or sent notification e-mail for a speaker.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
  pub id: i64,
  pub event_id: i64,
  pub speaker_id: Option<i64>,
  #[serde(alias = "scheduledAt")]
  pub scheduled_for: DateTime<Utc>,
  pub status: ReminderStatus,
  pub sent_at: Option<DateTime<Utc>>,
  pub email_subject: Option<String>,
  pub email_body: Option<String>,
  pub error_message: Option<String>,
  /// Older backends report failures here
  pub failure_reason: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  #[serde(default)]
  pub speaker: Option<SpeakerSummary>,
  #[serde(default)]
  pub event: Option<EventSummary>,
}

/// Reminder fields that contradict its status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReminderShapeError {
  #[error("reminder {0} is sent but has no sentAt")]
  SentWithoutTimestamp(i64),
  #[error("reminder {0} has sentAt but status is {1}")]
  TimestampWithoutSent(i64, ReminderStatus),
  #[error("reminder {0} failed without an error message")]
  FailedWithoutError(i64),
  #[error("reminder {0} carries an error message but status is {1}")]
  ErrorWithoutFailure(i64, ReminderStatus),
}

impl Reminder {
  /// Error text to show for this reminder. The current `errorMessage`
  /// wins over the legacy `failureReason`.
  pub fn error_text(&self) -> Option<&str> {
    non_empty(self.error_message.as_deref()).or_else(|| non_empty(self.failure_reason.as_deref()))
  }

  /// Check the status invariants: sent ⟺ sentAt, failed ⟺ error text.
  pub fn validate(&self) -> Result<(), ReminderShapeError> {
    let sent = self.status == ReminderStatus::Sent;
    let failed = self.status == ReminderStatus::Failed;

    match (sent, self.sent_at.is_some()) {
      (true, false) => return Err(ReminderShapeError::SentWithoutTimestamp(self.id)),
      (false, true) => {
        return Err(ReminderShapeError::TimestampWithoutSent(
          self.id,
          self.status,
        ))
      }
      _ => {}
    }

    match (failed, self.error_text().is_some()) {
      (true, false) => Err(ReminderShapeError::FailedWithoutError(self.id)),
      (false, true) => Err(ReminderShapeError::ErrorWithoutFailure(
        self.id,
        self.status,
      )),
      _ => Ok(()),
    }
  }

  /// Name to show for the speaker, falling back to the raw id.
  pub fn speaker_label(&self) -> String {
    match (&self.speaker, self.speaker_id) {
      (Some(s), _) if !s.name.is_empty() => s.name.clone(),
      (_, Some(id)) => format!("speaker #{}", id),
      _ => "-".to_string(),
    }
  }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
  s.filter(|s| !s.trim().is_empty())
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
  pub id: i64,
  #[serde(default)]
  pub name: String,
  pub email: Option<String>,
}

/// Immutable audit record of something a user did.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLogEntry {
  pub id: i64,
  pub user_id: i64,
  /// Free-form, usually a verb_noun token like `update_event`
  pub action: String,
  pub entity_type: String,
  pub entity_id: Option<i64>,
  pub details: Option<Map<String, Value>>,
  pub ip_address: Option<String>,
  pub user_agent: Option<String>,
  pub created_at: DateTime<Utc>,
  #[serde(default)]
  pub user: Option<UserSummary>,
}

impl ActivityLogEntry {
  pub fn user_label(&self) -> String {
    match &self.user {
      Some(u) if !u.name.is_empty() => u.name.clone(),
      _ => format!("user #{}", self.user_id),
    }
  }

  /// `update_event` -> `update event`
  pub fn action_label(&self) -> String {
    self.action.replace('_', " ")
  }
}

/// Acknowledgement returned by trigger and retry calls.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageResponse {
  pub message: String,
}

#[cfg(test)]
pub(crate) mod fixtures {
  use super::*;
  use serde_json::json;

  pub fn reminder_json(id: i64, speaker_id: i64, status: &str) -> Value {
    let mut v = json!({
      "id": id,
      "eventId": 7,
      "speakerId": speaker_id,
      "scheduledFor": "2024-05-01T09:00:00Z",
      "status": status,
      "emailSubject": "Your talk is tomorrow",
      "emailBody": "See you there",
      "createdAt": "2024-04-01T09:00:00Z",
      "updatedAt": "2024-04-01T09:00:00Z"
    });
    match status {
      "sent" => v["sentAt"] = json!("2024-05-01T09:00:05Z"),
      "failed" => v["errorMessage"] = json!("mailbox unavailable"),
      _ => {}
    }
    v
  }

  pub fn reminder(id: i64, speaker_id: i64, status: &str) -> Reminder {
    serde_json::from_value(reminder_json(id, speaker_id, status)).unwrap()
  }
}
