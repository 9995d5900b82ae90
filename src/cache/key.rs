//! Query keys addressing cached reads.

use sha2::{Digest, Sha256};

use crate::api::ActivityLogFilters;

/// A key identifying one cached read (resource + parameters).
pub trait QueryKey {
  /// Stable, fixed-length hash used as the cache slot id
  fn cache_hash(&self) -> String;

  /// Human readable description for logs
  fn description(&self) -> String;
}

/// Reads issued against the event backend.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ApiQueryKey {
  /// Reminders of one event
  EventReminders { event_id: i64 },
  /// Failed reminders across events
  FailedReminders,
  /// Activity log page for a filter set
  ActivityLogs { filters: ActivityLogFilters },
}

impl ApiQueryKey {
  pub fn resource(&self) -> &'static str {
    match self {
      Self::EventReminders { .. } => "event_reminders",
      Self::FailedReminders => "failed_reminders",
      Self::ActivityLogs { .. } => "activity_logs",
    }
  }

  fn canonical(&self) -> String {
    match self {
      Self::EventReminders { event_id } => format!("{}:{}", self.resource(), event_id),
      Self::FailedReminders => self.resource().to_string(),
      Self::ActivityLogs { filters } => {
        format!("{}:{}", self.resource(), filters.to_query_string())
      }
    }
  }
}

impl QueryKey for ApiQueryKey {
  fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.canonical().as_bytes());
    hex::encode(hasher.finalize())
  }

  fn description(&self) -> String {
    match self {
      Self::EventReminders { event_id } => format!("reminders for event {}", event_id),
      Self::FailedReminders => "failed reminders".to_string(),
      Self::ActivityLogs { filters } => {
        if filters.is_empty() {
          "activity log".to_string()
        } else {
          format!("activity log: {}", filters.to_prompt())
        }
      }
    }
  }
}
