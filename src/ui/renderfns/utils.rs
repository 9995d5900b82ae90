use crate::api::types::ReminderStatus;
use chrono::{DateTime, Local, Utc};
use ratatui::prelude::Color;

/// Truncate a string to at most `max_len` characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

pub fn status_color(status: ReminderStatus) -> Color {
  match status {
    ReminderStatus::Sent => Color::Green,
    ReminderStatus::Pending => Color::Yellow,
    ReminderStatus::Failed => Color::Red,
  }
}

/// Render a timestamp in the local timezone, minute precision
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
  ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

pub fn format_optional_timestamp(ts: Option<&DateTime<Utc>>) -> String {
  ts.map(format_timestamp).unwrap_or_else(|| "-".to_string())
}
