use crate::api::types::Reminder;
use crate::ui::renderfns::{format_optional_timestamp, format_timestamp, status_color, truncate};
use ratatui::prelude::*;
use ratatui::widgets::ListItem;

/// Which optional columns a reminder list shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderColumns {
  /// Scoped to one event: speaker first, no event column
  Speaker,
  /// Across events: event column before the speaker
  EventAndSpeaker,
}

/// Build one list row. `sending` marks the row whose write is in flight.
pub fn reminder_row(reminder: &Reminder, columns: ReminderColumns, sending: bool) -> ListItem<'static> {
  let marker = if sending {
    Span::styled("» ", Style::default().fg(Color::Magenta).bold())
  } else if reminder.validate().is_err() {
    Span::styled("! ", Style::default().fg(Color::Red).bold())
  } else {
    Span::raw("  ")
  };

  let mut spans = vec![marker];

  if columns == ReminderColumns::EventAndSpeaker {
    let event = reminder
      .event
      .as_ref()
      .filter(|e| !e.name.is_empty())
      .map(|e| e.name.clone())
      .unwrap_or_else(|| format!("event #{}", reminder.event_id));
    spans.push(Span::styled(
      format!("{:<18}", truncate(&event, 18)),
      Style::default().fg(Color::Blue),
    ));
    spans.push(Span::raw(" "));
  }

  spans.extend([
    Span::styled(
      format!("{:<22}", truncate(&reminder.speaker_label(), 22)),
      Style::default().fg(Color::Cyan),
    ),
    Span::raw(" "),
    Span::styled(
      format!("{:<8}", reminder.status.label()),
      Style::default().fg(status_color(reminder.status)),
    ),
    Span::raw(" "),
    Span::raw(format_timestamp(&reminder.scheduled_for)),
    Span::raw("  "),
    Span::styled(
      format!("{:<16}", format_optional_timestamp(reminder.sent_at.as_ref())),
      Style::default().fg(Color::DarkGray),
    ),
    Span::raw("  "),
  ]);

  let tail = match (columns, reminder.error_text()) {
    (ReminderColumns::EventAndSpeaker, Some(err)) => {
      Span::styled(truncate(err, 50), Style::default().fg(Color::Red))
    }
    _ => Span::raw(truncate(
      reminder.email_subject.as_deref().unwrap_or("-"),
      50,
    )),
  };
  spans.push(tail);

  ListItem::new(Line::from(spans))
}
