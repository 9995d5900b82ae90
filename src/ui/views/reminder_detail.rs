use crate::api::types::Reminder;
use crate::ui::renderfns::{format_optional_timestamp, format_timestamp, status_color};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

/// Full content of one reminder as it was listed
pub struct ReminderDetailView {
  reminder: Reminder,
  scroll: u16,
}

impl ReminderDetailView {
  pub fn new(reminder: Reminder) -> Self {
    Self {
      reminder,
      scroll: 0,
    }
  }

  fn field<'a>(label: &'a str, value: String) -> Line<'a> {
    Line::from(vec![
      Span::styled(format!("{:<11}", label), Style::default().fg(Color::DarkGray)),
      Span::raw(value),
    ])
  }

  fn header_lines(&self) -> Vec<Line<'_>> {
    let r = &self.reminder;
    let speaker = match r.speaker.as_ref().and_then(|s| s.email.as_deref()) {
      Some(email) => format!("{} <{}>", r.speaker_label(), email),
      None => r.speaker_label(),
    };
    let event = r
      .event
      .as_ref()
      .filter(|e| !e.name.is_empty())
      .map(|e| format!("{} (#{})", e.name, e.id))
      .unwrap_or_else(|| format!("#{}", r.event_id));

    let mut lines = vec![
      Line::from(vec![
        Span::styled(format!("{:<11}", "Status"), Style::default().fg(Color::DarkGray)),
        Span::styled(
          r.status.label(),
          Style::default().fg(status_color(r.status)).bold(),
        ),
      ]),
      Self::field("Speaker", speaker),
      Self::field("Event", event),
      Self::field("Scheduled", format_timestamp(&r.scheduled_for)),
      Self::field("Sent", format_optional_timestamp(r.sent_at.as_ref())),
      Self::field("Updated", format_timestamp(&r.updated_at)),
    ];

    if let Some(err) = r.error_text() {
      lines.push(Line::from(vec![
        Span::styled(format!("{:<11}", "Error"), Style::default().fg(Color::DarkGray)),
        Span::styled(err.to_string(), Style::default().fg(Color::Red)),
      ]));
    }

    if let Err(shape) = r.validate() {
      lines.push(Line::styled(
        format!("⚠ {}", shape),
        Style::default().fg(Color::Magenta).italic(),
      ));
    }

    lines
  }
}

impl View for ReminderDetailView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.scroll = self.scroll.saturating_add(1),
      KeyCode::Char('k') | KeyCode::Up => self.scroll = self.scroll.saturating_sub(1),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let block = Block::default()
      .title(format!(" Reminder #{} ", self.reminder.id))
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let header = self.header_lines();
    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([
        Constraint::Length(header.len() as u16),
        Constraint::Length(1), // Separator
        Constraint::Length(1), // Subject
        Constraint::Min(1),    // Body
      ])
      .split(inner);

    frame.render_widget(Paragraph::new(header), chunks[0]);

    let sep = Paragraph::new("─".repeat(chunks[1].width as usize))
      .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(sep, chunks[1]);

    let subject = self.reminder.email_subject.as_deref().unwrap_or("(no subject)");
    frame.render_widget(
      Paragraph::new(subject).style(Style::default().bold()),
      chunks[2],
    );

    let body = self.reminder.email_body.as_deref().unwrap_or("No body");
    let body_para = Paragraph::new(body)
      .wrap(Wrap { trim: false })
      .scroll((self.scroll, 0));
    frame.render_widget(body_para, chunks[3]);
  }

  fn breadcrumb_label(&self) -> String {
    format!("#{}", self.reminder.id)
  }

  fn context(&self) -> Option<String> {
    Some(self.reminder.speaker_label())
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("j/k", "scroll").with_priority(20),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}
