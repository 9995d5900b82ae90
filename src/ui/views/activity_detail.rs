use crate::api::types::ActivityLogEntry;
use crate::ui::renderfns::format_timestamp;
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

/// One activity-log entry with its details payload
pub struct ActivityDetailView {
  entry: ActivityLogEntry,
  details: String,
  scroll: u16,
}

impl ActivityDetailView {
  pub fn new(entry: ActivityLogEntry) -> Self {
    let details = pretty_details(&entry);
    Self {
      entry,
      details,
      scroll: 0,
    }
  }
}

fn pretty_details(entry: &ActivityLogEntry) -> String {
  match &entry.details {
    Some(map) if !map.is_empty() => serde_json::to_string_pretty(map)
      .unwrap_or_else(|e| format!("(details could not be rendered: {})", e)),
    _ => "No details".to_string(),
  }
}

impl View for ActivityDetailView {
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
    let e = &self.entry;
    let block = Block::default()
      .title(format!(" {} ", e.action_label()))
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let label =
      |s: &'static str| Span::styled(format!("{:<11}", s), Style::default().fg(Color::DarkGray));
    let entity = match e.entity_id {
      Some(id) => format!("{} #{}", e.entity_type, id),
      None => e.entity_type.clone(),
    };
    let header = vec![
      Line::from(vec![label("When"), Span::raw(format_timestamp(&e.created_at))]),
      Line::from(vec![
        label("User"),
        Span::styled(e.user_label(), Style::default().fg(Color::Cyan)),
      ]),
      Line::from(vec![
        label("Action"),
        Span::styled(e.action.clone(), Style::default().fg(Color::Yellow)),
      ]),
      Line::from(vec![label("Entity"), Span::raw(entity)]),
      Line::from(vec![
        label("IP"),
        Span::raw(e.ip_address.clone().unwrap_or_else(|| "-".to_string())),
      ]),
      Line::from(vec![
        label("User agent"),
        Span::raw(e.user_agent.clone().unwrap_or_else(|| "-".to_string())),
      ]),
    ];

    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([
        Constraint::Length(header.len() as u16),
        Constraint::Length(1),
        Constraint::Min(1),
      ])
      .split(inner);

    frame.render_widget(Paragraph::new(header).wrap(Wrap { trim: true }), chunks[0]);

    let sep = Paragraph::new("─".repeat(chunks[1].width as usize))
      .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(sep, chunks[1]);

    let details = Paragraph::new(self.details.as_str())
      .wrap(Wrap { trim: false })
      .scroll((self.scroll, 0));
    frame.render_widget(details, chunks[2]);
  }

  fn breadcrumb_label(&self) -> String {
    format!("#{}", self.entry.id)
  }

  fn context(&self) -> Option<String> {
    Some(self.entry.user_label())
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("j/k", "scroll").with_priority(20),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}
