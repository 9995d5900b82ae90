use super::input::{InputResult, TextInput};
use super::KeyResult;
use crate::commands::{self, Command};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph};

/// Events emitted by command input that parent needs to handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandEvent {
  /// Resolved command line, command word expanded to its full name
  Submitted(String),
  Cancelled,
}

/// `:` command line with autocomplete on the command word
#[derive(Debug, Clone, Default)]
pub struct CommandInput {
  input: TextInput,
  active: bool,
  selected_suggestion: usize,
}

impl CommandInput {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_active(&self) -> bool {
    self.active
  }

  pub fn activate(&mut self) {
    self.active = true;
    self.input.clear();
    self.selected_suggestion = 0;
  }

  fn deactivate(&mut self) {
    self.active = false;
    self.input.clear();
    self.selected_suggestion = 0;
  }

  pub fn suggestions(&self) -> Vec<&'static Command> {
    commands::get_suggestions(self.input.value())
  }

  /// Handle a key event.
  /// Call this regardless of active state - it handles activation too
  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<CommandEvent> {
    if !self.active {
      if key.code == KeyCode::Char(':') {
        self.activate();
        return KeyResult::Handled;
      }
      return KeyResult::NotHandled;
    }

    match key.code {
      KeyCode::Esc => {
        self.deactivate();
        return KeyResult::Event(CommandEvent::Cancelled);
      }
      KeyCode::Enter => {
        let cmd = self.resolve_command();
        self.deactivate();
        return KeyResult::Event(CommandEvent::Submitted(cmd));
      }
      KeyCode::Tab | KeyCode::Down => {
        let count = self.suggestions().len();
        if count > 0 {
          self.selected_suggestion = (self.selected_suggestion + 1) % count;
        }
        return KeyResult::Handled;
      }
      KeyCode::BackTab | KeyCode::Up => {
        let count = self.suggestions().len();
        if count > 0 {
          self.selected_suggestion = (self.selected_suggestion + count - 1) % count;
        }
        return KeyResult::Handled;
      }
      _ => {}
    }

    match self.input.handle_key(key) {
      InputResult::Consumed => {
        self.selected_suggestion = 0; // Reset on input change
        KeyResult::Handled
      }
      InputResult::Submitted(_) | InputResult::Cancelled => KeyResult::Handled,
      // Swallow everything else while the command line is open
      InputResult::NotHandled => KeyResult::Handled,
    }
  }

  /// Expand the command word to the selected suggestion, keeping arguments
  fn resolve_command(&self) -> String {
    let value = self.input.value().trim();
    let rest = value
      .split_once(char::is_whitespace)
      .map(|(_, rest)| rest.trim())
      .unwrap_or("");

    match self.suggestions().get(self.selected_suggestion) {
      Some(cmd) if rest.is_empty() => cmd.name.to_string(),
      Some(cmd) => format!("{} {}", cmd.name, rest),
      None => value.to_string(),
    }
  }

  /// Render the command overlay if active
  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    if !self.active {
      return;
    }

    let suggestions = self.suggestions();

    let width = (area.width * 70 / 100).clamp(30, 80).min(area.width);
    let suggestion_count = suggestions.len().min(8) as u16;
    // Input line, usage line, suggestions, borders
    let height = (4 + suggestion_count).min(area.height);

    let overlay_area = Rect::new(area.x + 1, area.y + 1, width.saturating_sub(1), height);
    frame.render_widget(Clear, overlay_area);

    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow))
      .title(" Command ");

    let inner = block.inner(overlay_area);
    frame.render_widget(block, overlay_area);

    if inner.height == 0 {
      return;
    }

    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([
        Constraint::Length(1), // Input line
        Constraint::Length(1), // Usage of the selected command
        Constraint::Min(0),    // Suggestions
      ])
      .split(inner);

    let value = self.input.value();
    let (before, after): (String, String) = {
      let cursor = self.input.cursor_position();
      (
        value.chars().take(cursor).collect(),
        value.chars().skip(cursor).collect(),
      )
    };
    let input_line = Line::from(vec![
      Span::styled(":", Style::default().fg(Color::Yellow)),
      Span::raw(before),
      Span::styled("_", Style::default().fg(Color::Yellow)),
      Span::raw(after),
    ]);
    frame.render_widget(Paragraph::new(input_line), chunks[0]);

    if let Some(cmd) = suggestions.get(self.selected_suggestion) {
      let usage = Paragraph::new(format!("usage: {}", cmd.usage))
        .style(Style::default().fg(Color::DarkGray).italic());
      frame.render_widget(usage, chunks[1]);
    }

    if !suggestions.is_empty() && chunks[2].height > 0 {
      let items: Vec<ListItem> = suggestions
        .iter()
        .take(8)
        .map(|cmd| {
          let line = Line::from(vec![
            Span::styled(
              format!("{:<12}", cmd.name),
              Style::default().fg(Color::Cyan),
            ),
            Span::styled(cmd.description, Style::default().fg(Color::DarkGray)),
          ]);
          ListItem::new(line)
        })
        .collect();

      let list =
        List::new(items).highlight_style(Style::default().bg(Color::DarkGray).fg(Color::White));

      let mut state = ListState::default();
      state.select(Some(self.selected_suggestion));

      frame.render_stateful_widget(list, chunks[2], &mut state);
    }
  }
}
