use super::input::{InputResult, TextInput};
use super::KeyResult;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptEvent {
  Submitted(String),
  Cancelled,
}

/// One-line prompt overlay opened on demand by a view, prefilled with the
/// current value. A parse error can be shown under the input.
#[derive(Debug, Clone)]
pub struct PromptInput {
  title: &'static str,
  hint: &'static str,
  input: TextInput,
  active: bool,
  error: Option<String>,
}

impl PromptInput {
  pub fn new(title: &'static str, hint: &'static str) -> Self {
    Self {
      title,
      hint,
      input: TextInput::new(),
      active: false,
      error: None,
    }
  }

  pub fn is_active(&self) -> bool {
    self.active
  }

  pub fn open(&mut self, value: &str) {
    self.active = true;
    self.error = None;
    self.input.set_value(value);
  }

  /// Reopen after a rejected submission, keeping what was typed
  pub fn reject(&mut self, value: &str, error: String) {
    self.active = true;
    self.input.set_value(value);
    self.error = Some(error);
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<PromptEvent> {
    if !self.active {
      return KeyResult::NotHandled;
    }

    match self.input.handle_key(key) {
      InputResult::Submitted(value) => {
        self.active = false;
        KeyResult::Event(PromptEvent::Submitted(value))
      }
      InputResult::Cancelled => {
        self.active = false;
        self.error = None;
        KeyResult::Event(PromptEvent::Cancelled)
      }
      InputResult::Consumed => {
        if key.code != KeyCode::Left && key.code != KeyCode::Right {
          self.error = None;
        }
        KeyResult::Handled
      }
      InputResult::NotHandled => KeyResult::Handled,
    }
  }

  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    if !self.active {
      return;
    }

    let width = (area.width * 70 / 100).clamp(30, 90).min(area.width);
    let height = 5.min(area.height);
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 3;
    let overlay_area = Rect::new(x, y, width, height);

    frame.render_widget(Clear, overlay_area);

    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow))
      .title(format!(" {} ", self.title));
    let inner = block.inner(overlay_area);
    frame.render_widget(block, overlay_area);

    let value = self.input.value();
    let cursor = self.input.cursor_position();
    let before: String = value.chars().take(cursor).collect();
    let after: String = value.chars().skip(cursor).collect();

    let second_line = match &self.error {
      Some(err) => Line::styled(err.clone(), Style::default().fg(Color::Red)),
      None => Line::styled(self.hint, Style::default().fg(Color::DarkGray)),
    };

    let lines = vec![
      Line::from(vec![
        Span::raw(before),
        Span::styled("_", Style::default().fg(Color::Yellow)),
        Span::raw(after),
      ]),
      Line::raw(""),
      second_line,
    ];
    frame.render_widget(Paragraph::new(lines), inner);
  }
}
