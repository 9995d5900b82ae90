use crossterm::event::KeyEvent;
use ratatui::prelude::*;

/// A keyboard shortcut hint for display in the header
#[derive(Debug, Clone)]
pub struct ShortcutInfo {
  pub key: &'static str,
  pub label: &'static str,
  pub priority: u8, // Lower = shown first
}

impl ShortcutInfo {
  pub const fn new(key: &'static str, label: &'static str) -> Self {
    Self {
      key,
      label,
      priority: 100,
    }
  }

  pub const fn with_priority(mut self, priority: u8) -> Self {
    self.priority = priority;
    self
  }
}

/// Actions that a view can request in response to user input
pub enum ViewAction {
  /// No action needed
  None,
  /// Push a new view onto the stack
  Push(Box<dyn View>),
  /// Pop current view from stack (go back)
  Pop,
}

/// Trait for view behavior
///
/// Views handle their own input modes (prompts, confirmations) and return
/// actions for the App to execute: App → View → Components.
///
/// Views that load data use a cache-bound `Query<T>` and poll it in
/// `tick()`. Views that write go through a `SyncController` and receive
/// outcomes over a channel, also drained in `tick()`.
pub trait View {
  /// Handle a key event, returning an action for App to execute
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction;

  /// Render the view to the frame
  fn render(&mut self, frame: &mut Frame, area: Rect);

  /// Get the breadcrumb label for this view
  fn breadcrumb_label(&self) -> String;

  /// Short context for the header, such as the current event
  fn context(&self) -> Option<String> {
    None
  }

  /// Last outcome this view wants on the status line
  fn status(&self) -> Option<&str> {
    None
  }

  /// Whether the view is capturing text input, so global keys must pass through
  fn is_capturing_input(&self) -> bool {
    false
  }

  /// Called on each tick to allow views to poll async queries
  fn tick(&mut self) {}

  /// Keyboard shortcuts to display in the header
  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}
