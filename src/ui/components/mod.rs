mod command_input;
mod input;
mod prompt_input;
mod reminder_rows;

pub use command_input::{CommandEvent, CommandInput};
pub use prompt_input::{PromptEvent, PromptInput};
pub use reminder_rows::{reminder_row, ReminderColumns};

/// Generic result type for component key handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyResult<T> {
  /// Key was consumed, no event for parent to handle
  Handled,
  /// Key was consumed, here's an event for parent to process
  Event(T),
  /// Key was not consumed, parent should try next handler
  NotHandled,
}
