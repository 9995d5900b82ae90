//! Available `:` commands, autocomplete, and argument parsing
use crate::api::{ActivityLogFilters, FilterParseError};

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub usage: &'static str,
  pub description: &'static str,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "reminders",
    aliases: &["r", "rem", "event"],
    usage: "reminders <event id>",
    description: "Speaker reminders of an event",
  },
  Command {
    name: "failed",
    aliases: &["f", "fail"],
    usage: "failed",
    description: "Failed reminders across events",
  },
  Command {
    name: "activity",
    aliases: &["a", "logs", "audit"],
    usage: "activity [action=.. entity=.. from=.. to=.. limit=..]",
    description: "Browse the activity log",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    usage: "quit",
    description: "Exit eventdesk",
  },
];

/// A fully parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCommand {
  /// `None` falls back to the configured default event
  Reminders(Option<i64>),
  FailedReminders,
  Activity(ActivityLogFilters),
  Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
  #[error("unknown command '{0}'")]
  Unknown(String),
  #[error("'{0}' is not an event id")]
  InvalidEventId(String),
  #[error(transparent)]
  Filter(#[from] FilterParseError),
}

/// Get autocomplete suggestions for the command word of `input`
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let word = input.split_whitespace().next().unwrap_or("").to_lowercase();

  if word.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&Command, u32)> = COMMANDS
    .iter()
    .filter_map(|cmd| match_priority(cmd, &word).map(|p| (cmd, p)))
    .collect();

  // Sort by priority
  matches.sort_by_key(|(_, priority)| *priority);

  matches.into_iter().map(|(cmd, _)| cmd).collect()
}

/// Lower is better; `None` means no match
fn match_priority(cmd: &Command, word: &str) -> Option<u32> {
  if cmd.name == word {
    Some(0)
  } else if cmd.aliases.contains(&word) {
    Some(1)
  } else if cmd.name.starts_with(word) {
    Some(2)
  } else if cmd.aliases.iter().any(|a| a.starts_with(word)) {
    Some(3)
  } else if cmd.name.contains(word) {
    Some(4)
  } else {
    None
  }
}

/// Parse a submitted command line such as `reminders 12` or
/// `activity action=login limit=20`.
pub fn parse(input: &str) -> Result<ParsedCommand, CommandError> {
  let input = input.trim();
  let (word, rest) = match input.split_once(char::is_whitespace) {
    Some((word, rest)) => (word, rest.trim()),
    None => (input, ""),
  };

  let cmd = get_suggestions(word)
    .into_iter()
    .next()
    .filter(|_| !word.is_empty())
    .ok_or_else(|| CommandError::Unknown(word.to_string()))?;

  match cmd.name {
    "reminders" => {
      if rest.is_empty() {
        Ok(ParsedCommand::Reminders(None))
      } else {
        rest
          .parse()
          .map(|id| ParsedCommand::Reminders(Some(id)))
          .map_err(|_| CommandError::InvalidEventId(rest.to_string()))
      }
    }
    "failed" => Ok(ParsedCommand::FailedReminders),
    "activity" => Ok(ParsedCommand::Activity(ActivityLogFilters::parse(rest)?)),
    "quit" => Ok(ParsedCommand::Quit),
    other => Err(CommandError::Unknown(other.to_string())),
  }
}
