use crate::api::ApiClient;
use crate::cache::QueryCache;
use crate::commands::{self, ParsedCommand};
use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::ui;
use crate::ui::components::{CommandEvent, CommandInput, KeyResult};
use crate::ui::view::{View, ViewAction};
use crate::ui::views::{ActivityLogView, FailedReminderListView, ReminderListView};
use crate::ui::ViewContext;
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::{stdout, Stdout};
use std::time::Duration;

/// Main application state
pub struct App {
  /// Navigation stack - root is always at index 0
  views: Vec<Box<dyn View>>,

  /// `:` command line
  command: CommandInput,

  /// Handles shared by every view
  ctx: ViewContext,

  title: String,
  default_event: Option<i64>,

  /// App-level message, e.g. a rejected command
  message: Option<String>,

  should_quit: bool,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let ctx = ViewContext::new(
      ApiClient::new(&config)?,
      QueryCache::new().with_stale_time(config.query.stale_time()),
      config.query.retry_policy(),
    );

    let root: Box<dyn View> = match config.default_event {
      Some(event_id) => Box::new(ReminderListView::new(event_id, &ctx)),
      None => Box::new(FailedReminderListView::new(&ctx)),
    };

    Ok(Self {
      views: vec![root],
      command: CommandInput::new(),
      ctx,
      title: config.display_title(),
      default_event: config.default_event,
      message: None,
      should_quit: false,
    })
  }

  pub async fn run(&mut self) -> Result<()> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = self.event_loop(&mut terminal).await;

    // Restore the terminal even when the loop failed
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
  }

  async fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    let mut events = EventHandler::new(Duration::from_millis(250));

    while !self.should_quit {
      terminal.draw(|frame| ui::draw(frame, self))?;

      match events.next().await {
        Some(event) => self.handle_event(event),
        None => break,
      }
    }

    Ok(())
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Tick => {
        if let Some(view) = self.views.last_mut() {
          view.tick();
        }
      }
      Event::Resize => {} // Next draw picks up the new size
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    // Views with an open prompt get every key
    let capturing = self
      .views
      .last()
      .map(|v| v.is_capturing_input())
      .unwrap_or(false);

    if !capturing {
      match self.command.handle_key(key) {
        KeyResult::Handled => return,
        KeyResult::Event(CommandEvent::Submitted(line)) => {
          self.execute_command(&line);
          return;
        }
        KeyResult::Event(CommandEvent::Cancelled) => return,
        KeyResult::NotHandled => {}
      }
    }

    self.message = None;
    let action = match self.views.last_mut() {
      Some(view) => view.handle_key(key),
      None => ViewAction::None,
    };
    self.apply(action);
  }

  fn apply(&mut self, action: ViewAction) {
    match action {
      ViewAction::None => {}
      ViewAction::Push(view) => self.views.push(view),
      ViewAction::Pop => {
        if self.views.len() > 1 {
          self.views.pop();
        } else {
          self.should_quit = true;
        }
      }
    }
  }

  fn execute_command(&mut self, line: &str) {
    let parsed = match commands::parse(line) {
      Ok(parsed) => parsed,
      Err(e) => {
        self.message = Some(e.to_string());
        return;
      }
    };
    tracing::debug!(command = ?parsed, "executing command");

    let root: Box<dyn View> = match parsed {
      ParsedCommand::Reminders(event_id) => match event_id.or(self.default_event) {
        Some(event_id) => Box::new(ReminderListView::new(event_id, &self.ctx)),
        None => {
          self.message = Some("usage: reminders <event id>".to_string());
          return;
        }
      },
      ParsedCommand::FailedReminders => Box::new(FailedReminderListView::new(&self.ctx)),
      ParsedCommand::Activity(filters) => Box::new(ActivityLogView::new(filters, &self.ctx)),
      ParsedCommand::Quit => {
        self.should_quit = true;
        return;
      }
    };

    self.message = None;
    self.views = vec![root];
  }

  pub fn title(&self) -> &str {
    &self.title
  }

  pub fn current_view(&self) -> Option<&dyn View> {
    self.views.last().map(|v| v.as_ref())
  }

  pub fn current_view_mut(&mut self) -> Option<&mut Box<dyn View>> {
    self.views.last_mut()
  }

  pub fn command_input(&self) -> &CommandInput {
    &self.command
  }

  pub fn breadcrumb(&self) -> Vec<String> {
    self.views.iter().map(|v| v.breadcrumb_label()).collect()
  }

  /// App message first, then the current view's last outcome
  pub fn status(&self) -> Option<&str> {
    self
      .message
      .as_deref()
      .or_else(|| self.views.last().and_then(|v| v.status()))
  }
}
