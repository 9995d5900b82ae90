use super::{OutcomeChannel, ReminderDetailView};
use crate::api::types::Reminder;
use crate::cache::ApiQueryKey;
use crate::query::{Query, QueryState};
use crate::sync::{SyncController, SyncOutcome};
use crate::ui::components::{reminder_row, ReminderColumns};
use crate::ui::ensure_valid_selection;
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::ViewContext;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

/// Failed reminders across all events, with retry
pub struct FailedReminderListView {
  query: Query<Vec<Reminder>>,
  sync: SyncController,
  outcomes: OutcomeChannel,
  list_state: ListState,
}

impl FailedReminderListView {
  pub fn new(ctx: &ViewContext) -> Self {
    let key = ApiQueryKey::FailedReminders;

    let api = ctx.api.clone();
    let mut query = Query::keyed(&key, ctx.cache.clone(), move || {
      let api = api.clone();
      async move { api.list_failed_reminders().await }
    })
    .with_retry(ctx.retry)
    .with_stale_time(ctx.cache.stale_time());

    query.fetch();

    Self {
      query,
      sync: ctx.sync.clone(),
      outcomes: OutcomeChannel::new(),
      list_state: ListState::default(),
    }
  }

  fn reminders(&self) -> &[Reminder] {
    self.query.data().map(|v| v.as_slice()).unwrap_or(&[])
  }

  fn refuse_if_busy(&mut self) -> bool {
    if !self.sync.is_busy() {
      return false;
    }
    if let Some(message) = SyncOutcome::Busy.status_message() {
      self.outcomes.set(message);
    }
    true
  }

  fn retry_selected(&mut self) {
    if self.refuse_if_busy() {
      return;
    }
    let Some((id, event_id)) = self
      .list_state
      .selected()
      .and_then(|idx| self.reminders().get(idx))
      .map(|r| (r.id, r.event_id))
    else {
      return;
    };

    let sync = self.sync.clone();
    self
      .outcomes
      .spawn(async move { sync.retry_one(id, event_id).await.status_message() });
  }

  fn retry_all(&mut self) {
    if self.refuse_if_busy() {
      return;
    }
    let targets: Vec<(i64, i64)> = self
      .reminders()
      .iter()
      .map(|r| (r.id, r.event_id))
      .collect();
    if targets.is_empty() {
      return;
    }

    let sync = self.sync.clone();
    self
      .outcomes
      .spawn(async move { sync.retry_all(&targets).await.status_message() });
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.reminders().len();
    ensure_valid_selection(&mut self.list_state, len);

    let sending = self.sync.state();
    let title = match self.query.state() {
      QueryState::Loading => " Failed reminders (loading...) ".to_string(),
      QueryState::Error(e) if !e.is_not_implemented() => {
        format!(" Failed reminders (error: {}) ", e)
      }
      _ if sending.is_busy() => " Failed reminders (retrying...) ".to_string(),
      _ => format!(" Failed reminders ({}) ", len),
    };

    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Red));

    if self.reminders().is_empty() && !self.query.is_loading() {
      let content = match self.query.error() {
        Some(e) if e.is_not_implemented() => "Reminder retries are not available yet.",
        Some(_) => "Failed to load reminders. Press 'r' to retry.",
        None => "No failed reminders.",
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let in_flight = sending.in_flight();
    let items: Vec<ListItem> = self
      .reminders()
      .iter()
      .map(|r| reminder_row(r, ReminderColumns::EventAndSpeaker, in_flight == Some(r.id)))
      .collect();

    let list = List::new(items)
      .block(block)
      .highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut self.list_state);
  }
}

impl View for FailedReminderListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Char('R') => self.retry_selected(),
      KeyCode::Char('A') => self.retry_all(),
      KeyCode::Enter => {
        if let Some(reminder) = self
          .list_state
          .selected()
          .and_then(|idx| self.reminders().get(idx))
        {
          return ViewAction::Push(Box::new(ReminderDetailView::new(reminder.clone())));
        }
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_list(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    "Failed".to_string()
  }

  fn status(&self) -> Option<&str> {
    self.outcomes.last()
  }

  fn tick(&mut self) {
    if self.query.is_stale() {
      self.query.refetch();
    }
    self.query.poll();
    self.outcomes.drain();
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    let mut shortcuts = vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("r", "refresh").with_priority(40),
      ShortcutInfo::new("q", "back").with_priority(90),
    ];
    if self.sync.is_busy() {
      shortcuts.push(ShortcutInfo::new("…", "retrying").with_priority(20));
    } else {
      shortcuts.push(ShortcutInfo::new("R", "retry").with_priority(20));
      shortcuts.push(ShortcutInfo::new("A", "retry all").with_priority(30));
    }
    shortcuts
  }
}
