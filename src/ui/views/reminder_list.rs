use super::{OutcomeChannel, ReminderDetailView};
use crate::api::types::{Reminder, ReminderStatus};
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

/// Reminders of one event, with manual triggering per speaker
pub struct ReminderListView {
  event_id: i64,
  key: ApiQueryKey,
  query: Query<Vec<Reminder>>,
  sync: SyncController,
  outcomes: OutcomeChannel,
  list_state: ListState,
}

impl ReminderListView {
  pub fn new(event_id: i64, ctx: &ViewContext) -> Self {
    let key = ApiQueryKey::EventReminders { event_id };

    let api = ctx.api.clone();
    let mut query = Query::keyed(&key, ctx.cache.clone(), move || {
      let api = api.clone();
      async move { api.list_reminders(event_id).await }
    })
    .with_retry(ctx.retry)
    .with_stale_time(ctx.cache.stale_time());

    // Start fetching immediately
    query.fetch();

    Self {
      event_id,
      key,
      query,
      sync: ctx.sync.clone(),
      outcomes: OutcomeChannel::new(),
      list_state: ListState::default(),
    }
  }

  fn reminders(&self) -> &[Reminder] {
    self.query.data().map(|v| v.as_slice()).unwrap_or(&[])
  }

  fn selected(&self) -> Option<&Reminder> {
    self
      .list_state
      .selected()
      .and_then(|idx| self.reminders().get(idx))
  }

  fn is_unavailable(&self) -> bool {
    self
      .query
      .error()
      .map(|e| e.is_not_implemented())
      .unwrap_or(false)
  }

  /// Speakers with a pending reminder, first occurrence order
  fn pending_speakers(&self) -> Vec<i64> {
    let mut speakers: Vec<i64> = Vec::new();
    for id in self
      .reminders()
      .iter()
      .filter(|r| r.status == ReminderStatus::Pending)
      .filter_map(|r| r.speaker_id)
    {
      if !speakers.contains(&id) {
        speakers.push(id);
      }
    }
    speakers
  }

  /// Refuse up front when a write from any view is still outstanding
  fn refuse_if_busy(&mut self) -> bool {
    if !self.sync.is_busy() {
      return false;
    }
    if let Some(message) = SyncOutcome::Busy.status_message() {
      self.outcomes.set(message);
    }
    true
  }

  fn trigger_selected(&mut self) {
    if self.refuse_if_busy() {
      return;
    }
    let speaker_id = match self.selected().map(|r| r.speaker_id) {
      Some(Some(id)) => id,
      Some(None) => {
        self.outcomes.set("Selected reminder has no speaker");
        return;
      }
      None => {
        self.outcomes.set("No reminder selected");
        return;
      }
    };

    let sync = self.sync.clone();
    let key = self.key.clone();
    self
      .outcomes
      .spawn(async move { sync.trigger_one(speaker_id, &key).await.status_message() });
  }

  fn trigger_pending(&mut self) {
    if self.refuse_if_busy() {
      return;
    }
    let speakers = self.pending_speakers();
    if speakers.is_empty() {
      self.outcomes.set("No pending reminders");
      return;
    }

    let sync = self.sync.clone();
    let key = self.key.clone();
    self
      .outcomes
      .spawn(async move { sync.trigger_all(&speakers, &key).await.status_message() });
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.reminders().len();
    ensure_valid_selection(&mut self.list_state, len);

    let sending = self.sync.state();
    let title = match self.query.state() {
      QueryState::Loading => format!(" Reminders [event {}] (loading...) ", self.event_id),
      QueryState::Error(_) if self.is_unavailable() => {
        format!(" Reminders [event {}] ", self.event_id)
      }
      QueryState::Error(e) => format!(" Reminders [event {}] (error: {}) ", self.event_id, e),
      _ if sending.is_batch() => {
        format!(" Reminders [event {}] (sending pending...) ", self.event_id)
      }
      _ if sending.is_busy() => format!(" Reminders [event {}] (sending...) ", self.event_id),
      _ => format!(" Reminders [event {}] ({}) ", self.event_id, len),
    };

    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if self.reminders().is_empty() && !self.query.is_loading() {
      let (content, color) = if self.is_unavailable() {
        (
          "Reminders are not available yet for this event.",
          Color::Yellow,
        )
      } else if self.query.is_error() {
        ("Failed to load reminders. Press 'r' to retry.", Color::Red)
      } else {
        ("No reminders scheduled for this event.", Color::DarkGray)
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(color));
      frame.render_widget(paragraph, area);
      return;
    }

    let in_flight = sending.in_flight();
    let items: Vec<ListItem> = self
      .reminders()
      .iter()
      .map(|r| {
        let row_sending = in_flight.is_some() && r.speaker_id == in_flight;
        reminder_row(r, ReminderColumns::Speaker, row_sending)
      })
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

impl View for ReminderListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Char('t') => self.trigger_selected(),
      KeyCode::Char('T') => self.trigger_pending(),
      KeyCode::Enter => {
        if let Some(reminder) = self.selected() {
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
    format!("Reminders [{}]", self.event_id)
  }

  fn context(&self) -> Option<String> {
    let name = self
      .reminders()
      .iter()
      .find_map(|r| r.event.as_ref())
      .map(|e| e.name.clone())
      .filter(|n| !n.is_empty());
    Some(name.unwrap_or_else(|| format!("event {}", self.event_id)))
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
      shortcuts.push(ShortcutInfo::new("…", "sending").with_priority(20));
    } else if !self.is_unavailable() {
      shortcuts.push(ShortcutInfo::new("t", "send").with_priority(20));
      shortcuts.push(ShortcutInfo::new("T", "send pending").with_priority(30));
    }
    shortcuts
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::fixtures::reminder_json;
  use crate::api::ApiClient;
  use crate::cache::QueryCache;
  use crate::query::RetryPolicy;
  use serde_json::json;
  use std::time::Duration;
  use wiremock::matchers::{method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn context(server: &MockServer) -> ViewContext {
    ViewContext::new(
      ApiClient::with_base_url(&server.uri(), None, Duration::from_secs(5)).unwrap(),
      QueryCache::new(),
      RetryPolicy::none(),
    )
  }

  async fn settle(view: &mut ReminderListView) {
    for _ in 0..50 {
      view.tick();
      if !view.query.is_loading() {
        return;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
  }

  #[tokio::test]
  async fn test_not_implemented_shows_unavailable_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/reminders/events/7"))
      .respond_with(ResponseTemplate::new(404))
      .expect(1)
      .mount(&server)
      .await;

    let mut view = ReminderListView::new(7, &context(&server));
    settle(&mut view).await;

    assert!(view.is_unavailable());
    // Unavailable hides the send shortcuts
    assert!(!view.shortcuts().iter().any(|s| s.key == "t"));
  }

  #[tokio::test]
  async fn test_pending_speakers_are_unique_and_ordered() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/reminders/events/7"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([
        reminder_json(1, 30, "pending"),
        reminder_json(2, 10, "sent"),
        reminder_json(3, 20, "pending"),
        reminder_json(4, 30, "pending"),
      ])))
      .mount(&server)
      .await;

    let mut view = ReminderListView::new(7, &context(&server));
    settle(&mut view).await;

    assert_eq!(view.reminders().len(), 4);
    assert_eq!(view.pending_speakers(), vec![30, 20]);
  }

  #[tokio::test]
  async fn test_trigger_refetches_list_and_reports_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/reminders/events/7"))
      .respond_with(
        ResponseTemplate::new(200).set_body_json(json!([reminder_json(1, 30, "pending")])),
      )
      .expect(2)
      .mount(&server)
      .await;
    Mock::given(method("POST"))
      .and(path("/reminders/trigger"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "Reminder sent"})))
      .expect(1)
      .mount(&server)
      .await;

    let mut view = ReminderListView::new(7, &context(&server));
    settle(&mut view).await;

    view.handle_key(KeyEvent::from(KeyCode::Char('t')));
    for _ in 0..50 {
      view.tick();
      if view.status().is_some() && !view.query.is_loading() {
        break;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    settle(&mut view).await;

    assert_eq!(view.status(), Some("Reminder sent"));
    assert!(!view.sync.is_busy());
  }

  #[tokio::test]
  async fn test_trigger_without_selection_says_so() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/reminders/events/7"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
      .mount(&server)
      .await;
    Mock::given(method("POST"))
      .and(path("/reminders/trigger"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "sent"})))
      .expect(0)
      .mount(&server)
      .await;

    let mut view = ReminderListView::new(7, &context(&server));
    settle(&mut view).await;

    view.handle_key(KeyEvent::from(KeyCode::Char('t')));
    assert_eq!(view.status(), Some("No reminder selected"));
  }

  #[tokio::test]
  async fn test_batch_from_closed_view_keeps_new_view_busy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/reminders/events/7"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([
        reminder_json(1, 30, "pending"),
        reminder_json(2, 20, "pending"),
      ])))
      .mount(&server)
      .await;
    Mock::given(method("POST"))
      .and(path("/reminders/trigger"))
      .respond_with(
        ResponseTemplate::new(200)
          .set_body_json(json!({"message": "sent"}))
          .set_delay(Duration::from_millis(300)),
      )
      .expect(2)
      .mount(&server)
      .await;

    let ctx = context(&server);
    let mut first = ReminderListView::new(7, &ctx);
    settle(&mut first).await;
    first.handle_key(KeyEvent::from(KeyCode::Char('T')));
    for _ in 0..50 {
      if ctx.sync.is_busy() {
        break;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(ctx.sync.state().is_batch());
    drop(first);

    // Same event reopened while the batch is still sending
    let mut second = ReminderListView::new(7, &ctx);
    settle(&mut second).await;
    assert!(!second.shortcuts().iter().any(|s| s.key == "t"));
    second.handle_key(KeyEvent::from(KeyCode::Char('t')));
    assert_eq!(second.status(), Some("A send is already in progress"));

    for _ in 0..200 {
      if !ctx.sync.is_busy() {
        break;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!ctx.sync.is_busy());
    let posts = server
      .received_requests()
      .await
      .unwrap()
      .iter()
      .filter(|r| r.url.path() == "/reminders/trigger")
      .count();
    assert_eq!(posts, 2);
  }
}
