use super::ActivityDetailView;
use crate::api::types::ActivityLogEntry;
use crate::api::ActivityLogFilters;
use crate::cache::ApiQueryKey;
use crate::query::{Query, QueryState};
use crate::ui::components::{KeyResult, PromptEvent, PromptInput};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{format_timestamp, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::ViewContext;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

/// Filterable, paged activity log
pub struct ActivityLogView {
  ctx: ViewContext,
  filters: ActivityLogFilters,
  query: Query<Vec<ActivityLogEntry>>,
  list_state: ListState,
  prompt: PromptInput,
}

impl ActivityLogView {
  pub fn new(filters: ActivityLogFilters, ctx: &ViewContext) -> Self {
    Self {
      query: Self::build_query(&filters, ctx),
      ctx: ctx.clone(),
      filters,
      list_state: ListState::default(),
      prompt: PromptInput::new(
        "Filter activity",
        "action=.. entity=.. from=YYYY-MM-DD to=YYYY-MM-DD limit=..",
      ),
    }
  }

  fn build_query(filters: &ActivityLogFilters, ctx: &ViewContext) -> Query<Vec<ActivityLogEntry>> {
    let key = ApiQueryKey::ActivityLogs {
      filters: filters.clone(),
    };
    let api = ctx.api.clone();
    let filters = filters.clone();
    let mut query = Query::keyed(&key, ctx.cache.clone(), move || {
      let api = api.clone();
      let filters = filters.clone();
      async move { api.list_activity_logs(&filters).await }
    })
    .with_retry(ctx.retry)
    .with_stale_time(ctx.cache.stale_time());
    query.fetch();
    query
  }

  /// Switch to new filters; a changed filter is a different cache key
  fn apply_filters(&mut self, filters: ActivityLogFilters) {
    if filters == self.filters {
      return;
    }
    tracing::debug!(filters = %filters.to_query_string(), "activity filters changed");
    self.query = Self::build_query(&filters, &self.ctx);
    self.filters = filters;
    self.list_state = ListState::default();
  }

  fn entries(&self) -> &[ActivityLogEntry] {
    self.query.data().map(|v| v.as_slice()).unwrap_or(&[])
  }

  /// A full page suggests there is another one
  fn has_next_page(&self) -> bool {
    self.entries().len() as u32 >= self.filters.page_size()
  }

  fn page_label(&self) -> String {
    let size = self.filters.page_size();
    let page = self.filters.offset.unwrap_or(0) / size + 1;
    format!("page {}", page)
  }

  fn handle_prompt(&mut self, key: KeyEvent) -> Option<ViewAction> {
    match self.prompt.handle_key(key) {
      KeyResult::Handled => Some(ViewAction::None),
      KeyResult::Event(PromptEvent::Submitted(input)) => {
        match ActivityLogFilters::parse(&input) {
          Ok(filters) => self.apply_filters(filters),
          Err(e) => self.prompt.reject(&input, e.to_string()),
        }
        Some(ViewAction::None)
      }
      KeyResult::Event(PromptEvent::Cancelled) => Some(ViewAction::None),
      KeyResult::NotHandled => None,
    }
  }

  fn handle_navigation(&mut self, key: KeyEvent) -> Option<ViewAction> {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('n') if self.has_next_page() => {
        let next = self.filters.next_page();
        self.apply_filters(next);
      }
      KeyCode::Char('p') => {
        let prev = self.filters.prev_page();
        self.apply_filters(prev);
      }
      _ => return None,
    }
    Some(ViewAction::None)
  }

  fn handle_actions(&mut self, key: KeyEvent) -> Option<ViewAction> {
    match key.code {
      KeyCode::Char('f') => self.prompt.open(&self.filters.to_prompt()),
      KeyCode::Char('c') => self.apply_filters(ActivityLogFilters::default()),
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Enter => {
        let entry = self
          .list_state
          .selected()
          .and_then(|idx| self.entries().get(idx))?;
        return Some(ViewAction::Push(Box::new(ActivityDetailView::new(
          entry.clone(),
        ))));
      }
      KeyCode::Char('q') | KeyCode::Esc => return Some(ViewAction::Pop),
      _ => return None,
    }
    Some(ViewAction::None)
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.entries().len();
    ensure_valid_selection(&mut self.list_state, len);

    let filter = if self.filters.is_empty() {
      String::new()
    } else {
      format!(" [{}]", truncate(&self.filters.to_prompt(), 50))
    };
    let title = match self.query.state() {
      QueryState::Loading => format!(" Activity{} (loading...) ", filter),
      QueryState::Error(e) if !e.is_not_implemented() => {
        format!(" Activity{} (error: {}) ", filter, e)
      }
      _ => format!(" Activity{} ({}, {}) ", filter, len, self.page_label()),
    };

    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if self.entries().is_empty() && !self.query.is_loading() {
      let content = match self.query.error() {
        Some(e) if e.is_not_implemented() => "The activity log is not available yet.",
        Some(_) => "Failed to load activity. Press 'r' to retry.",
        None if self.filters.is_empty() => "No activity recorded.",
        None => "No activity matches the filters. Press 'c' to clear them.",
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let items: Vec<ListItem> = self
      .entries()
      .iter()
      .map(|entry| {
        let entity = match entry.entity_id {
          Some(id) => format!("{} #{}", entry.entity_type, id),
          None => entry.entity_type.clone(),
        };
        let line = Line::from(vec![
          Span::styled(
            format_timestamp(&entry.created_at),
            Style::default().fg(Color::DarkGray),
          ),
          Span::raw("  "),
          Span::styled(
            format!("{:<20}", truncate(&entry.user_label(), 20)),
            Style::default().fg(Color::Cyan),
          ),
          Span::raw(" "),
          Span::styled(
            format!("{:<22}", truncate(&entry.action_label(), 22)),
            Style::default().fg(Color::Yellow),
          ),
          Span::raw(" "),
          Span::raw(truncate(&entity, 30)),
        ]);
        ListItem::new(line)
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

impl View for ActivityLogView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    self
      .handle_prompt(key)
      .or_else(|| self.handle_navigation(key))
      .or_else(|| self.handle_actions(key))
      .unwrap_or(ViewAction::None)
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_list(frame, area);
    self.prompt.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    "Activity".to_string()
  }

  fn context(&self) -> Option<String> {
    Some(self.page_label())
  }

  fn is_capturing_input(&self) -> bool {
    self.prompt.is_active()
  }

  fn tick(&mut self) {
    self.query.poll();
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    let mut shortcuts = vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("f", "filter").with_priority(20),
      ShortcutInfo::new("n/p", "page").with_priority(40),
      ShortcutInfo::new("q", "back").with_priority(90),
    ];
    if !self.filters.is_empty() {
      shortcuts.push(ShortcutInfo::new("c", "clear").with_priority(30));
    }
    shortcuts
  }
}
