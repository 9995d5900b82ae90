pub mod components;
pub mod renderfns;
pub mod view;
pub mod views;

use crate::api::ApiClient;
use crate::app::App;
use crate::cache::QueryCache;
use crate::query::RetryPolicy;
use crate::sync::SyncController;
use ratatui::prelude::*;
use ratatui::widgets::ListState;
use std::sync::Arc;

/// Shared handles every view is built from
#[derive(Clone)]
pub struct ViewContext {
  pub api: ApiClient,
  pub cache: QueryCache,
  pub retry: RetryPolicy,
  /// One write marker for the whole app, outliving the views that write
  pub sync: SyncController,
}

impl ViewContext {
  pub fn new(api: ApiClient, cache: QueryCache, retry: RetryPolicy) -> Self {
    let sync = SyncController::new(Arc::new(api.clone()), cache.clone());
    Self {
      api,
      cache,
      retry,
      sync,
    }
  }
}

/// Main draw function
pub fn draw(frame: &mut Frame, app: &mut App) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // Header
      Constraint::Min(1),    // Current view
      Constraint::Length(1), // Breadcrumb and status
    ])
    .split(frame.area());

  let (context, shortcuts) = match app.current_view() {
    Some(view) => (view.context(), view.shortcuts()),
    None => (None, Vec::new()),
  };
  renderfns::draw_header(
    frame,
    chunks[0],
    app.title(),
    context.as_deref(),
    &shortcuts,
  );

  if let Some(view) = app.current_view_mut() {
    view.render(frame, chunks[1]);
  }
  app.command_input().render_overlay(frame, chunks[1]);

  let breadcrumb = app.breadcrumb();
  renderfns::draw_footer(frame, chunks[2], &breadcrumb, app.status());
}

/// Keep a list selection inside `0..len`, selecting the first row when
/// rows appear and clearing it when the list empties.
pub fn ensure_valid_selection(state: &mut ListState, len: usize) {
  match (state.selected(), len) {
    (_, 0) => state.select(None),
    (None, _) => state.select(Some(0)),
    (Some(i), len) if i >= len => state.select(Some(len - 1)),
    _ => {}
  }
}
