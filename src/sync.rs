//! Write-then-invalidate controller for reminder sends.
//!
//! A write (trigger or retry) is followed by an invalidation of the reads it
//! affects, so views holding a [`Query`](crate::query::Query) bound to those
//! keys refetch on their next tick. One controller is shared by the whole
//! app and owns the single in-flight marker: while any write is outstanding,
//! every other write is refused. Failures are absorbed: a missing endpoint
//! is silent, anything else is logged. Nothing is ever propagated to the
//! caller as an error.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::api::types::MessageResponse;
use crate::api::{ApiClient, ApiError};
use crate::cache::{ApiQueryKey, QueryCache};

/// Backend operations that ask for a reminder to be sent.
#[async_trait]
pub trait ReminderWriter: Send + Sync {
  /// Send the next pending reminder for a speaker now
  async fn trigger(&self, speaker_id: i64) -> Result<MessageResponse, ApiError>;

  /// Re-attempt a failed reminder
  async fn retry(&self, reminder_id: i64) -> Result<MessageResponse, ApiError>;
}

#[async_trait]
impl ReminderWriter for ApiClient {
  async fn trigger(&self, speaker_id: i64) -> Result<MessageResponse, ApiError> {
    self.trigger_reminder(speaker_id).await
  }

  async fn retry(&self, reminder_id: i64) -> Result<MessageResponse, ApiError> {
    self.retry_reminder(reminder_id).await
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
  Trigger { speaker_id: i64 },
  Retry { reminder_id: i64 },
}

impl WriteOp {
  /// Id the in-flight marker is keyed by
  pub fn target(&self) -> i64 {
    match self {
      WriteOp::Trigger { speaker_id } => *speaker_id,
      WriteOp::Retry { reminder_id } => *reminder_id,
    }
  }

  fn verb(&self) -> &'static str {
    match self {
      WriteOp::Trigger { .. } => "trigger",
      WriteOp::Retry { .. } => "retry",
    }
  }
}

/// What the controller is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
  #[default]
  Idle,
  /// A single write is outstanding for this target
  InFlight(i64),
  /// A sequential batch is running; `current` is the target being sent
  BatchRunning { current: Option<i64> },
}

impl SyncState {
  pub fn is_busy(&self) -> bool {
    !matches!(self, SyncState::Idle)
  }

  /// Target whose write is outstanding, if any.
  pub fn in_flight(&self) -> Option<i64> {
    match self {
      SyncState::InFlight(id) => Some(*id),
      SyncState::BatchRunning { current } => *current,
      SyncState::Idle => None,
    }
  }

  pub fn is_batch(&self) -> bool {
    matches!(self, SyncState::BatchRunning { .. })
  }
}

/// Result of one write as seen by the UI.
#[derive(Debug, Clone)]
pub enum SyncOutcome {
  /// Backend accepted the request
  Sent { message: String },
  /// Backend has no such endpoint; nothing to show
  Unavailable,
  /// Write failed and was logged
  Failed(ApiError),
  /// Another write was outstanding; nothing was sent
  Busy,
}

impl SyncOutcome {
  pub fn is_sent(&self) -> bool {
    matches!(self, SyncOutcome::Sent { .. })
  }

  /// Status-line text, `None` when the outcome should stay silent.
  pub fn status_message(&self) -> Option<String> {
    match self {
      SyncOutcome::Sent { message } => Some(message.clone()),
      SyncOutcome::Failed(e) => Some(format!("Send failed: {}", e)),
      SyncOutcome::Busy => Some("A send is already in progress".to_string()),
      SyncOutcome::Unavailable => None,
    }
  }
}

/// Outcomes of a batch, in input order.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
  pub outcomes: Vec<(i64, SyncOutcome)>,
}

impl BatchReport {
  pub fn sent(&self) -> usize {
    self.outcomes.iter().filter(|(_, o)| o.is_sent()).count()
  }

  pub fn failed(&self) -> usize {
    self
      .outcomes
      .iter()
      .filter(|(_, o)| matches!(o, SyncOutcome::Failed(_)))
      .count()
  }

  pub fn status_message(&self) -> Option<String> {
    if self.outcomes.is_empty() {
      return None;
    }
    if self
      .outcomes
      .iter()
      .all(|(_, o)| matches!(o, SyncOutcome::Busy))
    {
      return SyncOutcome::Busy.status_message();
    }
    match self.failed() {
      0 => Some(format!("Sent {} of {}", self.sent(), self.outcomes.len())),
      n => Some(format!(
        "Sent {} of {}, {} failed",
        self.sent(),
        self.outcomes.len(),
        n
      )),
    }
  }
}

/// Resets the marker when a write finishes, fails, or is dropped mid-flight.
struct MarkerGuard<'a> {
  state: &'a watch::Sender<SyncState>,
  reset_to: SyncState,
}

impl Drop for MarkerGuard<'_> {
  fn drop(&mut self) {
    self.state.send_replace(self.reset_to);
  }
}

/// Reads a successful retry of a reminder of `event_id` makes stale.
pub fn retry_invalidates(event_id: i64) -> Vec<ApiQueryKey> {
  vec![
    ApiQueryKey::FailedReminders,
    ApiQueryKey::EventReminders { event_id },
  ]
}

/// Runs reminder writes and keeps the affected reads fresh.
///
/// Clones share state, so every view built from the same context sees the
/// same marker, and a spawned task keeps it set after the view that started
/// it is gone. Responses that land after that are harmless: nobody is
/// subscribed and the cache simply records the invalidation.
#[derive(Clone)]
pub struct SyncController {
  writer: Arc<dyn ReminderWriter>,
  cache: QueryCache,
  state: Arc<watch::Sender<SyncState>>,
}

impl SyncController {
  pub fn new(writer: Arc<dyn ReminderWriter>, cache: QueryCache) -> Self {
    let (state, _) = watch::channel(SyncState::Idle);
    Self {
      writer,
      cache,
      state: Arc::new(state),
    }
  }

  pub fn state(&self) -> SyncState {
    *self.state.borrow()
  }

  pub fn subscribe(&self) -> watch::Receiver<SyncState> {
    self.state.subscribe()
  }

  pub fn is_busy(&self) -> bool {
    self.state().is_busy()
  }

  /// Trigger a speaker's reminder, then invalidate the event list `key`.
  pub async fn trigger_one(&self, speaker_id: i64, key: &ApiQueryKey) -> SyncOutcome {
    self
      .run_one(WriteOp::Trigger { speaker_id }, std::slice::from_ref(key))
      .await
  }

  pub async fn retry_one(&self, reminder_id: i64, event_id: i64) -> SyncOutcome {
    self
      .run_one(WriteOp::Retry { reminder_id }, &retry_invalidates(event_id))
      .await
  }

  /// Trigger each speaker in turn. See [`SyncController::run_batch`].
  pub async fn trigger_all(&self, speaker_ids: &[i64], key: &ApiQueryKey) -> BatchReport {
    let writes = speaker_ids
      .iter()
      .map(|&speaker_id| (WriteOp::Trigger { speaker_id }, vec![key.clone()]))
      .collect();
    self.run_batch(writes).await
  }

  /// Retry `(reminder_id, event_id)` pairs in turn.
  pub async fn retry_all(&self, reminders: &[(i64, i64)]) -> BatchReport {
    let writes = reminders
      .iter()
      .map(|&(reminder_id, event_id)| {
        (WriteOp::Retry { reminder_id }, retry_invalidates(event_id))
      })
      .collect();
    self.run_batch(writes).await
  }

  /// Run one write unless another is outstanding.
  pub async fn run_one(&self, op: WriteOp, invalidates: &[ApiQueryKey]) -> SyncOutcome {
    if !self.try_begin(SyncState::InFlight(op.target())) {
      debug!(target_id = op.target(), "write refused, controller busy");
      return SyncOutcome::Busy;
    }
    let _guard = MarkerGuard {
      state: &self.state,
      reset_to: SyncState::Idle,
    };

    self.dispatch(op, invalidates).await
  }

  /// Run writes one at a time, in order.
  ///
  /// Each write, including the invalidation that follows it, completes
  /// before the next one starts, so the outbound mail sender sees at most
  /// one request from us at a time. A failing target never stops the
  /// rest of the batch.
  pub async fn run_batch(&self, writes: Vec<(WriteOp, Vec<ApiQueryKey>)>) -> BatchReport {
    if writes.is_empty() {
      return BatchReport::default();
    }
    if !self.try_begin(SyncState::BatchRunning { current: None }) {
      debug!(count = writes.len(), "batch refused, controller busy");
      return BatchReport {
        outcomes: writes
          .iter()
          .map(|(op, _)| (op.target(), SyncOutcome::Busy))
          .collect(),
      };
    }
    let _guard = MarkerGuard {
      state: &self.state,
      reset_to: SyncState::Idle,
    };

    let mut outcomes = Vec::with_capacity(writes.len());
    for (op, invalidates) in writes {
      self.state.send_replace(SyncState::BatchRunning {
        current: Some(op.target()),
      });
      let outcome = self.dispatch(op, &invalidates).await;
      self
        .state
        .send_replace(SyncState::BatchRunning { current: None });
      outcomes.push((op.target(), outcome));
    }

    let report = BatchReport { outcomes };
    info!(
      sent = report.sent(),
      failed = report.failed(),
      total = report.outcomes.len(),
      "batch finished"
    );
    report
  }

  /// Atomically move from idle to `next`.
  fn try_begin(&self, next: SyncState) -> bool {
    self.state.send_if_modified(|state| {
      if state.is_busy() {
        false
      } else {
        *state = next;
        true
      }
    })
  }

  async fn dispatch(&self, op: WriteOp, invalidates: &[ApiQueryKey]) -> SyncOutcome {
    let result = match op {
      WriteOp::Trigger { speaker_id } => self.writer.trigger(speaker_id).await,
      WriteOp::Retry { reminder_id } => self.writer.retry(reminder_id).await,
    };

    match result {
      Ok(ack) => {
        for key in invalidates {
          self.cache.invalidate(key);
        }
        info!(
          op = op.verb(),
          target_id = op.target(),
          message = %ack.message,
          "reminder write accepted"
        );
        SyncOutcome::Sent {
          message: ack.message,
        }
      }
      Err(e) if e.is_not_implemented() => SyncOutcome::Unavailable,
      Err(e) => {
        error!(
          op = op.verb(),
          target_id = op.target(),
          status = ?e.status(),
          error = %e,
          "reminder write failed"
        );
        SyncOutcome::Failed(e)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::StatusCode;
  use std::collections::HashMap;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;
  use std::time::Duration;
  use tokio::sync::Notify;

  /// One call as seen by the fake backend.
  #[derive(Debug, Clone, PartialEq)]
  struct Call {
    op: &'static str,
    target: i64,
    /// Cache generation of the watched key when the call started
    generation: u64,
  }

  /// Backend double recording call order and concurrency depth.
  struct FakeWriter {
    cache: QueryCache,
    key: ApiQueryKey,
    fail_with: HashMap<i64, u16>,
    delay: Duration,
    gate: Option<Arc<Notify>>,
    calls: Mutex<Vec<Call>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
  }

  impl FakeWriter {
    fn new(cache: &QueryCache, key: &ApiQueryKey) -> Self {
      Self {
        cache: cache.clone(),
        key: key.clone(),
        fail_with: HashMap::new(),
        delay: Duration::from_millis(5),
        gate: None,
        calls: Mutex::new(Vec::new()),
        active: AtomicUsize::new(0),
        max_active: AtomicUsize::new(0),
      }
    }

    fn failing(mut self, target: i64, status: u16) -> Self {
      self.fail_with.insert(target, status);
      self
    }

    fn gated(mut self, gate: Arc<Notify>) -> Self {
      self.gate = Some(gate);
      self
    }

    fn calls(&self) -> Vec<Call> {
      self.calls.lock().unwrap().clone()
    }

    async fn handle(&self, op: &'static str, target: i64) -> Result<MessageResponse, ApiError> {
      let depth = self.active.fetch_add(1, Ordering::SeqCst) + 1;
      self.max_active.fetch_max(depth, Ordering::SeqCst);
      self.calls.lock().unwrap().push(Call {
        op,
        target,
        generation: self.cache.generation(&self.key),
      });

      if let Some(gate) = &self.gate {
        gate.notified().await;
      }
      tokio::time::sleep(self.delay).await;
      self.active.fetch_sub(1, Ordering::SeqCst);

      match self.fail_with.get(&target) {
        Some(code) => Err(ApiError::Status {
          status: StatusCode::from_u16(*code).unwrap(),
          body: "nope".to_string(),
        }),
        None => Ok(MessageResponse {
          message: format!("{} {} ok", op, target),
        }),
      }
    }
  }

  #[async_trait]
  impl ReminderWriter for FakeWriter {
    async fn trigger(&self, speaker_id: i64) -> Result<MessageResponse, ApiError> {
      self.handle("trigger", speaker_id).await
    }

    async fn retry(&self, reminder_id: i64) -> Result<MessageResponse, ApiError> {
      self.handle("retry", reminder_id).await
    }
  }

  fn event_key() -> ApiQueryKey {
    ApiQueryKey::EventReminders { event_id: 7 }
  }

  fn setup(configure: impl FnOnce(FakeWriter) -> FakeWriter) -> (Arc<FakeWriter>, SyncController) {
    let cache = QueryCache::new();
    let writer = Arc::new(configure(FakeWriter::new(&cache, &event_key())));
    let controller = SyncController::new(writer.clone(), cache);
    (writer, controller)
  }

  fn invalidations(controller: &SyncController) -> u64 {
    controller.cache.generation(&event_key())
  }

  #[tokio::test]
  async fn test_trigger_one_invalidates_once_and_clears_marker() {
    let (writer, controller) = setup(|w| w);

    let outcome = controller.trigger_one(42, &event_key()).await;

    assert!(matches!(outcome, SyncOutcome::Sent { ref message } if message == "trigger 42 ok"));
    assert_eq!(invalidations(&controller), 1);
    assert_eq!(controller.state(), SyncState::Idle);
    assert_eq!(writer.calls().len(), 1);
  }

  #[tokio::test]
  async fn test_not_implemented_write_is_silent() {
    let (_, controller) = setup(|w| w.failing(42, 404));

    let outcome = controller.trigger_one(42, &event_key()).await;

    assert!(matches!(outcome, SyncOutcome::Unavailable));
    assert_eq!(outcome.status_message(), None);
    assert_eq!(invalidations(&controller), 0);
    assert_eq!(controller.state(), SyncState::Idle);
  }

  #[tokio::test]
  async fn test_transient_write_failure_is_reported_not_raised() {
    let (_, controller) = setup(|w| w.failing(42, 500));

    let outcome = controller.trigger_one(42, &event_key()).await;

    match &outcome {
      SyncOutcome::Failed(e) => assert_eq!(e.status(), Some(StatusCode::INTERNAL_SERVER_ERROR)),
      other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(outcome.status_message().unwrap().starts_with("Send failed"));
    assert_eq!(invalidations(&controller), 0);
    assert_eq!(controller.state(), SyncState::Idle);
  }

  #[tokio::test]
  async fn test_trigger_all_is_strictly_sequential() {
    let (writer, controller) = setup(|w| w);

    let report = controller.trigger_all(&[1, 2, 3], &event_key()).await;

    let calls = writer.calls();
    assert_eq!(
      calls.iter().map(|c| c.target).collect::<Vec<_>>(),
      vec![1, 2, 3]
    );
    // Each call starts only after the previous invalidation happened
    assert_eq!(
      calls.iter().map(|c| c.generation).collect::<Vec<_>>(),
      vec![0, 1, 2]
    );
    assert_eq!(writer.max_active.load(Ordering::SeqCst), 1);
    assert_eq!(report.sent(), 3);
    assert_eq!(invalidations(&controller), 3);
    assert_eq!(controller.state(), SyncState::Idle);
  }

  #[tokio::test]
  async fn test_batch_continues_after_not_implemented() {
    let (writer, controller) = setup(|w| w.failing(2, 404));

    let report = controller.trigger_all(&[1, 2, 3], &event_key()).await;

    assert_eq!(writer.calls().len(), 3);
    assert!(report.outcomes[0].1.is_sent());
    assert!(matches!(report.outcomes[1].1, SyncOutcome::Unavailable));
    assert!(report.outcomes[2].1.is_sent());
    assert_eq!(invalidations(&controller), 2);
  }

  #[tokio::test]
  async fn test_batch_continues_after_transient_failure() {
    let (writer, controller) = setup(|w| w.failing(1, 503));

    let report = controller.retry_all(&[(1, 7), (2, 7)]).await;

    assert_eq!(
      writer.calls().iter().map(|c| c.op).collect::<Vec<_>>(),
      vec!["retry", "retry"]
    );
    assert_eq!(report.failed(), 1);
    assert_eq!(report.sent(), 1);
    assert_eq!(
      report.status_message().as_deref(),
      Some("Sent 1 of 2, 1 failed")
    );
  }

  #[tokio::test]
  async fn test_marker_is_set_while_write_is_outstanding() {
    let gate = Arc::new(Notify::new());
    let (_, controller) = setup(|w| w.gated(gate.clone()));
    let mut rx = controller.subscribe();

    let running = controller.clone();
    let handle = tokio::spawn(async move { running.trigger_one(42, &event_key()).await });

    rx.wait_for(|s| *s == SyncState::InFlight(42)).await.unwrap();
    assert_eq!(controller.state().in_flight(), Some(42));

    // A second write while one is outstanding is refused
    assert!(matches!(controller.trigger_one(43, &event_key()).await, SyncOutcome::Busy));
    let refused = controller.trigger_all(&[44], &event_key()).await;
    assert!(matches!(refused.outcomes[0].1, SyncOutcome::Busy));

    gate.notify_one();
    assert!(handle.await.unwrap().is_sent());
    assert_eq!(controller.state(), SyncState::Idle);
  }

  #[tokio::test]
  async fn test_batch_marker_tracks_current_target() {
    let gate = Arc::new(Notify::new());
    let (_, controller) = setup(|w| w.gated(gate.clone()));
    let mut rx = controller.subscribe();

    let running = controller.clone();
    let handle = tokio::spawn(async move { running.trigger_all(&[5, 6], &event_key()).await });

    rx.wait_for(|s| *s == SyncState::BatchRunning { current: Some(5) })
      .await
      .unwrap();
    assert!(controller.state().is_batch());
    gate.notify_one();

    rx.wait_for(|s| *s == SyncState::BatchRunning { current: Some(6) })
      .await
      .unwrap();
    gate.notify_one();

    assert_eq!(handle.await.unwrap().sent(), 2);
    assert_eq!(controller.state(), SyncState::Idle);
  }

  #[tokio::test]
  async fn test_dropped_write_clears_marker() {
    let gate = Arc::new(Notify::new());
    let (_, controller) = setup(|w| w.gated(gate));
    let mut rx = controller.subscribe();

    let running = controller.clone();
    let handle = tokio::spawn(async move { running.trigger_one(42, &event_key()).await });
    rx.wait_for(|s| s.is_busy()).await.unwrap();

    handle.abort();
    assert!(handle.await.unwrap_err().is_cancelled());
    assert_eq!(controller.state(), SyncState::Idle);
    assert_eq!(invalidations(&controller), 0);
  }

  #[tokio::test]
  async fn test_late_response_without_subscribers_is_harmless() {
    let (_, controller) = setup(|w| w);
    drop(controller.subscribe());

    let running = controller.clone();
    drop(controller);
    let outcome = tokio::spawn(async move { running.trigger_one(1, &event_key()).await })
      .await
      .unwrap();
    assert!(outcome.is_sent());
  }

  #[tokio::test]
  async fn test_retry_invalidates_failed_list_and_event_list() {
    let (writer, controller) = setup(|w| w);

    let outcome = controller.retry_one(9, 7).await;

    assert!(outcome.is_sent());
    assert_eq!(writer.calls()[0].op, "retry");
    assert_eq!(invalidations(&controller), 1);
    assert_eq!(controller.cache.generation(&ApiQueryKey::FailedReminders), 1);
    assert_eq!(
      controller
        .cache
        .generation(&ApiQueryKey::EventReminders { event_id: 8 }),
      0
    );
  }

  #[tokio::test]
  async fn test_clones_share_one_marker() {
    let gate = Arc::new(Notify::new());
    let (writer, controller) = setup(|w| w.gated(gate.clone()));
    let other = controller.clone();
    let mut rx = controller.subscribe();

    let running = controller.clone();
    let handle = tokio::spawn(async move { running.trigger_all(&[1, 2], &event_key()).await });
    rx.wait_for(|s| s.is_batch()).await.unwrap();
    drop(controller);

    // A retry elsewhere in the app is refused while the batch runs
    assert!(other.is_busy());
    assert!(matches!(other.retry_one(9, 7).await, SyncOutcome::Busy));

    gate.notify_one();
    rx.wait_for(|s| *s == SyncState::BatchRunning { current: Some(2) })
      .await
      .unwrap();
    gate.notify_one();
    assert_eq!(handle.await.unwrap().sent(), 2);
    assert_eq!(writer.calls().len(), 2);
    assert!(!other.is_busy());
  }

  #[tokio::test]
  async fn test_empty_batch_does_nothing() {
    let (writer, controller) = setup(|w| w);
    let report = controller.trigger_all(&[], &event_key()).await;
    assert!(report.outcomes.is_empty());
    assert_eq!(report.status_message(), None);
    assert!(writer.calls().is_empty());
    assert_eq!(controller.state(), SyncState::Idle);
  }
}
