//! Async query abstraction for data fetching with caching support.
//!
//! Inspired by TanStack Query, this module provides a `Query<T>` type that
//! encapsulates async data fetching, loading states, bounded retries and
//! error handling. A query bound to a [`QueryCache`] key serves fresh cached
//! data, writes results back, and refetches by itself once the key is
//! invalidated.
//!
//! # Example
//!
//! ```ignore
//! let api = api_client.clone();
//! let key = ApiQueryKey::EventReminders { event_id: 7 };
//! let mut query = Query::keyed(&key, cache.clone(), move || {
//!     let api = api.clone();
//!     async move { api.list_reminders(7).await }
//! });
//!
//! // Start fetching
//! query.fetch();
//!
//! // In event loop tick
//! if query.poll() {
//!     // State changed, trigger re-render
//! }
//!
//! // In render
//! match query.state() {
//!     QueryState::Loading => render_spinner(),
//!     QueryState::Success(data) => render_data(data),
//!     QueryState::Error(e) => render_error(e),
//!     QueryState::Idle => {}
//! }
//! ```

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::warn;

use crate::api::ApiError;
use crate::cache::{QueryCache, QueryKey};

/// The state of a query
#[derive(Debug, Clone)]
pub enum QueryState<T> {
  /// Query has not been started
  Idle,
  /// Query is currently fetching data
  Loading,
  /// Query completed successfully
  Success(T),
  /// Query failed after all permitted attempts
  Error(ApiError),
}

impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryState::Error(_))
  }

  pub fn error(&self) -> Option<&ApiError> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

/// How often a failed read is attempted before the error is surfaced.
///
/// Only errors classified as retryable are attempted again; a missing
/// endpoint fails on the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total attempts, including the first one
  pub max_attempts: u32,
  /// Delay before the second attempt; doubles per attempt
  pub base_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      base_delay: Duration::from_secs(1),
    }
  }
}

impl RetryPolicy {
  const MAX_DELAY: Duration = Duration::from_secs(30);

  pub fn none() -> Self {
    Self {
      max_attempts: 1,
      base_delay: Duration::ZERO,
    }
  }

  /// Delay after the given failed attempt (1-based).
  pub fn delay_after(&self, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    self
      .base_delay
      .checked_mul(factor)
      .unwrap_or(Self::MAX_DELAY)
      .min(Self::MAX_DELAY)
  }
}

/// A factory function that creates futures for fetching data
type FetcherFn<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, ApiError>> + Send + Sync>;

/// Link between a query and its cache slot.
struct CacheBinding {
  cache: QueryCache,
  hash: String,
  /// Generation the current data belongs to
  seen_generation: u64,
  /// Generation at the start of the pending fetch
  fetch_generation: u64,
}

/// Async query for data fetching with state management.
///
/// Query<T> encapsulates:
/// - The fetching logic (via a closure)
/// - Loading/success/error states
/// - Retries of transient failures
/// - Async result handling via channels
/// - Optional cache binding with invalidation-driven refetch
pub struct Query<T> {
  state: QueryState<T>,
  /// Last good data, kept visible while a refetch is loading
  previous: Option<T>,
  fetcher: FetcherFn<T>,
  retry: RetryPolicy,
  receiver: Option<mpsc::UnboundedReceiver<Result<T, ApiError>>>,
  fetched_at: Option<Instant>,
  stale_time: Duration,
  binding: Option<CacheBinding>,
}

impl<T: Clone + Send + Sync + 'static> Query<T> {
  /// Create a new query with the given fetcher function.
  ///
  /// The fetcher is a closure that returns a future. It will be called
  /// each time `fetch()` or `refetch()` is invoked, and again for each
  /// retry.
  pub fn new<F, Fut>(fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    Self {
      state: QueryState::Idle,
      previous: None,
      fetcher: Arc::new(move || Box::pin(fetcher())),
      retry: RetryPolicy::default(),
      receiver: None,
      fetched_at: None,
      stale_time: Duration::from_secs(60), // Default 1 minute
      binding: None,
    }
  }

  /// Create a query whose results live in `cache` under `key`.
  pub fn keyed<K, F, Fut>(key: &K, cache: QueryCache, fetcher: F) -> Self
  where
    K: QueryKey + ?Sized,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    let hash = key.cache_hash();
    let generation = cache.generation_by_hash(&hash);
    let mut query = Self::new(fetcher);
    query.binding = Some(CacheBinding {
      cache,
      hash,
      seen_generation: generation,
      fetch_generation: generation,
    });
    query
  }

  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  /// Set the stale time for this query.
  ///
  /// After this duration, the data is considered stale and `is_stale()` returns true.
  pub fn with_stale_time(mut self, duration: Duration) -> Self {
    self.stale_time = duration;
    self
  }

  /// Get the current state of the query.
  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  /// Data of the last successful fetch. While a refetch is loading the
  /// previous data is still returned.
  pub fn data(&self) -> Option<&T> {
    match &self.state {
      QueryState::Success(data) => Some(data),
      QueryState::Loading => self.previous.as_ref(),
      _ => None,
    }
  }

  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  pub fn is_error(&self) -> bool {
    self.state.is_error()
  }

  pub fn error(&self) -> Option<&ApiError> {
    self.state.error()
  }

  /// Check if the data is stale (older than stale_time).
  pub fn is_stale(&self) -> bool {
    match &self.state {
      QueryState::Success(_) => self
        .fetched_at
        .map(|t| t.elapsed() > self.stale_time)
        .unwrap_or(true),
      _ => false,
    }
  }

  /// Whether the bound cache key was invalidated since our data was fetched.
  pub fn is_invalidated(&self) -> bool {
    self
      .binding
      .as_ref()
      .map(|b| b.cache.generation_by_hash(&b.hash) != b.seen_generation)
      .unwrap_or(false)
  }

  /// Start fetching data if not already loading.
  ///
  /// Bound queries are answered from the cache when it holds fresh data.
  /// This is a no-op if the query is already loading.
  pub fn fetch(&mut self) {
    if self.state.is_loading() {
      return;
    }

    if let Some(binding) = &mut self.binding {
      if let Some(data) = binding.cache.get_by_hash::<T>(&binding.hash) {
        binding.seen_generation = binding.cache.generation_by_hash(&binding.hash);
        self.state = QueryState::Success(data);
        self.fetched_at = Some(Instant::now());
        return;
      }
    }

    self.start_fetch();
  }

  /// Force a refetch, even if already loading or data exists.
  pub fn refetch(&mut self) {
    // Cancel any pending fetch by dropping the receiver
    self.receiver = None;
    self.start_fetch();
  }

  /// Poll for results from a pending fetch.
  ///
  /// Returns `true` if the state changed (data arrived, error occurred, or
  /// an invalidation started a new fetch). Call this in your event loop
  /// tick handler.
  pub fn poll(&mut self) -> bool {
    let changed = self.poll_receiver();

    if !self.is_loading() && self.is_invalidated() {
      self.start_fetch();
      return true;
    }

    changed
  }

  fn poll_receiver(&mut self) -> bool {
    let receiver = match &mut self.receiver {
      Some(rx) => rx,
      None => return false,
    };

    // Try to receive without blocking
    let result = match receiver.try_recv() {
      Ok(result) => result,
      Err(mpsc::error::TryRecvError::Empty) => return false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        // Sender dropped without sending - treat as error
        Err(ApiError::Transport("query was cancelled".to_string()))
      }
    };
    self.receiver = None;
    self.previous = None;

    if let Some(binding) = &mut self.binding {
      binding.seen_generation = binding.fetch_generation;
    }

    match result {
      Ok(data) => {
        if let Some(binding) = &self.binding {
          // Data fetched before an invalidation must not repopulate the slot
          if binding.cache.generation_by_hash(&binding.hash) == binding.fetch_generation {
            binding.cache.put_by_hash(&binding.hash, data.clone());
          }
        }
        self.state = QueryState::Success(data);
        self.fetched_at = Some(Instant::now());
      }
      Err(error) => {
        self.state = QueryState::Error(error);
      }
    }
    true
  }

  /// Internal: start the fetch operation
  fn start_fetch(&mut self) {
    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);

    if let QueryState::Success(data) = std::mem::replace(&mut self.state, QueryState::Loading) {
      self.previous = Some(data);
    }

    if let Some(binding) = &mut self.binding {
      binding.fetch_generation = binding.cache.generation_by_hash(&binding.hash);
    }

    let fetcher = Arc::clone(&self.fetcher);
    let retry = self.retry;
    tokio::spawn(async move {
      let result = fetch_with_retry(fetcher, retry).await;
      // Ignore send errors - receiver may have been dropped
      let _ = tx.send(result);
    });
  }
}

async fn fetch_with_retry<T: Send + 'static>(
  fetcher: FetcherFn<T>,
  retry: RetryPolicy,
) -> Result<T, ApiError> {
  let mut attempt = 1;
  loop {
    match fetcher().await {
      Ok(data) => return Ok(data),
      Err(error) if error.is_retryable() && attempt < retry.max_attempts => {
        warn!(
          attempt,
          max_attempts = retry.max_attempts,
          %error,
          "query failed, retrying"
        );
        tokio::time::sleep(retry.delay_after(attempt)).await;
        attempt += 1;
      }
      Err(error) => return Err(error),
    }
  }
}

// Query is not Clone because the receiver is owned.

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("state", &self.state)
      .field("retry", &self.retry)
      .field("fetched_at", &self.fetched_at)
      .field("stale_time", &self.stale_time)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::ErrorKind;
  use crate::cache::ApiQueryKey;
  use reqwest::StatusCode;
  use std::sync::atomic::{AtomicU32, Ordering};

  fn http_error(code: u16) -> ApiError {
    ApiError::Status {
      status: StatusCode::from_u16(code).unwrap(),
      body: String::new(),
    }
  }

  fn fast_retry() -> RetryPolicy {
    RetryPolicy {
      max_attempts: 3,
      base_delay: Duration::from_millis(1),
    }
  }

  /// Fetcher that counts its calls and fails with `code` until `succeed_on`.
  fn counting(
    calls: Arc<AtomicU32>,
    code: u16,
    succeed_on: Option<u32>,
  ) -> impl Fn() -> BoxFuture<'static, Result<u32, ApiError>> + Send + Sync + 'static {
    move || {
      let calls = calls.clone();
      Box::pin(async move {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        match succeed_on {
          Some(k) if n >= k => Ok(n),
          _ => Err(http_error(code)),
        }
      })
    }
  }

  async fn settle<T: Clone + Send + Sync + 'static>(query: &mut Query<T>) {
    for _ in 0..200 {
      tokio::time::sleep(Duration::from_millis(5)).await;
      query.poll();
      if !query.is_loading() {
        return;
      }
    }
    panic!("query did not settle");
  }

  #[tokio::test]
  async fn test_query_success() {
    let mut query = Query::new(|| async { Ok::<_, ApiError>(vec![1, 2, 3]) });

    assert!(matches!(query.state(), QueryState::Idle));

    query.fetch();
    assert!(query.is_loading());

    // Wait for the result
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(query.poll());
    assert!(matches!(query.state(), QueryState::Success(_)));
    assert_eq!(query.data(), Some(&vec![1, 2, 3]));
  }

  #[tokio::test]
  async fn test_not_implemented_is_not_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut query = Query::new(counting(calls.clone(), 404, None)).with_retry(fast_retry());

    query.fetch();
    settle(&mut query).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(query.error().map(|e| e.kind()), Some(ErrorKind::NotImplemented));
  }

  #[tokio::test]
  async fn test_transient_error_is_attempted_three_times() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut query = Query::new(counting(calls.clone(), 503, None)).with_retry(fast_retry());

    query.fetch();
    settle(&mut query).await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(query.error().map(|e| e.kind()), Some(ErrorKind::Transient));
  }

  #[tokio::test]
  async fn test_transient_error_recovers_within_budget() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut query = Query::new(counting(calls.clone(), 500, Some(2))).with_retry(fast_retry());

    query.fetch();
    settle(&mut query).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(query.data(), Some(&2));
  }

  #[test]
  fn test_retry_delay_doubles_and_caps() {
    let policy = RetryPolicy {
      max_attempts: 10,
      base_delay: Duration::from_secs(1),
    };
    assert_eq!(policy.delay_after(1), Duration::from_secs(1));
    assert_eq!(policy.delay_after(2), Duration::from_secs(2));
    assert_eq!(policy.delay_after(3), Duration::from_secs(4));
    assert_eq!(policy.delay_after(9), Duration::from_secs(30));
  }

  #[tokio::test]
  async fn test_query_stale() {
    let mut query = Query::new(|| async { Ok::<_, ApiError>(42) }).with_stale_time(Duration::ZERO);

    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;
    query.poll();

    // With zero stale time, should immediately be stale
    assert!(query.is_stale());
  }

  #[tokio::test]
  async fn test_fetch_while_loading_is_noop() {
    let mut query = Query::new(|| async {
      tokio::time::sleep(Duration::from_millis(100)).await;
      Ok::<_, ApiError>(42)
    });

    query.fetch();
    assert!(query.is_loading());

    // Second fetch should be no-op
    query.fetch();
    assert!(query.is_loading());
  }

  #[tokio::test]
  async fn test_refetch_cancels_pending() {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    let mut query = Query::new(move || {
      let counter = counter_clone.clone();
      async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok::<_, ApiError>(counter.fetch_add(1, Ordering::SeqCst))
      }
    });

    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;

    // Refetch should cancel the first and start a new one
    query.refetch();
    tokio::time::sleep(Duration::from_millis(100)).await;

    query.poll();
    // Only the second fetch should have completed and been received
    assert_eq!(query.data(), Some(&1));
  }

  #[tokio::test]
  async fn test_keyed_query_populates_and_reads_cache() {
    let cache = QueryCache::new();
    let key = ApiQueryKey::FailedReminders;
    let calls = Arc::new(AtomicU32::new(0));

    let mut first = Query::keyed(&key, cache.clone(), counting(calls.clone(), 500, Some(1)));
    first.fetch();
    settle(&mut first).await;
    assert_eq!(cache.get::<u32, _>(&key), Some(1));

    // A second view mounting the same key is served from the cache
    let mut second = Query::keyed(&key, cache.clone(), counting(calls.clone(), 500, Some(1)));
    second.fetch();
    assert_eq!(second.data(), Some(&1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_invalidation_triggers_refetch_on_poll() {
    let cache = QueryCache::new();
    let key = ApiQueryKey::EventReminders { event_id: 3 };
    let calls = Arc::new(AtomicU32::new(0));

    let mut query = Query::keyed(&key, cache.clone(), counting(calls.clone(), 500, Some(1)));
    query.fetch();
    settle(&mut query).await;
    assert_eq!(query.data(), Some(&1));
    assert!(!query.poll());

    cache.invalidate(&key);
    assert!(query.is_invalidated());
    assert!(query.poll());
    assert!(query.is_loading());
    // Previous data stays visible while reloading
    assert_eq!(query.data(), Some(&1));

    settle(&mut query).await;
    assert_eq!(query.data(), Some(&2));
    assert!(!query.is_invalidated());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }
}
