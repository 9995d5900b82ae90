//! In-memory store of read results with per-key invalidation.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

use super::key::QueryKey;

struct CachedData {
  value: Arc<dyn Any + Send + Sync>,
  cached_at: Instant,
}

#[derive(Default)]
struct Slot {
  /// Bumped on every invalidation
  generation: u64,
  data: Option<CachedData>,
}

/// Shared cache of read results, addressed by query key.
///
/// Cloning is cheap and every clone sees the same slots. Reads populate it,
/// writes only ever invalidate: an invalidation drops the stored data and
/// bumps the slot's generation, which bound queries notice on their next
/// poll and answer with a fresh fetch.
#[derive(Clone)]
pub struct QueryCache {
  slots: Arc<Mutex<HashMap<String, Slot>>>,
  stale_time: Duration,
}

impl Default for QueryCache {
  fn default() -> Self {
    Self::new()
  }
}

impl QueryCache {
  pub fn new() -> Self {
    Self {
      slots: Arc::new(Mutex::new(HashMap::new())),
      stale_time: Duration::from_secs(60),
    }
  }

  /// How long stored data is served without a network fetch.
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  pub fn stale_time(&self) -> Duration {
    self.stale_time
  }

  fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
    // A panic while holding the lock leaves the map itself intact
    self.slots.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Fresh data for a key, if any.
  pub fn get<T, K>(&self, key: &K) -> Option<T>
  where
    T: Clone + Send + Sync + 'static,
    K: QueryKey + ?Sized,
  {
    self.get_by_hash(&key.cache_hash())
  }

  pub(crate) fn get_by_hash<T: Clone + Send + Sync + 'static>(&self, hash: &str) -> Option<T> {
    let slots = self.slots();
    let data = slots.get(hash)?.data.as_ref()?;
    if data.cached_at.elapsed() > self.stale_time {
      return None;
    }
    data.value.downcast_ref::<T>().cloned()
  }

  pub fn put<T, K>(&self, key: &K, value: T)
  where
    T: Send + Sync + 'static,
    K: QueryKey + ?Sized,
  {
    self.put_by_hash(&key.cache_hash(), value);
  }

  pub(crate) fn put_by_hash<T: Send + Sync + 'static>(&self, hash: &str, value: T) {
    let mut slots = self.slots();
    slots.entry(hash.to_string()).or_default().data = Some(CachedData {
      value: Arc::new(value),
      cached_at: Instant::now(),
    });
  }

  /// Mark a key stale so the next access fetches again.
  pub fn invalidate<K: QueryKey + ?Sized>(&self, key: &K) {
    let mut slots = self.slots();
    let slot = slots.entry(key.cache_hash()).or_default();
    slot.generation += 1;
    slot.data = None;
    debug!(
      query = %key.description(),
      generation = slot.generation,
      "invalidated cached query"
    );
  }

  /// Number of invalidations seen by a key.
  pub fn generation<K: QueryKey + ?Sized>(&self, key: &K) -> u64 {
    self.generation_by_hash(&key.cache_hash())
  }

  pub(crate) fn generation_by_hash(&self, hash: &str) -> u64 {
    self.slots().get(hash).map(|s| s.generation).unwrap_or(0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::ApiQueryKey;

  #[test]
  fn test_put_then_get() {
    let cache = QueryCache::new();
    let key = ApiQueryKey::FailedReminders;
    assert_eq!(cache.get::<Vec<i32>, _>(&key), None);

    cache.put(&key, vec![1, 2, 3]);
    assert_eq!(cache.get::<Vec<i32>, _>(&key), Some(vec![1, 2, 3]));
  }

  #[test]
  fn test_wrong_type_is_a_miss() {
    let cache = QueryCache::new();
    let key = ApiQueryKey::FailedReminders;
    cache.put(&key, 5u8);
    assert_eq!(cache.get::<String, _>(&key), None);
  }

  #[test]
  fn test_invalidate_drops_data_and_bumps_generation() {
    let cache = QueryCache::new();
    let key = ApiQueryKey::EventReminders { event_id: 1 };
    let other = ApiQueryKey::EventReminders { event_id: 2 };
    cache.put(&key, "a".to_string());
    cache.put(&other, "b".to_string());

    cache.invalidate(&key);

    assert_eq!(cache.generation(&key), 1);
    assert_eq!(cache.get::<String, _>(&key), None);
    assert_eq!(cache.generation(&other), 0);
    assert_eq!(cache.get::<String, _>(&other), Some("b".to_string()));
  }

  #[test]
  fn test_stale_data_is_not_served() {
    let cache = QueryCache::new().with_stale_time(Duration::ZERO);
    let key = ApiQueryKey::FailedReminders;
    cache.put(&key, 1u32);
    std::thread::sleep(Duration::from_millis(2));
    assert_eq!(cache.get::<u32, _>(&key), None);
  }

  #[test]
  fn test_clones_share_slots() {
    let cache = QueryCache::new();
    let clone = cache.clone();
    let key = ApiQueryKey::FailedReminders;
    clone.invalidate(&key);
    assert_eq!(cache.generation(&key), 1);
  }
}
