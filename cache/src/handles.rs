use crate::error::LoadError;
use crate::loader::LoadFuture;
use crate::metrics::StatsSnapshot;
use crate::shared::CacheShared;
use crate::time;

use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;
use std::time::Instant;

/// A capacity-bounded cache that loads missing values on demand and
/// refreshes stale ones in the background.
///
/// `get` on a missing or expired key runs the loader on the calling thread;
/// concurrent callers for the same key wait for that one load. `get` on an
/// entry older than `refresh_after_write` returns the cached value at once
/// and queues a reload on the cache's reload pool.
///
/// Dropping the handle stops the cache's background threads. Reloads that are
/// still queued become no-ops.
pub struct LoadingCache<K, V, H = ahash::RandomState> {
  pub(crate) shared: Arc<CacheShared<K, V, H>>,
}

impl<K, V, H> fmt::Debug for LoadingCache<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("LoadingCache")
      .field("shared", &self.shared)
      .finish()
  }
}

impl<K, V, H> LoadingCache<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Returns the value for `key`, loading it if needed.
  ///
  /// A stale value is returned as is while a reload runs in the background.
  /// Load failures are returned to every caller waiting on that load and
  /// nothing is cached for the key.
  pub fn get(&self, key: &K) -> Result<Arc<V>, LoadError> {
    let now = time::now_nanos();
    if let Some(entry) = self.shared.store.get(key) {
      if let Some(value) = self.shared.serve_entry(key, &entry, now) {
        return Ok(value);
      }
    }
    self.load_blocking(key)
  }

  /// Returns the cached value for `key` without ever loading it.
  ///
  /// A stale value still triggers a background reload.
  pub fn get_if_present(&self, key: &K) -> Option<Arc<V>> {
    let now = time::now_nanos();
    let value = self
      .shared
      .store
      .get(key)
      .and_then(|entry| self.shared.serve_entry(key, &entry, now));
    if value.is_none() {
      self.shared.metrics.record_miss();
    }
    value
  }

  /// Inserts `value`, replacing any cached value for `key`. The entry counts
  /// as freshly written.
  pub fn put(&self, key: K, value: V) {
    self.shared.install(key, Arc::new(value), time::now_nanos());
  }

  /// Queues a background reload of `key` regardless of its age.
  ///
  /// Returns `false` if the key is not cached, a reload is already running,
  /// or the reload pool is saturated.
  pub fn refresh(&self, key: &K) -> bool {
    let now = time::now_nanos();
    match self.shared.store.get(key) {
      Some(entry) if self.shared.policy.expiry(&entry, now).is_none() => {
        self.shared.schedule_reload(key, &entry, now)
      }
      _ => false,
    }
  }

  /// Removes `key` from the cache. Removing an absent key is a no-op.
  ///
  /// A reload already running for the removed entry finishes but its
  /// result is discarded.
  pub fn invalidate(&self, key: &K) {
    if self.shared.store.remove(key).is_some() {
      self.shared.metrics.record_invalidations(1);
    }
  }

  /// Removes every entry.
  pub fn invalidate_all(&self) {
    let removed = self.shared.store.clear();
    self.shared.metrics.record_invalidations(removed as u64);
    tracing::debug!(service = %self.shared.service_name, removed, "invalidated all entries");
  }

  /// The number of entries currently held, which may include expired
  /// entries that have not been swept yet.
  pub fn entry_count(&self) -> usize {
    self.shared.store.len()
  }

  /// Returns a snapshot of the cache's statistics.
  pub fn stats(&self) -> StatsSnapshot {
    self.shared.metrics.snapshot()
  }

  /// The service name used in logs and stats reports.
  pub fn service_name(&self) -> &str {
    &self.shared.service_name
  }

  /// Runs the janitor's maintenance pass on the calling thread: removes
  /// expired entries and evicts down to the maximum size.
  pub fn clean_up(&self) {
    let outcome = self
      .shared
      .store
      .sweep_expired(&self.shared.policy, time::now_nanos());
    let evicted = self.shared.store.evict_to_capacity();
    self.shared.metrics.record_evictions(outcome.total() + evicted);
  }

  /// Loads `key` on this thread, or waits for the load another thread is
  /// already running for it.
  fn load_blocking(&self, key: &K) -> Result<Arc<V>, LoadError> {
    let shared = &self.shared;
    let future = {
      let mut pending = shared.pending_stripe(key).lock();
      if let Some(in_flight) = pending.get(key).cloned() {
        drop(pending);
        shared.metrics.record_miss();
        return in_flight.wait();
      }

      // A load may have completed between the lookup and taking the lock.
      let now = time::now_nanos();
      if let Some(entry) = shared.store.get(key) {
        if shared.policy.expiry(&entry, now).is_none() {
          drop(pending);
          if let Some(value) = shared.serve_entry(key, &entry, now) {
            return Ok(value);
          }
          return self.load_blocking(key);
        }
      }

      let future = Arc::new(LoadFuture::new());
      pending.insert(key.clone(), Arc::clone(&future));
      future
    };

    shared.metrics.record_miss();
    let flight = InFlightLoad {
      shared,
      key,
      future,
      finished: false,
    };

    let started = Instant::now();
    let loaded = shared.reloader.loader().load(key);
    let elapsed = started.elapsed();

    let result = match loaded {
      Ok(Some(value)) => {
        shared.metrics.record_load_success(elapsed);
        let value = Arc::new(value);
        shared.install(key.clone(), Arc::clone(&value), time::now_nanos());
        Ok(value)
      }
      Ok(None) => {
        shared.metrics.record_load_failure(elapsed);
        Err(LoadError::Absent)
      }
      Err(err) => {
        shared.metrics.record_load_failure(elapsed);
        tracing::debug!(service = %shared.service_name, error = %err, "load failed");
        Err(LoadError::from(err))
      }
    };
    flight.finish(result)
  }
}

/// The leader's side of a single-flight load.
///
/// Finishing removes the pending marker and wakes the waiters. If the loader
/// unwinds instead, dropping the guard wakes them with `LoadError::Aborted`.
struct InFlightLoad<'a, K, V, H>
where
  K: Eq + Hash + Clone,
  H: BuildHasher + Clone,
{
  shared: &'a CacheShared<K, V, H>,
  key: &'a K,
  future: Arc<LoadFuture<V>>,
  finished: bool,
}

impl<K, V, H> InFlightLoad<'_, K, V, H>
where
  K: Eq + Hash + Clone,
  H: BuildHasher + Clone,
{
  fn finish(mut self, result: Result<Arc<V>, LoadError>) -> Result<Arc<V>, LoadError> {
    self.finished = true;
    self.shared.pending_stripe(self.key).lock().remove(self.key);
    self.future.complete(result.clone());
    result
  }
}

impl<K, V, H> Drop for InFlightLoad<'_, K, V, H>
where
  K: Eq + Hash + Clone,
  H: BuildHasher + Clone,
{
  fn drop(&mut self) {
    if self.finished {
      return;
    }
    self.shared.pending_stripe(self.key).lock().remove(self.key);
    self.future.complete(Err(LoadError::Aborted));
  }
}
