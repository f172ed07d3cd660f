use crate::entry::CacheEntry;
use crate::loader::LoadFuture;
use crate::metrics::Metrics;
use crate::policy::{ExpiryPolicy, Freshness};
use crate::reload::{AsyncReloader, PoolHandle};
use crate::store::ShardedStore;
use crate::task::janitor::Janitor;
use crate::task::reporter::Reporter;

use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use ahash::HashMap;
use parking_lot::Mutex;

/// The internal, thread-safe core of a loading cache.
///
/// Reload jobs hold it weakly, so dropping the last user handle tears the
/// cache down even while reloads are queued.
pub(crate) struct CacheShared<K, V, H> {
  pub(crate) service_name: Arc<str>,
  pub(crate) store: Arc<ShardedStore<K, V, H>>,
  pub(crate) metrics: Arc<Metrics>,
  pub(crate) policy: ExpiryPolicy,
  pub(crate) reloader: AsyncReloader<K, V>,
  /// Single-flight table of loads in progress, striped like the store.
  /// Lock order: a stripe may be held while reading a store shard, never
  /// the other way around.
  pub(crate) pending_loads: Box<[Mutex<HashMap<K, Arc<LoadFuture<V>>>>]>,
  pub(crate) janitor: Option<Janitor>,
  pub(crate) reporter: Option<Reporter>,
}

impl<K, V, H> fmt::Debug for CacheShared<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheShared")
      .field("service_name", &self.service_name)
      .field("store", &self.store)
      .field("policy", &self.policy)
      .field("reloader", &self.reloader)
      .field("metrics", &self.metrics.snapshot())
      .finish_non_exhaustive()
  }
}

impl<K, V, H> Drop for CacheShared<K, V, H> {
  fn drop(&mut self) {
    if let Some(janitor) = self.janitor.take() {
      janitor.stop();
    }
    if let Some(reporter) = self.reporter.take() {
      reporter.stop();
    }
    if let PoolHandle::Dedicated(pool) = self.reloader.pool() {
      pool.shutdown();
    }
    tracing::debug!(service = %self.service_name, "cache shut down");
  }
}

impl<K, V, H> CacheShared<K, V, H>
where
  K: Eq + Hash + Clone,
  H: BuildHasher + Clone,
{
  #[inline]
  pub(crate) fn pending_stripe(&self, key: &K) -> &Mutex<HashMap<K, Arc<LoadFuture<V>>>> {
    &self.pending_loads[self.store.shard_index(key)]
  }
}

impl<K, V, H> CacheShared<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Serves a found entry if it may be served, scheduling a reload when it
  /// is stale. Expired entries are evicted and `None` is returned.
  pub(crate) fn serve_entry(
    self: &Arc<Self>,
    key: &K,
    entry: &Arc<CacheEntry<V>>,
    now: u64,
  ) -> Option<Arc<V>> {
    match self.policy.classify(entry, now) {
      Freshness::Fresh => Some(self.record_hit(key, entry, now)),
      Freshness::Stale => {
        let value = self.record_hit(key, entry, now);
        self.schedule_reload(key, entry, now);
        Some(value)
      }
      Freshness::Expired(cause) => {
        if self.store.remove_if_same(key, entry) {
          self.metrics.record_evictions(1);
          tracing::trace!(service = %self.service_name, ?cause, "evicted expired entry on read");
        }
        None
      }
    }
  }

  #[inline]
  fn record_hit(&self, key: &K, entry: &CacheEntry<V>, now: u64) -> Arc<V> {
    entry.record_access(now);
    self.store.touch(key, now);
    self.metrics.record_hit();
    entry.value()
  }

  /// Installs a freshly loaded or written value and restores capacity.
  pub(crate) fn install(&self, key: K, value: Arc<V>, now: u64) {
    self.store.insert(key, Arc::new(CacheEntry::new(value, now)));
    let evicted = self.store.evict_to_capacity();
    if evicted > 0 {
      self.metrics.record_evictions(evicted);
      tracing::trace!(service = %self.service_name, evicted, "evicted entries over capacity");
    }
  }
}
