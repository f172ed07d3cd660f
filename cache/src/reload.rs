//! Background reloading of stale entries.
//!
//! At most one reload is in flight per entry. The claim lives on the entry
//! itself as the start time of the reload, which doubles as its token: a
//! reload may only write back while its token is still the entry's current
//! claim and the entry is still the live one in the store.

use crate::entry::{CacheEntry, ReloadClaim};
use crate::loader::CacheLoader;
use crate::pool::{Job, ReloadPool};
use crate::shared::CacheShared;
use crate::time;

use std::hash::{BuildHasher, Hash};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The default time after which an unfinished reload is abandoned and a new
/// one may start.
pub const DEFAULT_RELOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// The pool a cache submits reloads to.
#[derive(Debug)]
pub(crate) enum PoolHandle {
  /// A pool other caches may use too. The cache never shuts it down.
  Shared(ReloadPool),
  /// A pool created for this cache alone; shut down with the cache.
  Dedicated(ReloadPool),
}

impl PoolHandle {
  pub(crate) fn pool(&self) -> &ReloadPool {
    match self {
      PoolHandle::Shared(pool) | PoolHandle::Dedicated(pool) => pool,
    }
  }
}

/// Wraps the user's loader with the pool its reloads run on.
pub(crate) struct AsyncReloader<K, V> {
  loader: Arc<dyn CacheLoader<K, V>>,
  pool: PoolHandle,
  timeout_nanos: u64,
}

impl<K, V> AsyncReloader<K, V> {
  pub(crate) fn new(loader: Arc<dyn CacheLoader<K, V>>, pool: PoolHandle, timeout: Duration) -> Self {
    Self {
      loader,
      pool,
      timeout_nanos: time::duration_nanos(timeout),
    }
  }

  /// The wrapped loader, also used for synchronous loads on a miss.
  pub(crate) fn loader(&self) -> &dyn CacheLoader<K, V> {
    &*self.loader
  }

  pub(crate) fn pool(&self) -> &PoolHandle {
    &self.pool
  }
}

impl<K, V> std::fmt::Debug for AsyncReloader<K, V> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("AsyncReloader")
      .field("pool", &self.pool)
      .field("timeout", &Duration::from_nanos(self.timeout_nanos))
      .finish_non_exhaustive()
  }
}

/// Releases the reload claim however the reload ends, panics included.
struct ReloadGuard<'a, V> {
  entry: &'a CacheEntry<V>,
  token: u64,
}

impl<V> Drop for ReloadGuard<'_, V> {
  fn drop(&mut self) {
    self.entry.release_reload(self.token);
  }
}

impl<K, V, H> CacheShared<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Submits a background reload of `entry` unless one is already running.
  ///
  /// Returns `true` if a reload was queued. The caller keeps serving the old
  /// value either way.
  pub(crate) fn schedule_reload(
    self: &Arc<Self>,
    key: &K,
    entry: &Arc<CacheEntry<V>>,
    now: u64,
  ) -> bool {
    let reloader = &self.reloader;
    let token = match entry.try_claim_reload(now, reloader.timeout_nanos) {
      ReloadClaim::Claimed(token) => token,
      ReloadClaim::Superseded(token) => {
        self.metrics.record_abandoned_reload();
        tracing::warn!(
          service = %self.service_name,
          timeout = ?Duration::from_nanos(reloader.timeout_nanos),
          "reload did not finish within the reload timeout; starting a new one"
        );
        token
      }
      ReloadClaim::Busy => return false,
    };

    let weak = Arc::downgrade(self);
    let job_key = key.clone();
    let job_entry = Arc::clone(entry);
    let job: Job = Box::new(move || match weak.upgrade() {
      Some(shared) => shared.run_reload(job_key, job_entry, token),
      None => {
        job_entry.release_reload(token);
      }
    });

    if reloader.pool.pool().try_execute(job) {
      return true;
    }

    entry.release_reload(token);
    self.metrics.record_reload_dropped();
    tracing::debug!(
      service = %self.service_name,
      pool = reloader.pool.pool().name(),
      "reload pool saturated; dropping reload and serving stale value"
    );
    false
  }

  /// Runs on a pool worker.
  fn run_reload(&self, key: K, entry: Arc<CacheEntry<V>>, token: u64) {
    let _guard = ReloadGuard {
      entry: &entry,
      token,
    };

    let started = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
      self.reloader.loader.reload(&key, entry.value_ref())
    }));
    let elapsed = started.elapsed();

    if !entry.holds_reload(token) {
      // Already counted as failed when it was superseded.
      tracing::debug!(
        service = %self.service_name,
        elapsed = ?elapsed,
        "discarding result of a reload that outlived its timeout"
      );
      return;
    }

    let result = match outcome {
      Ok(result) => result,
      Err(_) => {
        self.metrics.record_load_failure(elapsed);
        tracing::warn!(
          service = %self.service_name,
          pool = self.reloader.pool.pool().name(),
          "reload panicked; keeping previous value"
        );
        return;
      }
    };

    match result {
      Ok(Some(value)) => {
        self.metrics.record_load_success(elapsed);
        let reloaded = Arc::new(CacheEntry::new(Arc::new(value), time::now_nanos()));
        if !self.store.replace_if_same(&key, &entry, reloaded) {
          tracing::debug!(
            service = %self.service_name,
            "entry was replaced or removed during reload; discarding reloaded value"
          );
        }
      }
      Ok(None) => {
        self.metrics.record_load_failure(elapsed);
        tracing::warn!(
          service = %self.service_name,
          "reload returned no value; keeping previous value"
        );
      }
      Err(err) => {
        self.metrics.record_load_failure(elapsed);
        tracing::warn!(
          service = %self.service_name,
          error = %err,
          "reload failed; keeping previous value"
        );
      }
    }
  }
}
