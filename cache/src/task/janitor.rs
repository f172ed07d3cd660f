use crate::metrics::Metrics;
use crate::policy::ExpiryPolicy;
use crate::store::ShardedStore;
use crate::task::PeriodicTask;
use crate::time;

use std::hash::{BuildHasher, Hash};
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// The default interval between janitor sweeps.
pub(crate) const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// A context object holding the thread-safe parts of the cache that the
/// janitor needs to access.
pub(crate) struct JanitorContext<K, V, H> {
  pub(crate) service_name: Arc<str>,
  pub(crate) store: Arc<ShardedStore<K, V, H>>,
  pub(crate) metrics: Arc<Metrics>,
  pub(crate) policy: ExpiryPolicy,
}

impl<K, V, H> JanitorContext<K, V, H>
where
  K: Eq + Hash + Clone,
  H: BuildHasher + Clone,
{
  /// One maintenance pass: drop everything expired, then restore capacity.
  ///
  /// Expired entries are also removed lazily by lookups; the sweep only
  /// reclaims memory held by keys nobody reads anymore.
  pub(crate) fn cleanup(&self) {
    let outcome = self.store.sweep_expired(&self.policy, time::now_nanos());
    let over_capacity = self.store.evict_to_capacity();
    self.metrics.record_evictions(outcome.total() + over_capacity);

    if outcome.total() > 0 || over_capacity > 0 {
      tracing::trace!(
        service = %self.service_name,
        expired_by_write = outcome.expired_by_write,
        expired_by_access = outcome.expired_by_access,
        evicted_by_capacity = over_capacity,
        remaining = self.store.len(),
        "janitor sweep"
      );
    }
  }
}

/// The background task responsible for periodic cleanup of the cache.
pub(crate) struct Janitor {
  task: PeriodicTask,
}

impl Janitor {
  /// Spawns a new janitor thread.
  pub(crate) fn spawn<K, V, H>(
    context: JanitorContext<K, V, H>,
    tick_interval: Duration,
  ) -> io::Result<Self>
  where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
    H: BuildHasher + Clone + Send + Sync + 'static,
  {
    let name = format!("{}-janitor", context.service_name);
    let task = PeriodicTask::spawn(name, tick_interval, move || context.cleanup())?;
    Ok(Self { task })
  }

  /// Signals the janitor thread to stop.
  pub(crate) fn stop(self) {
    self.task.stop();
  }
}
