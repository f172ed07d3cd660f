use crate::error::{BuildError, SpecError};
use crate::handles::LoadingCache;
use crate::loader::{CacheLoader, LoadFuture};
use crate::metrics::Metrics;
use crate::policy::ExpiryPolicy;
use crate::pool::ReloadPool;
use crate::reload::{AsyncReloader, PoolHandle, DEFAULT_RELOAD_TIMEOUT};
use crate::shared::CacheShared;
use crate::spec::CacheSpec;
use crate::store::ShardedStore;
use crate::task::janitor::{self, Janitor, JanitorContext};
use crate::task::reporter::{Reporter, StatsSink, TracingStatsSink, DEFAULT_STATS_INTERVAL};
use crate::BoxError;

use core::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;
use std::time::Duration;

use ahash::HashMap;
use parking_lot::Mutex;

/// The service name used when none is configured.
pub const DEFAULT_SERVICE_NAME: &str = "local-cache";

/// Where a cache runs its background reloads.
enum PoolChoice {
  /// The process-wide pool from [`ReloadPool::shared`].
  Shared,
  /// A pool supplied by the caller. It may be shared with other caches and is
  /// never shut down by this one.
  Given(ReloadPool),
  /// A pool created for this cache and shut down with it.
  Dedicated { workers: usize, backlog: usize },
}

impl fmt::Debug for PoolChoice {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      PoolChoice::Shared => f.write_str("Shared"),
      PoolChoice::Given(pool) => f.debug_tuple("Given").field(&pool.name()).finish(),
      PoolChoice::Dedicated { workers, backlog } => f
        .debug_struct("Dedicated")
        .field("workers", workers)
        .field("backlog", backlog)
        .finish(),
    }
  }
}

/// A builder for creating [`LoadingCache`] instances.
///
/// ```no_run
/// use fibre_loading_cache::{BoxError, CacheBuilder};
/// use std::time::Duration;
///
/// let cache = CacheBuilder::<u64, String>::new()
///   .maximum_size(10_000)
///   .refresh_after_write(Duration::from_secs(60))
///   .expire_after_write(Duration::from_secs(600))
///   .loader(|id: &u64| -> Result<Option<String>, BoxError> { Ok(Some(format!("user-{id}"))) })
///   .build()
///   .unwrap();
/// assert_eq!(*cache.get(&7).unwrap(), "user-7");
/// ```
pub struct CacheBuilder<K, V, H = ahash::RandomState> {
  service_name: String,
  initial_capacity: usize,
  maximum_size: Option<u64>,
  shards: Option<usize>,
  expire_after_write: Option<Duration>,
  expire_after_access: Option<Duration>,
  refresh_after_write: Option<Duration>,
  hasher: H,
  loader: Option<Arc<dyn CacheLoader<K, V>>>,
  pool: PoolChoice,
  reload_timeout: Duration,
  stats_interval: Duration,
  stats_sink: Arc<dyn StatsSink>,
  janitor_tick_interval: Option<Duration>,
}

impl<K, V, H> fmt::Debug for CacheBuilder<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheBuilder")
      .field("service_name", &self.service_name)
      .field("maximum_size", &self.maximum_size)
      .field("shards", &self.shards)
      .field("expire_after_write", &self.expire_after_write)
      .field("expire_after_access", &self.expire_after_access)
      .field("refresh_after_write", &self.refresh_after_write)
      .field("pool", &self.pool)
      .field("reload_timeout", &self.reload_timeout)
      .field("has_loader", &self.loader.is_some())
      .finish_non_exhaustive()
  }
}

// --- Constructors ---
impl<K, V, H: BuildHasher + Default> CacheBuilder<K, V, H> {
  /// Creates a new `CacheBuilder` with default settings. A maximum size and a
  /// loader must still be configured.
  pub fn new() -> Self {
    Self {
      service_name: DEFAULT_SERVICE_NAME.to_string(),
      initial_capacity: 0,
      maximum_size: None,
      shards: None,
      expire_after_write: None,
      expire_after_access: None,
      refresh_after_write: None,
      hasher: H::default(),
      loader: None,
      pool: PoolChoice::Shared,
      reload_timeout: DEFAULT_RELOAD_TIMEOUT,
      stats_interval: DEFAULT_STATS_INTERVAL,
      stats_sink: Arc::new(TracingStatsSink),
      janitor_tick_interval: None,
    }
  }

  /// Creates a builder preconfigured from a [`CacheSpec`].
  pub fn from_spec(spec: CacheSpec) -> Self {
    let mut builder = Self::new();
    builder.apply_spec(spec);
    builder
  }

  /// Creates a builder from a textual spec such as
  /// `"maximumSize=256,refreshAfterWrite=3s,expireAfterWrite=4s"`.
  pub fn parse(spec: &str) -> Result<Self, SpecError> {
    Ok(Self::from_spec(spec.parse()?))
  }
}

impl<K, V> Default for CacheBuilder<K, V, ahash::RandomState> {
  fn default() -> Self {
    Self::new()
  }
}

// --- General Configuration Methods ---
impl<K, V, H> CacheBuilder<K, V, H> {
  /// Overrides the options that are set in `spec`. Unset options keep their
  /// current value.
  pub fn apply_spec(&mut self, spec: CacheSpec) {
    if let Some(initial_capacity) = spec.initial_capacity {
      self.initial_capacity = initial_capacity;
    }
    if spec.maximum_size.is_some() {
      self.maximum_size = spec.maximum_size;
    }
    if spec.concurrency_shards.is_some() {
      self.shards = spec.concurrency_shards;
    }
    if spec.expire_after_write.is_some() {
      self.expire_after_write = spec.expire_after_write;
    }
    if spec.refresh_after_write.is_some() {
      self.refresh_after_write = spec.refresh_after_write;
    }
    if spec.expire_after_access.is_some() {
      self.expire_after_access = spec.expire_after_access;
    }
  }

  /// Names the cache in logs, thread names and stats reports.
  pub fn service_name(mut self, name: impl Into<String>) -> Self {
    self.service_name = name.into();
    self
  }

  /// Pre-sizes the entry table.
  pub fn initial_capacity(mut self, capacity: usize) -> Self {
    self.initial_capacity = capacity;
    self
  }

  /// Sets the maximum number of entries. Required.
  pub fn maximum_size(mut self, size: u64) -> Self {
    self.maximum_size = Some(size);
    self
  }

  /// Sets the number of independently locked shards. Rounded up to a power
  /// of two; zero is rejected by `build`.
  pub fn shards(mut self, shards: usize) -> Self {
    self.shards = Some(shards);
    self
  }

  /// Entries older than `duration` are never served; reading one blocks on a
  /// fresh load.
  pub fn expire_after_write(mut self, duration: Duration) -> Self {
    self.expire_after_write = Some(duration);
    self
  }

  /// Entries not read or written for `duration` are evicted.
  pub fn expire_after_access(mut self, duration: Duration) -> Self {
    self.expire_after_access = Some(duration);
    self
  }

  /// Entries older than `duration` are still served, but the first read
  /// queues a background reload. Must be shorter than `expire_after_write`.
  pub fn refresh_after_write(mut self, duration: Duration) -> Self {
    self.refresh_after_write = Some(duration);
    self
  }

  /// Sets the loader used for misses and reloads.
  pub fn loader(mut self, loader: impl CacheLoader<K, V>) -> Self {
    self.loader = Some(Arc::new(loader));
    self
  }

  /// Sets a loader from a closure. Unlike [`loader`](Self::loader), closure
  /// argument and return types are inferred.
  pub fn loader_fn<F>(self, f: F) -> Self
  where
    F: Fn(&K) -> Result<Option<V>, BoxError> + Send + Sync + 'static,
  {
    self.loader(f)
  }

  /// Runs reloads on `pool`. The pool may be shared with other caches and is
  /// not shut down when this cache is dropped.
  pub fn reload_pool(mut self, pool: ReloadPool) -> Self {
    self.pool = PoolChoice::Given(pool);
    self
  }

  /// Runs reloads on a pool owned by this cache alone, with `workers`
  /// threads and room for `backlog` queued reloads. `build` rejects zero
  /// for either.
  pub fn dedicated_reload_pool(mut self, workers: usize, backlog: usize) -> Self {
    self.pool = PoolChoice::Dedicated { workers, backlog };
    self
  }

  /// A reload still running after `timeout` is counted as failed and a new
  /// one may start. Defaults to 60 seconds.
  pub fn reload_timeout(mut self, timeout: Duration) -> Self {
    self.reload_timeout = timeout;
    self
  }

  /// Sets how often statistics are reported. Defaults to one minute.
  pub fn stats_interval(mut self, interval: Duration) -> Self {
    self.stats_interval = interval;
    self
  }

  /// Sets where statistics are reported. Defaults to [`TracingStatsSink`].
  pub fn stats_sink(mut self, sink: impl StatsSink) -> Self {
    self.stats_sink = Arc::new(sink);
    self
  }

  /// Sets the tick interval for the background cleanup task (janitor).
  /// (Primarily for testing purposes).
  #[doc(hidden)]
  pub fn janitor_tick_interval(mut self, duration: Duration) -> Self {
    self.janitor_tick_interval = Some(duration);
    self
  }

  /// Sets the hasher for the cache.
  pub fn hasher<S: BuildHasher>(self, hasher: S) -> CacheBuilder<K, V, S> {
    CacheBuilder {
      service_name: self.service_name,
      initial_capacity: self.initial_capacity,
      maximum_size: self.maximum_size,
      shards: self.shards,
      expire_after_write: self.expire_after_write,
      expire_after_access: self.expire_after_access,
      refresh_after_write: self.refresh_after_write,
      hasher,
      loader: self.loader,
      pool: self.pool,
      reload_timeout: self.reload_timeout,
      stats_interval: self.stats_interval,
      stats_sink: self.stats_sink,
      janitor_tick_interval: self.janitor_tick_interval,
    }
  }

  /// The options of this builder that a [`CacheSpec`] can express.
  pub fn spec(&self) -> CacheSpec {
    CacheSpec {
      initial_capacity: Some(self.initial_capacity),
      maximum_size: self.maximum_size,
      concurrency_shards: self.shards,
      expire_after_write: self.expire_after_write,
      refresh_after_write: self.refresh_after_write,
      expire_after_access: self.expire_after_access,
    }
  }

  /// Validates the builder configuration.
  pub(crate) fn validate(&self) -> Result<(), BuildError> {
    self.spec().validate()?;
    if self.reload_timeout.is_zero() {
      return Err(BuildError::ZeroReloadTimeout);
    }
    if self.stats_interval.is_zero() {
      return Err(BuildError::ZeroStatsInterval);
    }
    if let PoolChoice::Dedicated { workers, backlog } = self.pool {
      if workers == 0 {
        return Err(BuildError::ZeroWorkers);
      }
      if backlog == 0 {
        return Err(BuildError::ZeroBacklog);
      }
    }
    if self.loader.is_none() {
      return Err(BuildError::MissingLoader);
    }
    Ok(())
  }
}

// --- Build Methods ---
impl<K, V, H> CacheBuilder<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Validates the configuration and starts the cache.
  ///
  /// Every configuration problem is reported here; a built cache never fails
  /// because of its configuration.
  pub fn build(self) -> Result<LoadingCache<K, V, H>, BuildError> {
    self.validate()?;
    let loader = self.loader.ok_or(BuildError::MissingLoader)?;
    let maximum_size = self
      .maximum_size
      .map(|size| usize::try_from(size).unwrap_or(usize::MAX))
      .ok_or(BuildError::MissingMaximumSize)?;
    let shards = self
      .shards
      .unwrap_or_else(|| num_cpus::get() * 4)
      .max(1)
      .next_power_of_two();
    let service_name: Arc<str> = Arc::from(self.service_name);

    let pool = match self.pool {
      PoolChoice::Shared => PoolHandle::Shared(ReloadPool::shared()?),
      PoolChoice::Given(pool) => PoolHandle::Shared(pool),
      PoolChoice::Dedicated { workers, backlog } => PoolHandle::Dedicated(ReloadPool::new(
        format!("{}-reload", service_name),
        workers,
        backlog,
      )?),
    };

    let policy = ExpiryPolicy::new(
      self.expire_after_write,
      self.expire_after_access,
      self.refresh_after_write,
    );
    let store = Arc::new(ShardedStore::new(
      shards,
      self.initial_capacity.min(maximum_size),
      maximum_size,
      self.hasher,
    ));
    let metrics = Arc::new(Metrics::new());

    let janitor = if policy.expires() {
      let context = JanitorContext {
        service_name: Arc::clone(&service_name),
        store: Arc::clone(&store),
        metrics: Arc::clone(&metrics),
        policy,
      };
      let tick_interval = self
        .janitor_tick_interval
        .unwrap_or(janitor::DEFAULT_TICK_INTERVAL);
      Some(Janitor::spawn(context, tick_interval)?)
    } else {
      None
    };

    let reporter = Reporter::spawn(
      Arc::clone(&service_name),
      Arc::clone(&metrics),
      self.stats_sink,
      self.stats_interval,
    )?;

    let pending_loads = (0..shards)
      .map(|_| Mutex::new(HashMap::<K, Arc<LoadFuture<V>>>::default()))
      .collect();

    tracing::debug!(
      service = %service_name,
      maximum_size,
      shards,
      expires = policy.expires(),
      refreshes = policy.refreshes(),
      pool = pool.pool().name(),
      "created loading cache"
    );

    Ok(LoadingCache {
      shared: Arc::new(CacheShared {
        service_name,
        store,
        metrics,
        policy,
        reloader: AsyncReloader::new(loader, pool, self.reload_timeout),
        pending_loads,
        janitor,
        reporter: Some(reporter),
      }),
    })
  }
}
