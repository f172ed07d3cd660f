use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam_utils::CachePadded;

/// A thread-safe, internal statistics collector for one cache.
/// All fields are atomic to allow for lock-free updates from the request
/// path, reload workers and the janitor.
#[derive(Debug)]
pub(crate) struct Metrics {
  // --- Lookups ---
  pub(crate) hits: CachePadded<AtomicU64>,
  pub(crate) misses: CachePadded<AtomicU64>,

  // --- Loads and reloads ---
  pub(crate) load_success: CachePadded<AtomicU64>,
  pub(crate) load_failure: CachePadded<AtomicU64>,
  pub(crate) total_load_nanos: CachePadded<AtomicU64>,
  pub(crate) reload_dropped: CachePadded<AtomicU64>,

  // --- Removals ---
  pub(crate) evictions: CachePadded<AtomicU64>,
  pub(crate) invalidations: CachePadded<AtomicU64>,

  created_at: Instant,
}

impl Default for Metrics {
  fn default() -> Self {
    Self {
      hits: CachePadded::new(AtomicU64::new(0)),
      misses: CachePadded::new(AtomicU64::new(0)),
      load_success: CachePadded::new(AtomicU64::new(0)),
      load_failure: CachePadded::new(AtomicU64::new(0)),
      total_load_nanos: CachePadded::new(AtomicU64::new(0)),
      reload_dropped: CachePadded::new(AtomicU64::new(0)),
      evictions: CachePadded::new(AtomicU64::new(0)),
      invalidations: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

impl Metrics {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  #[inline]
  pub(crate) fn record_hit(&self) {
    self.hits.fetch_add(1, Ordering::Relaxed);
  }

  #[inline]
  pub(crate) fn record_miss(&self) {
    self.misses.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_load_success(&self, elapsed: Duration) {
    self.load_success.fetch_add(1, Ordering::Relaxed);
    self.add_load_time(elapsed);
  }

  pub(crate) fn record_load_failure(&self, elapsed: Duration) {
    self.load_failure.fetch_add(1, Ordering::Relaxed);
    self.add_load_time(elapsed);
  }

  /// Counts a reload that was abandoned without ever finishing, e.g. one that
  /// exceeded the reload timeout. No load time is attributed to it.
  pub(crate) fn record_abandoned_reload(&self) {
    self.load_failure.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_reload_dropped(&self) {
    self.reload_dropped.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_evictions(&self, count: u64) {
    if count > 0 {
      self.evictions.fetch_add(count, Ordering::Relaxed);
    }
  }

  pub(crate) fn record_invalidations(&self, count: u64) {
    if count > 0 {
      self.invalidations.fetch_add(count, Ordering::Relaxed);
    }
  }

  fn add_load_time(&self, elapsed: Duration) {
    let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
    self.total_load_nanos.fetch_add(nanos, Ordering::Relaxed);
  }

  /// Creates a point-in-time snapshot of the current counters.
  ///
  /// Each counter is read independently, so a snapshot taken under load is
  /// internally consistent only per field.
  pub(crate) fn snapshot(&self) -> StatsSnapshot {
    StatsSnapshot {
      hit_count: self.hits.load(Ordering::Relaxed),
      miss_count: self.misses.load(Ordering::Relaxed),
      load_success_count: self.load_success.load(Ordering::Relaxed),
      load_failure_count: self.load_failure.load(Ordering::Relaxed),
      total_load_time: Duration::from_nanos(self.total_load_nanos.load(Ordering::Relaxed)),
      eviction_count: self.evictions.load(Ordering::Relaxed),
      invalidation_count: self.invalidations.load(Ordering::Relaxed),
      reload_dropped_count: self.reload_dropped.load(Ordering::Relaxed),
      uptime: self.created_at.elapsed(),
    }
  }
}

/// A point-in-time, public-facing snapshot of a cache's statistics.
///
/// Counters are cumulative since the cache was created.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
  /// Lookups that returned a cached value, fresh or stale.
  pub hit_count: u64,
  /// Lookups that found nothing usable and had to load (or wait for a load).
  pub miss_count: u64,
  /// Loads and reloads that produced a value.
  pub load_success_count: u64,
  /// Loads and reloads that failed, returned no value, or timed out.
  pub load_failure_count: u64,
  /// Total wall-clock time spent in the loader.
  pub total_load_time: Duration,
  /// Entries removed by capacity pressure or expiry.
  pub eviction_count: u64,
  /// Entries removed explicitly through `invalidate` or `invalidate_all`.
  pub invalidation_count: u64,
  /// Background reloads discarded because the reload pool was saturated.
  pub reload_dropped_count: u64,
  /// Time since the cache was created.
  pub uptime: Duration,
}

impl StatsSnapshot {
  /// `hit_count + miss_count`.
  pub fn request_count(&self) -> u64 {
    self.hit_count.saturating_add(self.miss_count)
  }

  /// Fraction of lookups that were hits, `1.0` when there were no lookups.
  pub fn hit_rate(&self) -> f64 {
    match self.request_count() {
      0 => 1.0,
      requests => self.hit_count as f64 / requests as f64,
    }
  }

  /// Fraction of lookups that were misses, `0.0` when there were no lookups.
  pub fn miss_rate(&self) -> f64 {
    match self.request_count() {
      0 => 0.0,
      requests => self.miss_count as f64 / requests as f64,
    }
  }

  /// `load_success_count + load_failure_count`.
  pub fn load_count(&self) -> u64 {
    self.load_success_count.saturating_add(self.load_failure_count)
  }

  /// Mean time spent per load attempt.
  pub fn average_load_penalty(&self) -> Duration {
    match self.load_count() {
      0 => Duration::ZERO,
      loads => {
        let nanos = self.total_load_time.as_nanos() / u128::from(loads);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
      }
    }
  }
}

impl fmt::Debug for StatsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("StatsSnapshot")
      .field("hit_count", &self.hit_count)
      .field("miss_count", &self.miss_count)
      .field("hit_rate", &format!("{:.2}%", self.hit_rate() * 100.0))
      .field("load_success_count", &self.load_success_count)
      .field("load_failure_count", &self.load_failure_count)
      .field("total_load_time", &self.total_load_time)
      .field("average_load_penalty", &self.average_load_penalty())
      .field("eviction_count", &self.eviction_count)
      .field("invalidation_count", &self.invalidation_count)
      .field("reload_dropped_count", &self.reload_dropped_count)
      .field("uptime", &self.uptime)
      .finish()
  }
}
