use once_cell::sync::Lazy;
use std::time::{Duration, Instant};

// The single, static reference point for all time calculations in the cache.
// It is initialized lazily on its first use.
static CACHE_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Returns the current time as nanoseconds since the cache epoch.
///
/// The result is never zero, so `0` can be used as a "not set" marker in
/// atomic timestamp fields.
#[inline]
pub(crate) fn now_nanos() -> u64 {
  let elapsed = Instant::now().saturating_duration_since(*CACHE_EPOCH);
  (elapsed.as_nanos() as u64).max(1)
}

/// Converts a `Duration` into nanoseconds, saturating at `u64::MAX`.
#[inline]
pub(crate) fn duration_nanos(duration: Duration) -> u64 {
  u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Nanoseconds elapsed between `earlier` and `now`, or zero if the clock reads
/// appear out of order across threads.
#[inline]
pub(crate) fn elapsed_since(earlier: u64, now: u64) -> u64 {
  now.saturating_sub(earlier)
}
