use crate::time;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// The outcome of trying to claim the single reload slot of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReloadClaim {
  /// No reload was in flight; the caller now owns the reload with this token.
  Claimed(u64),
  /// A reload was in flight but exceeded the reload timeout. The caller took
  /// over with this token and the old reload counts as failed.
  Superseded(u64),
  /// Another reload is in flight and still within its timeout.
  Busy,
}

/// A container for a value in the cache, holding all necessary metadata.
///
/// Entries are immutable apart from their atomics: a successful reload or
/// write installs a brand new `CacheEntry` in the store.
#[derive(Debug)]
pub(crate) struct CacheEntry<V> {
  /// The user's value, wrapped in an Arc for shared ownership.
  value: Arc<V>,
  /// The write timestamp in nanoseconds since the cache epoch.
  written_at: u64,
  /// The last access timestamp in nanoseconds since the cache epoch.
  last_accessed: AtomicU64,
  /// Start time of the in-flight reload, used as its token. 0 means none.
  reload_started_at: AtomicU64,
}

impl<V> CacheEntry<V> {
  /// Creates a new entry written (and accessed) at `now`.
  pub(crate) fn new(value: Arc<V>, now: u64) -> Self {
    Self {
      value,
      written_at: now,
      last_accessed: AtomicU64::new(now),
      reload_started_at: AtomicU64::new(0),
    }
  }

  /// Returns a clone of the `Arc` containing the value.
  #[inline]
  pub(crate) fn value(&self) -> Arc<V> {
    self.value.clone()
  }

  #[inline]
  pub(crate) fn value_ref(&self) -> &V {
    &self.value
  }

  #[inline]
  pub(crate) fn written_at(&self) -> u64 {
    self.written_at
  }

  #[inline]
  pub(crate) fn last_accessed(&self) -> u64 {
    self.last_accessed.load(Ordering::Relaxed)
  }

  /// Updates the last accessed timestamp. This is a cheap atomic store.
  #[inline]
  pub(crate) fn record_access(&self, now: u64) {
    self.last_accessed.store(now, Ordering::Relaxed);
  }

  #[cfg(test)]
  pub(crate) fn is_reloading(&self) -> bool {
    self.reload_started_at.load(Ordering::Acquire) != 0
  }

  /// Tries to become the single in-flight reload for this entry.
  pub(crate) fn try_claim_reload(&self, now: u64, timeout_nanos: u64) -> ReloadClaim {
    let current = self.reload_started_at.load(Ordering::Acquire);
    if current == 0 {
      return match self
        .reload_started_at
        .compare_exchange(0, now, Ordering::AcqRel, Ordering::Acquire)
      {
        Ok(_) => ReloadClaim::Claimed(now),
        Err(_) => ReloadClaim::Busy,
      };
    }

    if time::elapsed_since(current, now) < timeout_nanos || now == current {
      return ReloadClaim::Busy;
    }

    match self
      .reload_started_at
      .compare_exchange(current, now, Ordering::AcqRel, Ordering::Acquire)
    {
      Ok(_) => ReloadClaim::Superseded(now),
      Err(_) => ReloadClaim::Busy,
    }
  }

  /// Returns `true` if `token` still identifies the in-flight reload.
  #[inline]
  pub(crate) fn holds_reload(&self, token: u64) -> bool {
    self.reload_started_at.load(Ordering::Acquire) == token
  }

  /// Clears the reload flag if `token` still owns it.
  ///
  /// A stale token (the reload was superseded after a timeout) leaves the
  /// newer claim untouched.
  pub(crate) fn release_reload(&self, token: u64) -> bool {
    self
      .reload_started_at
      .compare_exchange(token, 0, Ordering::AcqRel, Ordering::Relaxed)
      .is_ok()
  }
}
