pub(crate) mod lru_list;

use crate::entry::CacheEntry;
use crate::time;

use std::time::Duration;

/// Why an entry stopped being servable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExpiryCause {
  /// `expire_after_write` elapsed since the entry was written.
  Write,
  /// `expire_after_access` elapsed since the entry was last read or written.
  Access,
}

/// How a lookup must treat an entry found in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Freshness {
  /// Serve as is.
  Fresh,
  /// Serve as is, and schedule a background reload.
  Stale,
  /// Do not serve. The entry is evicted and the key loaded as a miss.
  Expired(ExpiryCause),
}

/// Time-based rules deciding whether an entry is fresh, stale or expired.
///
/// All durations are held in nanoseconds so classification on the read path
/// is a handful of integer comparisons.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ExpiryPolicy {
  expire_after_write: Option<u64>,
  expire_after_access: Option<u64>,
  refresh_after_write: Option<u64>,
}

impl ExpiryPolicy {
  pub(crate) fn new(
    expire_after_write: Option<Duration>,
    expire_after_access: Option<Duration>,
    refresh_after_write: Option<Duration>,
  ) -> Self {
    Self {
      expire_after_write: expire_after_write.map(time::duration_nanos),
      expire_after_access: expire_after_access.map(time::duration_nanos),
      refresh_after_write: refresh_after_write.map(time::duration_nanos),
    }
  }

  /// Returns `true` if any rule can expire an entry, i.e. a sweep is useful.
  pub(crate) fn expires(&self) -> bool {
    self.expire_after_write.is_some() || self.expire_after_access.is_some()
  }

  /// Returns `true` if entries can become stale and need reloading.
  pub(crate) fn refreshes(&self) -> bool {
    self.refresh_after_write.is_some()
  }

  /// Returns the expiry cause for `entry` at `now`, if any.
  #[inline]
  pub(crate) fn expiry<V>(&self, entry: &CacheEntry<V>, now: u64) -> Option<ExpiryCause> {
    if let Some(ttl) = self.expire_after_write {
      if time::elapsed_since(entry.written_at(), now) >= ttl {
        return Some(ExpiryCause::Write);
      }
    }
    if let Some(tti) = self.expire_after_access {
      if time::elapsed_since(entry.last_accessed(), now) >= tti {
        return Some(ExpiryCause::Access);
      }
    }
    None
  }

  #[inline]
  pub(crate) fn classify<V>(&self, entry: &CacheEntry<V>, now: u64) -> Freshness {
    if let Some(cause) = self.expiry(entry, now) {
      return Freshness::Expired(cause);
    }
    match self.refresh_after_write {
      Some(refresh) if time::elapsed_since(entry.written_at(), now) >= refresh => Freshness::Stale,
      _ => Freshness::Fresh,
    }
  }
}
