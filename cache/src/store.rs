use crate::entry::CacheEntry;
use crate::policy::lru_list::LruList;
use crate::policy::{ExpiryCause, ExpiryPolicy};

use core::fmt;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;
use parking_lot::{Mutex, RwLock};

/// A helper function to hash a key using a `BuildHasher`.
#[inline]
pub(crate) fn hash_key<K: Hash + ?Sized, H: BuildHasher>(hasher: &H, key: &K) -> u64 {
  let mut state = hasher.build_hasher();
  key.hash(&mut state);
  state.finish()
}

/// Counts of entries removed by one expiry sweep, by cause.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SweepOutcome {
  pub(crate) expired_by_write: u64,
  pub(crate) expired_by_access: u64,
}

impl SweepOutcome {
  pub(crate) fn total(&self) -> u64 {
    self.expired_by_write + self.expired_by_access
  }
}

/// One independently locked partition of the store.
///
/// Lock order is always `map` before `recency`. The recency list is only
/// ever locked on its own when it is read for victim selection or touched
/// on the hit path.
pub(crate) struct Shard<K, V, H> {
  pub(crate) map: RwLock<HashMap<K, Arc<CacheEntry<V>>, H>>,
  pub(crate) recency: Mutex<LruList<K>>,
}

/// A cache store that is partitioned into multiple, independently locked shards.
///
/// This design allows for high concurrency by ensuring that operations on
/// different keys are unlikely to contend for the same lock.
pub(crate) struct ShardedStore<K, V, H> {
  pub(crate) shards: Box<[CachePadded<Shard<K, V, H>>]>,
  pub(crate) hasher: H,
  len: CachePadded<AtomicUsize>,
  maximum_size: usize,
  // Serializes capacity eviction so concurrent inserters never over-evict.
  eviction_lock: Mutex<()>,
}

impl<K, V, H> fmt::Debug for ShardedStore<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ShardedStore")
      .field("num_shards", &self.shards.len())
      .field("len", &self.len.load(Ordering::Relaxed))
      .field("maximum_size", &self.maximum_size)
      .finish()
  }
}

impl<K, V, H> ShardedStore<K, V, H>
where
  K: Eq + Hash + Clone,
  H: BuildHasher + Clone,
{
  /// Creates a new `ShardedStore`. `num_shards` must be a power of two.
  pub(crate) fn new(
    num_shards: usize,
    initial_capacity: usize,
    maximum_size: usize,
    hasher: H,
  ) -> Self {
    let per_shard = initial_capacity.div_ceil(num_shards.max(1));
    let mut shards = Vec::with_capacity(num_shards);
    for _ in 0..num_shards {
      let shard_map = HashMap::with_capacity_and_hasher(per_shard, hasher.clone());
      shards.push(CachePadded::new(Shard {
        map: RwLock::new(shard_map),
        recency: Mutex::new(LruList::with_capacity(per_shard)),
      }));
    }

    Self {
      shards: shards.into_boxed_slice(),
      hasher,
      len: CachePadded::new(AtomicUsize::new(0)),
      maximum_size,
      eviction_lock: Mutex::new(()),
    }
  }

  #[inline]
  pub(crate) fn shard_index(&self, key: &K) -> usize {
    hash_key(&self.hasher, key) as usize & (self.shards.len() - 1)
  }

  #[inline]
  pub(crate) fn shard(&self, key: &K) -> &Shard<K, V, H> {
    &self.shards[self.shard_index(key)]
  }

  /// The number of live entries, including ones not yet swept after expiry.
  #[inline]
  pub(crate) fn len(&self) -> usize {
    self.len.load(Ordering::Acquire)
  }

  /// Returns the entry for `key` without touching any metadata.
  pub(crate) fn get(&self, key: &K) -> Option<Arc<CacheEntry<V>>> {
    self.shard(key).map.read().get(key).cloned()
  }

  /// Moves `key` to the head of its shard's recency list.
  ///
  /// Runs on the hit path, so a contended list is skipped and the recency
  /// order stays approximate.
  #[inline]
  pub(crate) fn touch(&self, key: &K, now: u64) {
    if let Some(mut recency) = self.shard(key).recency.try_lock() {
      recency.touch(key, now);
    }
  }

  /// Installs `entry` for `key`, returning the entry it replaced.
  pub(crate) fn insert(&self, key: K, entry: Arc<CacheEntry<V>>) -> Option<Arc<CacheEntry<V>>> {
    let now = entry.written_at();
    let shard = self.shard(&key);
    let mut map = shard.map.write();
    let old = map.insert(key.clone(), entry);
    shard.recency.lock().push_front(key, now);
    if old.is_none() {
      self.len.fetch_add(1, Ordering::AcqRel);
    }
    old
  }

  /// Replaces the entry for `key` with `entry`, but only if the live entry is
  /// still `expected`. Used for reload write-back.
  pub(crate) fn replace_if_same(
    &self,
    key: &K,
    expected: &Arc<CacheEntry<V>>,
    entry: Arc<CacheEntry<V>>,
  ) -> bool {
    let now = entry.written_at();
    let shard = self.shard(key);
    let mut map = shard.map.write();
    match map.get_mut(key) {
      Some(current) if Arc::ptr_eq(current, expected) => {
        *current = entry;
        shard.recency.lock().touch(key, now);
        true
      }
      _ => false,
    }
  }

  /// Removes the entry for `key`.
  pub(crate) fn remove(&self, key: &K) -> Option<Arc<CacheEntry<V>>> {
    let shard = self.shard(key);
    let mut map = shard.map.write();
    let removed = map.remove(key);
    if removed.is_some() {
      shard.recency.lock().remove(key);
      self.len.fetch_sub(1, Ordering::AcqRel);
    }
    removed
  }

  /// Removes the entry for `key` only if the live entry is still `expected`.
  pub(crate) fn remove_if_same(&self, key: &K, expected: &Arc<CacheEntry<V>>) -> bool {
    let shard = self.shard(key);
    let mut map = shard.map.write();
    if !matches!(map.get(key), Some(current) if Arc::ptr_eq(current, expected)) {
      return false;
    }
    map.remove(key);
    shard.recency.lock().remove(key);
    self.len.fetch_sub(1, Ordering::AcqRel);
    true
  }

  /// Removes every entry, returning how many were dropped.
  pub(crate) fn clear(&self) -> usize {
    let mut removed = 0;
    for shard in self.shards.iter() {
      let mut map = shard.map.write();
      removed += map.len();
      map.clear();
      shard.recency.lock().clear();
    }
    self.len.fetch_sub(removed, Ordering::AcqRel);
    removed
  }

  /// Evicts least recently used entries until the store is within
  /// `maximum_size`. Returns the number of entries evicted.
  pub(crate) fn evict_to_capacity(&self) -> u64 {
    if self.len() <= self.maximum_size {
      return 0;
    }

    let _guard = self.eviction_lock.lock();
    let mut evicted = 0;
    while self.len() > self.maximum_size {
      let Some((shard_index, victim)) = self.pick_victim() else {
        break;
      };
      let shard = &self.shards[shard_index];
      let mut map = shard.map.write();
      if map.remove(&victim).is_some() {
        shard.recency.lock().remove(&victim);
        self.len.fetch_sub(1, Ordering::AcqRel);
        evicted += 1;
      }
    }
    evicted
  }

  /// Finds the globally least recently touched key by comparing the tail of
  /// every shard's recency list.
  fn pick_victim(&self) -> Option<(usize, K)> {
    let mut oldest: Option<(usize, K, u64)> = None;
    for (index, shard) in self.shards.iter().enumerate() {
      let recency = shard.recency.lock();
      if let Some((key, touched_at)) = recency.peek_back() {
        let older = oldest.as_ref().map_or(true, |(_, _, best)| touched_at < *best);
        if older {
          oldest = Some((index, key.clone(), touched_at));
        }
      }
    }
    oldest.map(|(index, key, _)| (index, key))
  }

  /// Removes every entry that has expired at `now`.
  ///
  /// Candidates are collected under the shard's read lock; the write lock is
  /// taken only for shards that actually hold expired entries.
  pub(crate) fn sweep_expired(&self, policy: &ExpiryPolicy, now: u64) -> SweepOutcome {
    let mut outcome = SweepOutcome::default();
    if !policy.expires() {
      return outcome;
    }

    for shard in self.shards.iter() {
      let candidates: Vec<K> = shard
        .map
        .read()
        .iter()
        .filter(|(_, entry)| policy.expiry::<V>(entry, now).is_some())
        .map(|(key, _)| key.clone())
        .collect();
      if candidates.is_empty() {
        continue;
      }

      let mut map = shard.map.write();
      let mut recency = shard.recency.lock();
      for key in candidates {
        // Re-check: the entry may have been reloaded or replaced meanwhile.
        let cause = match map.get(&key).and_then(|entry| policy.expiry::<V>(entry, now)) {
          Some(cause) => cause,
          None => continue,
        };
        map.remove(&key);
        recency.remove(&key);
        self.len.fetch_sub(1, Ordering::AcqRel);
        match cause {
          ExpiryCause::Write => outcome.expired_by_write += 1,
          ExpiryCause::Access => outcome.expired_by_access += 1,
        }
      }
    }
    outcome
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  fn store(shards: usize, max: usize) -> ShardedStore<u32, u32, ahash::RandomState> {
    ShardedStore::new(shards, 16, max, ahash::RandomState::new())
  }

  fn entry(value: u32, now: u64) -> Arc<CacheEntry<u32>> {
    Arc::new(CacheEntry::new(Arc::new(value), now))
  }

  #[test]
  fn insert_replace_and_remove_track_len() {
    let store = store(4, 100);
    assert!(store.insert(1, entry(1, 1)).is_none());
    assert!(store.insert(1, entry(2, 2)).is_some());
    assert_eq!(store.len(), 1);
    assert_eq!(*store.get(&1).unwrap().value(), 2);

    assert!(store.remove(&1).is_some());
    assert!(store.remove(&1).is_none());
    assert_eq!(store.len(), 0);
  }

  #[test]
  fn evicts_least_recently_touched_across_shards() {
    let store = store(4, 3);
    for key in 0..3u32 {
      store.insert(key, entry(key, 10 + key as u64));
    }
    store.touch(&0, 100);
    store.insert(3, entry(3, 200));

    assert_eq!(store.evict_to_capacity(), 1);
    assert_eq!(store.len(), 3);
    assert!(store.get(&1).is_none(), "Key 1 was the least recently touched");
    assert!(store.get(&0).is_some());
    assert!(store.get(&3).is_some());
  }

  #[test]
  fn replace_if_same_ignores_superseded_entries() {
    let store = store(2, 10);
    let first = entry(1, 1);
    store.insert(7, first.clone());
    let second = entry(2, 2);
    store.insert(7, second.clone());

    assert!(!store.replace_if_same(&7, &first, entry(3, 3)));
    assert_eq!(*store.get(&7).unwrap().value(), 2);
    assert!(store.replace_if_same(&7, &second, entry(4, 4)));
    assert_eq!(*store.get(&7).unwrap().value(), 4);
    assert_eq!(store.len(), 1);
  }

  #[test]
  fn sweep_removes_only_expired_entries() {
    let policy = ExpiryPolicy::new(Some(Duration::from_nanos(100)), None, None);
    let store = store(2, 10);
    store.insert(1, entry(1, 1));
    store.insert(2, entry(2, 150));

    let outcome = store.sweep_expired(&policy, 200);
    assert_eq!(outcome.expired_by_write, 1);
    assert_eq!(outcome.total(), 1);
    assert!(store.get(&1).is_none());
    assert!(store.get(&2).is_some());
    assert_eq!(store.len(), 1);
  }

  #[test]
  fn clear_empties_every_shard() {
    let store = store(4, 100);
    for key in 0..20u32 {
      store.insert(key, entry(key, 1));
    }
    assert_eq!(store.clear(), 20);
    assert_eq!(store.len(), 0);
    assert_eq!(store.evict_to_capacity(), 0);
  }
}
