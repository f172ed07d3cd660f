use fibre_loading_cache::{BoxError, CacheBuilder, LoadingCache};

use std::sync::Arc;
use std::thread;

fn bounded_cache(maximum_size: u64, shards: usize) -> LoadingCache<u32, u32> {
  CacheBuilder::new()
    .maximum_size(maximum_size)
    .shards(shards)
    .loader_fn(|key: &u32| -> Result<Option<u32>, BoxError> { Ok(Some(key * 2)) })
    .build()
    .unwrap()
}

#[test]
fn test_size_never_exceeds_maximum() {
  let cache = bounded_cache(50, 8);

  for key in 0..500 {
    assert_eq!(*cache.get(&key).unwrap(), key * 2);
    assert!(cache.entry_count() <= 50);
  }

  let stats = cache.stats();
  assert_eq!(cache.entry_count(), 50);
  assert_eq!(stats.eviction_count, 450);
  assert_eq!(stats.miss_count, 500);
}

#[test]
fn test_least_recently_used_key_is_evicted() {
  let cache = bounded_cache(3, 1);

  cache.get(&1).unwrap();
  cache.get(&2).unwrap();
  cache.get(&3).unwrap();

  // Reading key 1 makes key 2 the least recently used.
  cache.get(&1).unwrap();
  cache.get(&4).unwrap();

  assert!(cache.get_if_present(&2).is_none(), "Key 2 should be evicted");
  assert!(cache.get_if_present(&1).is_some());
  assert!(cache.get_if_present(&3).is_some());
  assert!(cache.get_if_present(&4).is_some());
  assert_eq!(cache.stats().eviction_count, 1);
}

#[test]
fn test_put_respects_capacity() {
  let cache = bounded_cache(2, 2);
  cache.put(1, 10);
  cache.put(2, 20);
  cache.put(3, 30);

  assert_eq!(cache.entry_count(), 2);
  assert_eq!(cache.stats().eviction_count, 1);
  assert_eq!(*cache.get_if_present(&3).unwrap(), 30);
}

#[test]
fn test_concurrent_loads_stay_within_capacity() {
  let cache = Arc::new(bounded_cache(100, 16));

  let handles: Vec<_> = (0..8u32)
    .map(|thread_id| {
      let cache = cache.clone();
      thread::spawn(move || {
        for i in 0..1_000u32 {
          let key = thread_id * 1_000 + i;
          assert_eq!(*cache.get(&key).unwrap(), key * 2);
        }
      })
    })
    .collect();
  for handle in handles {
    handle.join().unwrap();
  }

  assert!(cache.entry_count() <= 100);
  let stats = cache.stats();
  assert_eq!(stats.miss_count, 8_000);
  assert_eq!(stats.eviction_count, 8_000 - cache.entry_count() as u64);
}
