mod common;

use common::CountingLoader;
use fibre_loading_cache::{CacheBuilder, LoadingCache};

use std::thread;
use std::time::Duration;

fn cache_with(loader: &CountingLoader) -> LoadingCache<u32, String> {
  CacheBuilder::new()
    .maximum_size(100)
    .refresh_after_write(Duration::from_millis(50))
    .dedicated_reload_pool(1, 4)
    .loader(loader.clone())
    .build()
    .unwrap()
}

#[test]
fn test_invalidate_is_idempotent() {
  let loader = CountingLoader::new();
  let cache = cache_with(&loader);

  cache.get(&1).unwrap();
  cache.invalidate(&1);
  assert_eq!(cache.entry_count(), 0);
  cache.invalidate(&1);
  cache.invalidate(&2);
  assert_eq!(cache.entry_count(), 0);
  assert_eq!(cache.stats().invalidation_count, 1);

  cache.get(&1).unwrap();
  assert_eq!(loader.loads(), 2, "An invalidated key loads again");
}

#[test]
fn test_invalidate_all_removes_everything() {
  let loader = CountingLoader::new();
  let cache = cache_with(&loader);

  for key in 0..20 {
    cache.get(&key).unwrap();
  }
  cache.invalidate_all();

  assert_eq!(cache.entry_count(), 0);
  assert!(cache.get_if_present(&5).is_none());
  assert_eq!(cache.stats().invalidation_count, 20);
}

#[test]
fn test_get_if_present_never_loads() {
  let loader = CountingLoader::new();
  let cache = cache_with(&loader);

  assert!(cache.get_if_present(&1).is_none());
  assert_eq!(loader.loads(), 0);
  assert_eq!(cache.stats().miss_count, 1);

  cache.put(1, "put".to_string());
  assert_eq!(*cache.get_if_present(&1).unwrap(), "put");
  assert_eq!(loader.loads(), 0);
  assert_eq!(cache.stats().hit_count, 1);
}

#[test]
fn test_put_replaces_cached_value() {
  let loader = CountingLoader::new();
  let cache = cache_with(&loader);

  assert_eq!(*cache.get(&1).unwrap(), "load");
  cache.put(1, "manual".to_string());
  assert_eq!(*cache.get(&1).unwrap(), "manual");
  assert_eq!(cache.entry_count(), 1);
}

#[test]
fn test_invalidate_discards_in_flight_reload() {
  let loader = CountingLoader::new().with_reload_delay(Duration::from_millis(200));
  let cache = cache_with(&loader);

  cache.get(&1).unwrap();
  thread::sleep(Duration::from_millis(80));
  assert_eq!(*cache.get(&1).unwrap(), "load");
  thread::sleep(Duration::from_millis(50));
  cache.invalidate(&1);

  // Let the reload finish; its result must not resurrect the key.
  thread::sleep(Duration::from_millis(300));
  assert_eq!(loader.reloads(), 1);
  assert!(cache.get_if_present(&1).is_none());
}
