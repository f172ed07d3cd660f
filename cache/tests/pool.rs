mod common;

use common::{wait_until, CountingLoader};
use fibre_loading_cache::{BuildError, CacheBuilder, LoadingCache, ReloadPool};

use std::thread;
use std::time::Duration;

#[test]
fn test_pool_requires_workers() {
  assert!(matches!(
    ReloadPool::new("empty", 0, 4),
    Err(BuildError::ZeroWorkers)
  ));
}

#[test]
fn test_pool_requires_backlog() {
  assert!(matches!(
    ReloadPool::new("no-backlog", 2, 0),
    Err(BuildError::ZeroBacklog)
  ));

  let result: Result<LoadingCache<u32, String>, _> = CacheBuilder::new()
    .maximum_size(10)
    .refresh_after_write(Duration::from_millis(20))
    .dedicated_reload_pool(2, 0)
    .loader(CountingLoader::new())
    .build();
  assert!(matches!(result, Err(BuildError::ZeroBacklog)));
}

#[test]
fn test_shared_pool_is_a_process_wide_singleton() {
  let first = ReloadPool::shared().unwrap();
  let second = ReloadPool::shared().unwrap();

  assert_eq!(first.name(), "local-cache-shared");
  assert_eq!(first.name(), second.name());
  assert!(first.workers() >= 2);
  assert!(!first.is_shutdown());
}

#[test]
fn test_caches_share_a_supplied_pool() {
  let pool = ReloadPool::new("two-caches", 2, 16).unwrap();
  let build = |loader: &CountingLoader| -> LoadingCache<u32, String> {
    CacheBuilder::new()
      .maximum_size(10)
      .refresh_after_write(Duration::from_millis(50))
      .reload_pool(pool.clone())
      .loader(loader.clone())
      .build()
      .unwrap()
  };

  let (loader_a, loader_b) = (CountingLoader::new(), CountingLoader::new());
  let cache_a = build(&loader_a);
  let cache_b = build(&loader_b);

  cache_a.get(&1).unwrap();
  cache_b.get(&1).unwrap();
  thread::sleep(Duration::from_millis(80));
  cache_a.get(&1).unwrap();
  cache_b.get(&1).unwrap();

  assert!(wait_until(Duration::from_secs(2), || {
    loader_a.reloads() == 1 && loader_b.reloads() == 1
  }));

  drop(cache_a);
  assert!(!pool.is_shutdown(), "Dropping one cache must not stop a shared pool");
  assert!(wait_until(Duration::from_secs(2), || *cache_b.get(&1).unwrap() == "reload"));
}

#[test]
fn test_stale_reads_after_pool_shutdown_keep_serving() {
  let pool = ReloadPool::new("closed", 1, 4).unwrap();
  let loader = CountingLoader::new();
  let cache: LoadingCache<u32, String> = CacheBuilder::new()
    .maximum_size(10)
    .refresh_after_write(Duration::from_millis(20))
    .reload_pool(pool.clone())
    .loader(loader.clone())
    .build()
    .unwrap();

  cache.get(&1).unwrap();
  pool.shutdown();
  thread::sleep(Duration::from_millis(40));

  assert_eq!(*cache.get(&1).unwrap(), "load");
  assert_eq!(loader.reloads(), 0);
  assert_eq!(cache.stats().reload_dropped_count, 1);
}

/// Counts this process's threads whose name starts with `prefix`.
#[cfg(target_os = "linux")]
fn threads_named(prefix: &str) -> usize {
  std::fs::read_dir("/proc/self/task")
    .unwrap()
    .filter_map(|task| std::fs::read_to_string(task.ok()?.path().join("comm")).ok())
    .filter(|name| name.trim_end().starts_with(prefix))
    .count()
}

#[cfg(target_os = "linux")]
#[test]
fn test_dropping_cache_stops_its_own_threads() {
  // Thread names are truncated to 15 bytes, so the service name stays short.
  let cache: LoadingCache<u32, String> = CacheBuilder::new()
    .service_name("owned")
    .maximum_size(10)
    .refresh_after_write(Duration::from_millis(20))
    .expire_after_write(Duration::from_secs(60))
    .dedicated_reload_pool(2, 4)
    .loader(CountingLoader::new())
    .build()
    .unwrap();

  // Two reload workers, the janitor and the stats reporter.
  assert!(wait_until(Duration::from_secs(2), || threads_named("owned-") == 4));
  assert!(wait_until(Duration::from_secs(2), || threads_named("owned-reload-") == 2));
  cache.get(&1).unwrap();

  drop(cache);
  assert!(
    wait_until(Duration::from_secs(2), || threads_named("owned-") == 0),
    "Dedicated pool workers and background tasks must exit with the cache"
  );
}
