mod common;

use common::CountingLoader;
use fibre_loading_cache::{BoxError, CacheBuilder, LoadError, LoadingCache};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn counting_cache(loader: &CountingLoader) -> LoadingCache<u32, String> {
  CacheBuilder::new()
    .maximum_size(100)
    .loader(loader.clone())
    .build()
    .unwrap()
}

#[test]
fn test_get_loads_on_miss_then_hits() {
  let loader = CountingLoader::new();
  let cache = counting_cache(&loader);

  assert_eq!(*cache.get(&1).unwrap(), "load");
  assert_eq!(loader.loads(), 1, "Loader should be called once");

  assert_eq!(*cache.get(&1).unwrap(), "load");
  assert_eq!(loader.loads(), 1, "Loader should NOT be called again");

  let stats = cache.stats();
  assert_eq!(stats.miss_count, 1);
  assert_eq!(stats.hit_count, 1);
  assert_eq!(stats.load_success_count, 1);
  assert_eq!(stats.load_failure_count, 0);
  assert_eq!(cache.entry_count(), 1);
}

#[test]
fn test_thundering_herd_runs_loader_once() {
  let num_threads = 16;
  let loader = CountingLoader::new().with_load_delay(Duration::from_millis(150));
  let cache = Arc::new(counting_cache(&loader));
  let barrier = Arc::new(Barrier::new(num_threads));

  let handles: Vec<_> = (0..num_threads)
    .map(|_| {
      let cache = cache.clone();
      let barrier = barrier.clone();
      thread::spawn(move || {
        barrier.wait();
        cache.get(&7).unwrap()
      })
    })
    .collect();

  for handle in handles {
    assert_eq!(*handle.join().unwrap(), "load");
  }
  assert_eq!(loader.loads(), 1, "Only one thread should run the loader");

  let stats = cache.stats();
  assert_eq!(stats.request_count(), num_threads as u64);
  assert_eq!(stats.load_success_count, 1);
}

#[test]
fn test_load_failure_is_returned_and_not_cached() {
  let calls = Arc::new(AtomicUsize::new(0));
  let cache: LoadingCache<u32, u32> = CacheBuilder::new()
    .maximum_size(10)
    .loader_fn({
      let calls = calls.clone();
      move |key: &u32| {
        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
          return Err("database is down".into());
        }
        Ok(Some(key * 10))
      }
    })
    .build()
    .unwrap();

  match cache.get(&4) {
    Err(LoadError::Failed(err)) => assert_eq!(err.to_string(), "database is down"),
    other => panic!("expected a load failure, got {:?}", other),
  }
  assert_eq!(cache.entry_count(), 0, "Failures must not be cached");
  assert_eq!(cache.stats().load_failure_count, 1);

  assert_eq!(*cache.get(&4).unwrap(), 40);
  assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_absent_value_is_an_error_and_not_cached() {
  let cache: LoadingCache<u32, u32> = CacheBuilder::new()
    .maximum_size(10)
    .loader_fn(|key: &u32| Ok(if key % 2 == 0 { Some(*key) } else { None }))
    .build()
    .unwrap();

  assert!(matches!(cache.get(&3), Err(LoadError::Absent)));
  assert!(cache.get_if_present(&3).is_none());
  assert_eq!(*cache.get(&2).unwrap(), 2);
  assert_eq!(cache.entry_count(), 1);
}

#[test]
fn test_waiters_share_the_leader_failure() {
  let num_threads = 8;
  let calls = Arc::new(AtomicUsize::new(0));
  let cache: Arc<LoadingCache<u32, u32>> = Arc::new(
    CacheBuilder::new()
      .maximum_size(10)
      .loader_fn({
        let calls = calls.clone();
        move |_key: &u32| -> Result<Option<u32>, BoxError> {
          calls.fetch_add(1, Ordering::SeqCst);
          thread::sleep(Duration::from_millis(200));
          Err("timeout talking to backend".into())
        }
      })
      .build()
      .unwrap(),
  );
  let barrier = Arc::new(Barrier::new(num_threads));

  let handles: Vec<_> = (0..num_threads)
    .map(|_| {
      let cache = cache.clone();
      let barrier = barrier.clone();
      thread::spawn(move || {
        barrier.wait();
        cache.get(&1)
      })
    })
    .collect();

  for handle in handles {
    assert!(matches!(handle.join().unwrap(), Err(LoadError::Failed(_))));
  }
  assert_eq!(calls.load(Ordering::SeqCst), 1);
  assert_eq!(cache.entry_count(), 0);
}

#[test]
fn test_panicking_loader_releases_waiters() {
  let calls = Arc::new(AtomicUsize::new(0));
  let cache: Arc<LoadingCache<u32, u32>> = Arc::new(
    CacheBuilder::new()
      .maximum_size(10)
      .loader_fn({
        let calls = calls.clone();
        move |key: &u32| {
          if calls.fetch_add(1, Ordering::SeqCst) == 0 {
            thread::sleep(Duration::from_millis(150));
            panic!("loader bug");
          }
          Ok(Some(*key))
        }
      })
      .build()
      .unwrap(),
  );

  let leader = {
    let cache = cache.clone();
    thread::spawn(move || cache.get(&9))
  };
  thread::sleep(Duration::from_millis(50));
  let waiter = {
    let cache = cache.clone();
    thread::spawn(move || cache.get(&9))
  };

  assert!(leader.join().is_err(), "The leader thread should unwind");
  assert!(matches!(waiter.join().unwrap(), Err(LoadError::Aborted)));

  // The key is loadable again afterwards.
  assert_eq!(*cache.get(&9).unwrap(), 9);
  assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_distinct_keys_load_independently() {
  let loader = CountingLoader::new().with_load_delay(Duration::from_millis(100));
  let cache = Arc::new(counting_cache(&loader));

  let started = std::time::Instant::now();
  let handles: Vec<_> = (0..4u32)
    .map(|key| {
      let cache = cache.clone();
      thread::spawn(move || cache.get(&key).unwrap())
    })
    .collect();
  for handle in handles {
    handle.join().unwrap();
  }

  assert_eq!(loader.loads(), 4);
  assert!(
    started.elapsed() < Duration::from_millis(350),
    "Loads of different keys should not serialize"
  );
}
