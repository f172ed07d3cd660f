mod common;

use common::{wait_until, CountingLoader};
use fibre_loading_cache::{CacheBuilder, LoadingCache, StatsSink, StatsSnapshot};

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Clone, Default)]
struct RecordingSink {
  reports: Arc<Mutex<Vec<(String, StatsSnapshot)>>>,
}

impl RecordingSink {
  fn count(&self) -> usize {
    self.reports.lock().len()
  }
}

impl StatsSink for RecordingSink {
  fn report(&self, service_name: &str, stats: &StatsSnapshot) {
    self
      .reports
      .lock()
      .push((service_name.to_string(), stats.clone()));
  }
}

#[test]
fn test_reporter_publishes_periodic_snapshots() {
  let sink = RecordingSink::default();
  let cache: LoadingCache<u32, String> = CacheBuilder::new()
    .service_name("reporting-cache")
    .maximum_size(10)
    .stats_interval(Duration::from_millis(30))
    .stats_sink(sink.clone())
    .loader(CountingLoader::new())
    .build()
    .unwrap();

  cache.get(&1).unwrap();
  cache.get(&1).unwrap();

  assert!(wait_until(Duration::from_secs(2), || sink.count() >= 2));
  let reports = sink.reports.lock().clone();
  let (service, last) = reports.last().unwrap();
  assert_eq!(service, "reporting-cache");
  assert_eq!(last.hit_count, 1);
  assert_eq!(last.miss_count, 1);
  assert_eq!(last.load_success_count, 1);
}

#[test]
fn test_reporter_stops_with_the_cache() {
  let sink = RecordingSink::default();
  let cache: LoadingCache<u32, String> = CacheBuilder::new()
    .maximum_size(10)
    .stats_interval(Duration::from_millis(20))
    .stats_sink(sink.clone())
    .loader(CountingLoader::new())
    .build()
    .unwrap();

  assert!(wait_until(Duration::from_secs(2), || sink.count() >= 1));
  drop(cache);

  thread::sleep(Duration::from_millis(50));
  let after_drop = sink.count();
  thread::sleep(Duration::from_millis(200));
  assert_eq!(sink.count(), after_drop, "No reports after the cache is dropped");
}
