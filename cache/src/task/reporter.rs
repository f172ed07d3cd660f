use crate::metrics::{Metrics, StatsSnapshot};
use crate::task::PeriodicTask;

use std::io;
use std::sync::Arc;
use std::time::Duration;

/// The default interval between two statistics reports.
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Receives the periodic statistics of a cache.
///
/// Implementations are called from the cache's reporter thread and should
/// return quickly.
pub trait StatsSink: Send + Sync + 'static {
  fn report(&self, service_name: &str, stats: &StatsSnapshot);
}

/// Reports statistics as structured `tracing` events at `INFO` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatsSink;

impl StatsSink for TracingStatsSink {
  fn report(&self, service_name: &str, stats: &StatsSnapshot) {
    tracing::info!(
      service = service_name,
      hit_count = stats.hit_count,
      miss_count = stats.miss_count,
      hit_rate = stats.hit_rate(),
      load_success_count = stats.load_success_count,
      load_failure_count = stats.load_failure_count,
      average_load_time_us = stats.average_load_penalty().as_micros() as u64,
      eviction_count = stats.eviction_count,
      reload_dropped_count = stats.reload_dropped_count,
      "cache stats"
    );
  }
}

/// Publishes a snapshot of a cache's statistics once per interval.
pub(crate) struct Reporter {
  task: PeriodicTask,
}

impl Reporter {
  pub(crate) fn spawn(
    service_name: Arc<str>,
    metrics: Arc<Metrics>,
    sink: Arc<dyn StatsSink>,
    interval: Duration,
  ) -> io::Result<Self> {
    let name = format!("{}-stats", service_name);
    let task = PeriodicTask::spawn(name, interval, move || {
      sink.report(&service_name, &metrics.snapshot());
    })?;
    Ok(Self { task })
  }

  pub(crate) fn stop(self) {
    self.task.stop();
  }
}
