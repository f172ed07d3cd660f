#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use fibre_loading_cache::{BoxError, CacheLoader};

#[derive(Default)]
struct Counters {
  loads: AtomicUsize,
  reloads: AtomicUsize,
  fail_reloads: AtomicBool,
}

/// A loader that answers "load" on a miss and "reload" on a refresh, and
/// counts how often each is called.
#[derive(Clone, Default)]
pub struct CountingLoader {
  counters: Arc<Counters>,
  load_delay: Duration,
  reload_delay: Duration,
}

impl CountingLoader {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_load_delay(mut self, delay: Duration) -> Self {
    self.load_delay = delay;
    self
  }

  pub fn with_reload_delay(mut self, delay: Duration) -> Self {
    self.reload_delay = delay;
    self
  }

  pub fn fail_reloads(&self, fail: bool) {
    self.counters.fail_reloads.store(fail, Ordering::SeqCst);
  }

  pub fn loads(&self) -> usize {
    self.counters.loads.load(Ordering::SeqCst)
  }

  pub fn reloads(&self) -> usize {
    self.counters.reloads.load(Ordering::SeqCst)
  }
}

impl CacheLoader<u32, String> for CountingLoader {
  fn load(&self, _key: &u32) -> Result<Option<String>, BoxError> {
    self.counters.loads.fetch_add(1, Ordering::SeqCst);
    thread::sleep(self.load_delay);
    Ok(Some("load".to_string()))
  }

  fn reload(&self, _key: &u32, _old: &String) -> Result<Option<String>, BoxError> {
    self.counters.reloads.fetch_add(1, Ordering::SeqCst);
    thread::sleep(self.reload_delay);
    if self.counters.fail_reloads.load(Ordering::SeqCst) {
      return Err("backend unavailable".into());
    }
    Ok(Some("reload".to_string()))
  }
}

/// Polls `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
  let deadline = Instant::now() + timeout;
  loop {
    if condition() {
      return true;
    }
    if Instant::now() >= deadline {
      return false;
    }
    thread::sleep(Duration::from_millis(5));
  }
}
