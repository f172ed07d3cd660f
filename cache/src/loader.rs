use crate::error::{BoxError, LoadError};

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, Thread};

/// Computes values for keys that are missing or due for refresh.
///
/// `load` runs on the caller's thread when a key is absent or expired.
/// `reload` runs on a reload pool worker when an entry has passed its refresh
/// interval, while the old value keeps being served.
///
/// Returning `Ok(None)` means "no value for this key": nothing is cached and
/// the caller of `get` receives [`LoadError::Absent`]. For a reload it keeps
/// the previous value in place.
///
/// Any closure `Fn(&K) -> Result<Option<V>, BoxError>` is a loader.
pub trait CacheLoader<K, V>: Send + Sync + 'static {
  /// Loads the value for `key`.
  fn load(&self, key: &K) -> Result<Option<V>, BoxError>;

  /// Computes a replacement for `old`. Delegates to [`load`](Self::load)
  /// unless overridden.
  fn reload(&self, key: &K, old: &V) -> Result<Option<V>, BoxError> {
    let _ = old;
    self.load(key)
  }
}

impl<K, V, F> CacheLoader<K, V> for F
where
  F: Fn(&K) -> Result<Option<V>, BoxError> + Send + Sync + 'static,
{
  fn load(&self, key: &K) -> Result<Option<V>, BoxError> {
    self(key)
  }
}

/// The internal state of a value being loaded.
enum State<V> {
  Computing,
  Complete(Result<Arc<V>, LoadError>),
}

struct Inner<V> {
  state: State<V>,
  waiters: VecDeque<Thread>,
}

/// The single in-flight load for a key.
///
/// The thread that creates it runs the loader; every other thread asking for
/// the same key parks on it and receives the same result.
pub(crate) struct LoadFuture<V> {
  inner: Mutex<Inner<V>>,
}

impl<V> LoadFuture<V> {
  /// Creates a new `LoadFuture` in the "Computing" state.
  pub(crate) fn new() -> Self {
    Self {
      inner: Mutex::new(Inner {
        state: State::Computing,
        waiters: VecDeque::new(),
      }),
    }
  }

  /// Completes the future, waking all waiters. Only the first completion
  /// takes effect.
  pub(crate) fn complete(&self, result: Result<Arc<V>, LoadError>) {
    let waiters = {
      let mut inner = self.inner.lock();
      if matches!(inner.state, State::Complete(_)) {
        return;
      }
      inner.state = State::Complete(result);
      std::mem::take(&mut inner.waiters)
    };
    for waiter in waiters {
      waiter.unpark();
    }
  }

  /// Blocks the current thread until the load completes.
  pub(crate) fn wait(&self) -> Result<Arc<V>, LoadError> {
    loop {
      {
        let mut inner = self.inner.lock();
        if let State::Complete(result) = &inner.state {
          return result.clone();
        }
        inner.waiters.push_back(thread::current());
      }
      // Spurious wakeups just re-check the state.
      thread::park();
    }
  }
}
