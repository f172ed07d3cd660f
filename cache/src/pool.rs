//! Bounded worker pools that run background reloads.
//!
//! A pool is a fixed set of named worker threads fed by a bounded
//! `fibre::mpmc` queue. Submissions never block: when the queue is full the
//! job is handed back to the caller, which drops the reload and keeps serving
//! the stale value.

use crate::error::BuildError;

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use fibre::mpmc;
use once_cell::sync::OnceCell;

/// Default backlog of the process-wide shared pool.
pub const SHARED_POOL_BACKLOG: usize = 64;

const SHARED_POOL_NAME: &str = "local-cache-shared";

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

static SHARED_POOL: OnceCell<ReloadPool> = OnceCell::new();

struct PoolInner {
  name: String,
  workers: usize,
  backlog: usize,
  sender: mpmc::Sender<Job>,
  shut_down: AtomicBool,
}

/// A handle to a reload worker pool. Cloning the handle shares the pool.
///
/// Pools are shut down explicitly with [`shutdown`](Self::shutdown), or
/// implicitly once every handle (and every cache using it) is gone.
#[derive(Clone)]
pub struct ReloadPool {
  inner: Arc<PoolInner>,
}

impl fmt::Debug for ReloadPool {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ReloadPool")
      .field("name", &self.inner.name)
      .field("workers", &self.inner.workers)
      .field("backlog", &self.inner.backlog)
      .field("queued", &self.inner.sender.len())
      .finish()
  }
}

impl ReloadPool {
  /// Starts a pool of `workers` threads named `{name}-{index}` with room for
  /// `backlog` queued reloads. Both must be greater than zero.
  pub fn new(name: impl Into<String>, workers: usize, backlog: usize) -> Result<Self, BuildError> {
    if workers == 0 {
      return Err(BuildError::ZeroWorkers);
    }
    if backlog == 0 {
      return Err(BuildError::ZeroBacklog);
    }
    let name = name.into();
    let (sender, receiver) = mpmc::bounded::<Job>(backlog);

    for index in 0..workers {
      let receiver = receiver.clone();
      let pool_name = name.clone();
      thread::Builder::new()
        .name(format!("{}-{}", name, index))
        .spawn(move || {
          while let Ok(job) = receiver.recv() {
            if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
              tracing::warn!(pool = %pool_name, "reload job panicked; worker continues");
            }
          }
        })?;
    }

    tracing::debug!(pool = %name, workers, backlog, "started reload pool");
    Ok(Self {
      inner: Arc::new(PoolInner {
        name,
        workers,
        backlog,
        sender,
        shut_down: AtomicBool::new(false),
      }),
    })
  }

  /// The process-wide pool used by caches that are not given a pool of their
  /// own. It is started on first use with one worker per CPU (at least two)
  /// and is never shut down by a cache.
  pub fn shared() -> Result<Self, BuildError> {
    SHARED_POOL
      .get_or_try_init(|| {
        ReloadPool::new(SHARED_POOL_NAME, num_cpus::get().max(2), SHARED_POOL_BACKLOG)
      })
      .cloned()
  }

  pub fn name(&self) -> &str {
    &self.inner.name
  }

  pub fn workers(&self) -> usize {
    self.inner.workers
  }

  pub fn backlog(&self) -> usize {
    self.inner.backlog
  }

  /// Number of jobs waiting for a worker.
  pub fn queued(&self) -> usize {
    self.inner.sender.len()
  }

  /// Stops accepting work. Queued jobs still run; workers exit once the
  /// queue is drained. Idempotent.
  pub fn shutdown(&self) {
    if !self.inner.shut_down.swap(true, Ordering::AcqRel) {
      let _ = self.inner.sender.close();
      tracing::debug!(pool = %self.inner.name, "reload pool shut down");
    }
  }

  pub fn is_shutdown(&self) -> bool {
    self.inner.shut_down.load(Ordering::Acquire)
  }

  /// Queues `job` without blocking. Returns `false` if the backlog is full
  /// or the pool is shut down; the job is dropped in that case.
  pub(crate) fn try_execute(&self, job: Job) -> bool {
    self.inner.sender.try_send(job).is_ok()
  }
}
