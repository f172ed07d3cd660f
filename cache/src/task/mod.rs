//! Background threads owned by a cache: the janitor that sweeps expired
//! entries and the reporter that publishes statistics.

pub(crate) mod janitor;
pub(crate) mod reporter;

use std::io;
use std::thread;
use std::time::Duration;

use fibre::error::RecvErrorTimeout;
use fibre::mpmc;

/// A thread that runs a closure once per interval until stopped.
///
/// Stopping closes the signal channel, which wakes the thread immediately
/// instead of after the current interval. The thread is never joined, so
/// stopping is safe from any thread, including a reload worker that happens
/// to drop the last cache reference.
pub(crate) struct PeriodicTask {
  stop_tx: mpmc::Sender<()>,
}

impl PeriodicTask {
  pub(crate) fn spawn<F>(name: String, interval: Duration, mut tick: F) -> io::Result<Self>
  where
    F: FnMut() + Send + 'static,
  {
    let (stop_tx, stop_rx) = mpmc::bounded::<()>(1);
    thread::Builder::new().name(name).spawn(move || loop {
      match stop_rx.recv_timeout(interval) {
        Err(RecvErrorTimeout::Timeout) => tick(),
        _ => break,
      }
    })?;
    Ok(Self { stop_tx })
  }

  /// Signals the thread to exit.
  pub(crate) fn stop(self) {
    let _ = self.stop_tx.close();
  }
}
