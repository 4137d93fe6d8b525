//! Inactivity watchdog: one thread per session.
//!
//! The thread sleeps on a crossbeam channel until the next possible idle
//! deadline, then asks the session whether it is idle. The probe returns the
//! time left to wait, or `None` once the session is finished with. Dropping
//! the [`Watchdog`] disconnects the channel and the thread exits.

#![allow(missing_docs)]

use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};

use crate::core::errors::{Result, TileError};

/// Handle to a running watchdog thread.
pub struct Watchdog {
    stop_tx: Option<Sender<()>>,
    join: Option<thread::JoinHandle<()>>,
}

impl Watchdog {
    /// Spawn a watchdog that first probes after `initial_wait`.
    pub fn spawn<F>(name: &str, initial_wait: Duration, probe: F) -> Result<Self>
    where
        F: FnMut(Instant) -> Option<Duration> + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || watchdog_main(&stop_rx, initial_wait, probe))
            .map_err(|source| TileError::Runtime {
                details: format!("failed to spawn watchdog thread: {source}"),
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            join: Some(join),
        })
    }

    /// Stop the thread and wait for it.
    pub fn stop(mut self) {
        self.shutdown();
    }

    /// True once the thread has returned.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(thread::JoinHandle::is_finished)
    }

    fn shutdown(&mut self) {
        drop(self.stop_tx.take());
        if let Some(join) = self.join.take() {
            // A probe may drop the last session handle from inside the thread.
            if join.thread().id() != thread::current().id() {
                let _ = join.join();
            }
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn watchdog_main<F>(stop_rx: &Receiver<()>, initial_wait: Duration, mut probe: F)
where
    F: FnMut(Instant) -> Option<Duration>,
{
    let mut wait = initial_wait;
    loop {
        match stop_rx.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => match probe(Instant::now()) {
                Some(next) => wait = next,
                None => return,
            },
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}
