//! Repeating timer thread
//!
//! Drives the heartbeat and healthcheck cadences. The tick closure runs on a
//! named thread; `cancel` stops the loop and joins, and a cancelled timer
//! never re-arms.

use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;
use tracing::warn;

pub struct RepeatingTimer {
    shutdown_tx: Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
    name: String,
}

impl RepeatingTimer {
    /// Start a timer calling `tick` every `interval` until cancelled.
    pub fn spawn(
        name: impl Into<String>,
        interval: Duration,
        tick: impl Fn() + Send + 'static,
    ) -> Self {
        let name = name.into();
        let (shutdown_tx, shutdown_rx) = channel::<()>();
        let thread_name = name.clone();
        let handle = thread::Builder::new()
            .name(thread_name)
            .spawn(move || loop {
                match shutdown_rx.recv_timeout(interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => tick(),
                }
            })
            .ok();
        if handle.is_none() {
            warn!(timer = %name, "failed to spawn timer thread");
        }
        Self {
            shutdown_tx,
            handle,
            name,
        }
    }

    /// Stop the timer and wait for the thread to exit. Idempotent.
    pub fn cancel(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(timer = %self.name, "timer thread panicked");
            }
        }
    }
}

impl Drop for RepeatingTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
