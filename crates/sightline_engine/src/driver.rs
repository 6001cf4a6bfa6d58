//! Background thread that ticks a [`GridManager`] at a fixed cadence.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Sender};

use crate::error::{EngineError, EngineResult};
use crate::manager::GridManager;

/// Ticks a manager until stopped or dropped.
#[derive(Debug)]
pub struct RefreshDriver {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    ticks: Arc<AtomicU64>,
}

impl RefreshDriver {
    /// Starts ticking `manager` every `period`.
    ///
    /// The period should be no longer than the shortest refresh interval;
    /// regions only refresh on a tick.
    ///
    /// # Errors
    ///
    /// [`EngineError::Spawn`] if the thread cannot be started.
    pub fn spawn(manager: Arc<GridManager>, period: Duration) -> EngineResult<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let ticks = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&ticks);
        let name = String::from("sightline-refresh");

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let ticker = tick(period);
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            let report = manager.tick_now();
                            counter.fetch_add(1, Ordering::Relaxed);
                            if report.dropped > 0 {
                                tracing::debug!(dropped = report.dropped, "tick dropped jobs");
                            }
                        }
                    }
                }
                tracing::debug!(ticks = counter.load(Ordering::Relaxed), "refresh driver stopped");
            })
            .map_err(|source| EngineError::Spawn { name, source })?;

        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
            ticks,
        })
    }

    /// Ticks performed so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Stops the thread and waits for the tick in progress to finish.
    pub fn stop(&mut self) {
        // Dropping the sender disconnects the stop channel.
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("refresh driver panicked");
            }
        }
    }
}

impl Drop for RefreshDriver {
    fn drop(&mut self) {
        self.stop();
    }
}
