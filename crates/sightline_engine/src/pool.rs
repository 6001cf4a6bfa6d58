//! # Build Pool
//!
//! Fixed set of builder threads fed by a bounded job channel. A full channel
//! means the cycle is skipped, never that the ticking thread waits.
//!
//! Regions are independent: a slow, failing or panicking capture in one
//! region only occupies one worker for one job and never touches another
//! region's state.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Sender, TrySendError};

use crate::clock::Clock;
use crate::error::{EngineError, EngineResult};
use crate::refresh::run_refresh_isolated;
use crate::region::RegionEntry;
use crate::source::EntitySource;

/// Why a job was handed back by [`BuildPool::try_dispatch`].
#[derive(Debug)]
pub(crate) enum DispatchError {
    /// Every queue slot is taken.
    Full(Arc<RegionEntry>),
    /// The pool is shut down or has no live worker.
    Closed(Arc<RegionEntry>),
}

/// Worker threads running refresh jobs.
pub(crate) struct BuildPool {
    sender: Option<Sender<Arc<RegionEntry>>>,
    workers: Vec<JoinHandle<()>>,
}

impl BuildPool {
    /// Starts `threads` workers sharing a queue of `capacity` jobs.
    pub(crate) fn spawn(
        threads: usize,
        capacity: usize,
        source: &Arc<dyn EntitySource>,
        clock: &Arc<dyn Clock>,
    ) -> EngineResult<Self> {
        let (sender, receiver) = bounded::<Arc<RegionEntry>>(capacity);
        let mut pool = Self {
            sender: Some(sender),
            workers: Vec::with_capacity(threads),
        };

        for index in 0..threads {
            let name = format!("sightline-build-{index}");
            let receiver = receiver.clone();
            let source = Arc::clone(source);
            let clock = Arc::clone(clock);
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || {
                    for entry in receiver.iter() {
                        let _ = run_refresh_isolated(&entry, source.as_ref(), clock.now());
                    }
                })
                .map_err(|source| EngineError::Spawn { name, source })?;
            pool.workers.push(handle);
        }

        tracing::debug!(threads, capacity, "build pool started");
        Ok(pool)
    }

    /// Queues a job without blocking.
    pub(crate) fn try_dispatch(&self, entry: Arc<RegionEntry>) -> Result<(), DispatchError> {
        let Some(sender) = &self.sender else {
            return Err(DispatchError::Closed(entry));
        };
        sender.try_send(entry).map_err(|err| match err {
            TrySendError::Full(entry) => DispatchError::Full(entry),
            TrySendError::Disconnected(entry) => DispatchError::Closed(entry),
        })
    }

    /// Jobs waiting for a worker.
    pub(crate) fn queued(&self) -> usize {
        self.sender.as_ref().map_or(0, Sender::len)
    }

    /// Closes the queue, lets workers drain it and joins them.
    pub(crate) fn shutdown(&mut self) {
        if self.sender.take().is_none() {
            return;
        }
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("build worker panicked");
            }
        }
    }
}

impl Drop for BuildPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
