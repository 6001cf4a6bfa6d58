//! # Grid Manager
//!
//! Registry of live regions and the refresh loop that keeps them current.
//!
//! ## Architecture
//!
//! ```text
//!   simulation ──register/unregister──► ┌─────────────────────────┐
//!                                       │       GridManager       │
//!   driver / host ─────── tick(now) ──► │  regions: RwLock<Map>   │
//!                                       │  schedules, counters    │
//!                                       └──────────┬──────────────┘
//!                                                  │ due regions
//!                            ┌─────────────────────┼─────────────────────┐
//!                            ▼                     ▼                     ▼
//!                      ┌───────────┐         ┌───────────┐         ┌───────────┐
//!                      │ worker 0  │         │ worker 1  │   ...   │  inline   │
//!                      │ capture   │         │ capture   │         │ (0 workers│
//!                      │ build     │         │ build     │         │  or host  │
//!                      │ commit    │         │ commit    │         │  thread)  │
//!                      └───────────┘         └───────────┘         └───────────┘
//! ```
//!
//! Readers never go through the manager's locks once they hold a
//! [`RegionHandle`]. The registry lock is taken by register, unregister,
//! tick and metrics only.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use sightline_core::{CellSize, DoubleBufferedGrid, RegionId, Timestamp};

use crate::clock::{Clock, SystemClock};
use crate::config::{EngineConfig, RegionOptions};
use crate::error::{EngineError, EngineResult};
use crate::metrics::{EngineMetrics, RegionCounters, RegionMetrics};
use crate::pool::{BuildPool, DispatchError};
use crate::refresh::{run_refresh_isolated, BuildOutcome, RefreshPolicy, RefreshSchedule};
use crate::region::{RegionEntry, RegionHandle};
use crate::source::EntitySource;

/// How a region was torn down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Teardown {
    /// No build was running, or it finished within the timeout.
    Quiesced,
    /// A build was still running when the timeout expired.
    Forced {
        /// Time spent waiting before giving up.
        waited: Duration,
    },
}

/// What one [`GridManager::tick`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Regions whose interval had elapsed.
    pub due: usize,
    /// Jobs queued to the build pool.
    pub dispatched: usize,
    /// Jobs run on the ticking thread.
    pub ran_inline: usize,
    /// Inline jobs that published a generation.
    pub published: usize,
    /// Jobs skipped because the queue was full.
    pub dropped: usize,
}

/// Owns one [`DoubleBufferedGrid`] per registered region and refreshes them.
pub struct GridManager {
    config: EngineConfig,
    source: Arc<dyn EntitySource>,
    clock: Arc<dyn Clock>,
    regions: RwLock<HashMap<RegionId, Arc<RegionEntry>>>,
    pool: Mutex<Option<BuildPool>>,
    shutting_down: AtomicBool,
    dispatched: AtomicU64,
    dropped: AtomicU64,
}

impl GridManager {
    /// Creates a manager on the wall clock.
    ///
    /// # Errors
    ///
    /// [`EngineError::Config`] for an invalid configuration,
    /// [`EngineError::Spawn`] if a build worker cannot be started.
    pub fn new(config: EngineConfig, source: Arc<dyn EntitySource>) -> EngineResult<Self> {
        Self::with_clock(config, source, Arc::new(SystemClock::new()))
    }

    /// Creates a manager on a caller-supplied clock.
    ///
    /// # Errors
    ///
    /// As [`GridManager::new`].
    pub fn with_clock(
        config: EngineConfig,
        source: Arc<dyn EntitySource>,
        clock: Arc<dyn Clock>,
    ) -> EngineResult<Self> {
        config.validate()?;

        let pool = if config.worker_threads == 0 {
            None
        } else {
            Some(BuildPool::spawn(
                config.worker_threads,
                config.job_queue_capacity,
                &source,
                &clock,
            )?)
        };

        tracing::info!(
            workers = config.worker_threads,
            cell_size = config.cell_size,
            refresh_interval_ms = config.refresh_interval_ms,
            adaptive = config.adaptive_refresh,
            "grid manager started"
        );

        Ok(Self {
            config,
            source,
            clock,
            regions: RwLock::new(HashMap::new()),
            pool: Mutex::new(pool),
            shutting_down: AtomicBool::new(false),
            dispatched: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        })
    }

    /// Active configuration.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Clock used for scheduling and validation.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Registers `region` with its configured options.
    ///
    /// The region is due on the next tick.
    ///
    /// # Errors
    ///
    /// See [`GridManager::register_region_with`].
    pub fn register_region(&self, region: RegionId) -> EngineResult<RegionHandle> {
        self.register_region_with(region, self.config.region_options(region))
    }

    /// Registers `region` with explicit options.
    ///
    /// # Errors
    ///
    /// [`EngineError::RegionAlreadyRegistered`], [`EngineError::InvalidCellSize`],
    /// or [`EngineError::ShuttingDown`].
    pub fn register_region_with(
        &self,
        region: RegionId,
        options: RegionOptions,
    ) -> EngineResult<RegionHandle> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(EngineError::ShuttingDown);
        }
        let cell_size = CellSize::new(options.cell_size).map_err(|_| EngineError::InvalidCellSize {
            region,
            size: options.cell_size,
        })?;

        let mut regions = self.regions.write();
        if regions.contains_key(&region) {
            return Err(EngineError::RegionAlreadyRegistered(region));
        }

        let policy = RefreshPolicy::new(&self.config, &options);
        let entry = Arc::new(RegionEntry {
            grid: DoubleBufferedGrid::new(region),
            cell_size,
            options,
            schedule: Mutex::new(RefreshSchedule::new(policy, self.clock.now())),
            counters: RegionCounters::default(),
            motion: self.config.motion_bound(),
        });
        regions.insert(region, Arc::clone(&entry));
        drop(regions);

        tracing::info!(
            region = region.raw(),
            cell_size = options.cell_size,
            refresh_interval_ms = options.refresh_interval_ms,
            adaptive = options.adaptive_refresh,
            "region registered"
        );
        Ok(RegionHandle::new(entry, Arc::clone(&self.clock)))
    }

    /// Removes `region`, waiting up to `unregister_timeout_ms` for a running
    /// build to finish.
    ///
    /// On timeout the region is released anyway and a warning is logged; the
    /// straggling build is cancelled at its next check and its commit refused.
    /// Handles still held by consumers keep answering with "no data".
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownRegion`] if `region` is not registered.
    pub fn unregister_region(&self, region: RegionId) -> EngineResult<Teardown> {
        let entry = self
            .regions
            .write()
            .remove(&region)
            .ok_or(EngineError::UnknownRegion(region))?;

        Ok(Self::teardown(&entry, self.config.unregister_timeout()))
    }

    fn teardown(entry: &RegionEntry, timeout: Duration) -> Teardown {
        let grid = &entry.grid;
        let region = grid.region();
        grid.retire();

        let started = Instant::now();
        if grid.wait_for_quiescence(timeout) {
            grid.release_buffers();
            tracing::info!(
                region = region.raw(),
                generation = grid.generation().get(),
                "region unregistered"
            );
            Teardown::Quiesced
        } else {
            let waited = started.elapsed();
            grid.force_release();
            tracing::warn!(
                region = region.raw(),
                waited_ms = u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                "quiescence wait timed out, region force-released"
            );
            Teardown::Forced { waited }
        }
    }

    /// Query handle of a registered region.
    #[must_use]
    pub fn region(&self, region: RegionId) -> Option<RegionHandle> {
        self.regions
            .read()
            .get(&region)
            .map(|entry| RegionHandle::new(Arc::clone(entry), Arc::clone(&self.clock)))
    }

    /// Registered regions in ascending order.
    #[must_use]
    pub fn regions(&self) -> Vec<RegionId> {
        let mut ids: Vec<RegionId> = self.regions.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Dispatches a refresh for every region whose interval has elapsed.
    ///
    /// Never blocks on a build: jobs go to the pool's bounded queue, and a
    /// full queue skips the cycle. With zero workers the builds run here.
    pub fn tick(&self, now: Timestamp) -> TickReport {
        let mut report = TickReport::default();
        if self.shutting_down.load(Ordering::Acquire) {
            return report;
        }

        let due: Vec<Arc<RegionEntry>> = self
            .regions
            .read()
            .values()
            .filter(|entry| {
                let mut schedule = entry.schedule.lock();
                if schedule.is_due(now) {
                    schedule.on_dispatch(now);
                    true
                } else {
                    false
                }
            })
            .cloned()
            .collect();
        report.due = due.len();

        for entry in due {
            if self.config.worker_threads == 0 {
                self.dispatched.fetch_add(1, Ordering::Relaxed);
                report.ran_inline += 1;
                if run_refresh_isolated(&entry, self.source.as_ref(), now).is_published() {
                    report.published += 1;
                }
                continue;
            }

            let rejected = match self.pool.lock().as_ref() {
                Some(pool) => pool.try_dispatch(entry).err(),
                None => Some(DispatchError::Closed(entry)),
            };
            match rejected {
                None => {
                    self.dispatched.fetch_add(1, Ordering::Relaxed);
                    report.dispatched += 1;
                }
                Some(DispatchError::Full(entry)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    report.dropped += 1;
                    let streak = entry.counters.record_queue_full();
                    tracing::warn!(
                        region = entry.grid.region().raw(),
                        streak,
                        "build queue full, skipping cycle"
                    );
                    entry.alert_if_stuck(streak);
                }
                Some(DispatchError::Closed(entry)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    report.dropped += 1;
                    let streak = entry.counters.record_skip();
                    tracing::error!(
                        region = entry.grid.region().raw(),
                        streak,
                        "build pool has no live workers, skipping cycle"
                    );
                    entry.alert_if_stuck(streak);
                }
            }
        }
        report
    }

    /// [`GridManager::tick`] at the manager's clock.
    pub fn tick_now(&self) -> TickReport {
        self.tick(self.clock.now())
    }

    /// Runs one refresh of `region` on the calling thread, regardless of its
    /// schedule.
    ///
    /// Lets the simulation capture on the context that owns its mutation.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownRegion`] or [`EngineError::ShuttingDown`].
    /// Build failures are reported in the [`BuildOutcome`].
    pub fn refresh_region(&self, region: RegionId, now: Timestamp) -> EngineResult<BuildOutcome> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(EngineError::ShuttingDown);
        }
        let entry = self
            .regions
            .read()
            .get(&region)
            .cloned()
            .ok_or(EngineError::UnknownRegion(region))?;

        entry.schedule.lock().on_dispatch(now);
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        Ok(run_refresh_isolated(&entry, self.source.as_ref(), now))
    }

    /// Metrics of every region plus manager totals.
    #[must_use]
    pub fn metrics(&self) -> EngineMetrics {
        let mut per_region: Vec<RegionMetrics> =
            self.regions.read().values().map(|entry| entry.metrics()).collect();
        per_region.sort_unstable_by_key(|m| m.region);

        EngineMetrics {
            regions: per_region.len(),
            dispatched_jobs: self.dispatched.load(Ordering::Relaxed),
            dropped_jobs: self.dropped.load(Ordering::Relaxed),
            queued_jobs: self.pool.lock().as_ref().map_or(0, BuildPool::queued),
            published_builds: per_region.iter().map(|m| m.published_builds).sum(),
            per_region,
        }
    }

    /// Metrics of one region.
    #[must_use]
    pub fn region_metrics(&self, region: RegionId) -> Option<RegionMetrics> {
        self.regions.read().get(&region).map(|entry| entry.metrics())
    }

    /// Stops accepting work, drains and joins the build pool, then tears
    /// down every region. Idempotent.
    pub fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let pool = self.pool.lock().take();
        if let Some(mut pool) = pool {
            pool.shutdown();
        }

        let entries: Vec<Arc<RegionEntry>> =
            self.regions.write().drain().map(|(_, entry)| entry).collect();
        let mut forced = 0usize;
        for entry in &entries {
            if matches!(
                Self::teardown(entry, self.config.unregister_timeout()),
                Teardown::Forced { .. }
            ) {
                forced += 1;
            }
        }

        tracing::info!(regions = entries.len(), forced, "grid manager shut down");
    }
}

impl Drop for GridManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for GridManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridManager")
            .field("regions", &self.regions())
            .field("workers", &self.config.worker_threads)
            .field("shutting_down", &self.shutting_down.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

// Compile-time assertion: the manager is shared with the driver thread.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<GridManager>();
    assert::<RegionHandle>();
};

#[cfg(test)]
mod tests {
    use sightline_core::{CaptureBuffer, CaptureError, EntityId, EntityKind, EntityRecord, Position};

    use super::*;
    use crate::clock::ManualClock;

    struct Fixed;

    impl EntitySource for Fixed {
        fn capture(&self, region: RegionId, sink: &mut CaptureBuffer<'_>) -> Result<(), CaptureError> {
            sink.push(EntityRecord::new(
                EntityId::new(u64::from(region.raw())),
                EntityKind::Creature,
                Position::planar(1.0, 1.0),
                Timestamp::ZERO,
            ))
        }
    }

    fn inline_manager(clock: Arc<ManualClock>) -> GridManager {
        let config = EngineConfig {
            worker_threads: 0,
            ..EngineConfig::default()
        };
        GridManager::with_clock(config, Arc::new(Fixed), clock).unwrap()
    }

    #[test]
    fn test_register_twice_fails() {
        let manager = inline_manager(Arc::new(ManualClock::default()));
        manager.register_region(RegionId::new(1)).unwrap();
        assert!(matches!(
            manager.register_region(RegionId::new(1)),
            Err(EngineError::RegionAlreadyRegistered(_))
        ));
        assert_eq!(manager.regions(), vec![RegionId::new(1)]);
    }

    #[test]
    fn test_invalid_cell_size_rejected() {
        let manager = inline_manager(Arc::new(ManualClock::default()));
        let options = manager.config().region_options(RegionId::new(1)).with_cell_size(0.0);
        assert!(matches!(
            manager.register_region_with(RegionId::new(1), options),
            Err(EngineError::InvalidCellSize { .. })
        ));
    }

    #[test]
    fn test_tick_honours_interval() {
        let clock = Arc::new(ManualClock::default());
        let manager = inline_manager(Arc::clone(&clock));
        let handle = manager.register_region(RegionId::new(1)).unwrap();

        let report = manager.tick_now();
        assert_eq!(report.due, 1);
        assert_eq!(report.published, 1);
        assert_eq!(handle.generation().get(), 1);

        clock.advance(50);
        assert_eq!(manager.tick_now().due, 0);

        clock.advance(50);
        assert_eq!(manager.tick_now().published, 1);
        assert_eq!(handle.generation().get(), 2);
        assert_eq!(manager.metrics().dispatched_jobs, 2);
    }

    #[test]
    fn test_unregister_unknown_region() {
        let manager = inline_manager(Arc::new(ManualClock::default()));
        assert!(matches!(
            manager.unregister_region(RegionId::new(5)),
            Err(EngineError::UnknownRegion(_))
        ));
    }

    #[test]
    fn test_shutdown_rejects_new_work() {
        let manager = inline_manager(Arc::new(ManualClock::default()));
        let handle = manager.register_region(RegionId::new(1)).unwrap();
        manager.tick_now();
        manager.shutdown();

        assert!(manager.regions().is_empty());
        assert!(!handle.get_by_identity(EntityId::new(1)).has_data());
        assert!(matches!(
            manager.register_region(RegionId::new(2)),
            Err(EngineError::ShuttingDown)
        ));
        assert_eq!(manager.tick_now(), TickReport::default());
    }
}
