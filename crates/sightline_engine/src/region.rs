//! # Region Handles
//!
//! A [`RegionHandle`] is what consumers hold: a cheap clone that answers
//! queries against the region's published generation and records their
//! latency. It never blocks and never fails; an unregistered region simply
//! answers "no data".

use std::fmt::Display;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use sightline_core::{
    CellSize, DoubleBufferedGrid, EntityFilter, EntityId, EntitySnapshot, Generation, GridState,
    GridView, Position, QueryResult, RegionId,
};

use crate::clock::Clock;
use crate::config::RegionOptions;
use crate::metrics::{RegionCounters, RegionMetrics};
use crate::refresh::RefreshSchedule;
use crate::validation::{MotionBound, Validation};

/// Everything the engine keeps for one registered region.
#[derive(Debug)]
pub(crate) struct RegionEntry {
    pub(crate) grid: Arc<DoubleBufferedGrid>,
    pub(crate) cell_size: CellSize,
    pub(crate) options: RegionOptions,
    pub(crate) schedule: Mutex<RefreshSchedule>,
    pub(crate) counters: RegionCounters,
    pub(crate) motion: MotionBound,
}

impl RegionEntry {
    /// Raises an operational alert every `alert_after` consecutive skips.
    pub(crate) fn alert_if_stuck(&self, streak: u64) {
        let alert_after = u64::from(self.schedule.lock().policy().alert_after);
        if alert_after > 0 && streak % alert_after == 0 {
            tracing::error!(
                region = self.grid.region().raw(),
                consecutive_skips = streak,
                generation = self.grid.generation().get(),
                "region has not published for several cycles"
            );
        }
    }

    pub(crate) fn metrics(&self) -> RegionMetrics {
        let interval_ms = self.schedule.lock().current_interval_ms();
        self.counters.snapshot(
            self.grid.region(),
            self.grid.state(),
            self.grid.generation(),
            self.grid.retained_buffer_count(),
            interval_ms,
        )
    }
}

/// Query surface of one region.
#[derive(Clone)]
pub struct RegionHandle {
    entry: Arc<RegionEntry>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RegionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionHandle")
            .field("region", &self.id())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl RegionHandle {
    pub(crate) fn new(entry: Arc<RegionEntry>, clock: Arc<dyn Clock>) -> Self {
        Self { entry, clock }
    }

    /// Region this handle queries.
    #[inline]
    #[must_use]
    pub fn id(&self) -> RegionId {
        self.entry.grid.region()
    }

    /// Latest published generation.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.entry.grid.generation()
    }

    /// Lifecycle state of the region.
    #[inline]
    #[must_use]
    pub fn state(&self) -> GridState {
        self.entry.grid.state()
    }

    /// Every snapshot within `radius` of `origin` matching `filter`.
    #[must_use]
    pub fn find_in_radius(
        &self,
        origin: Position,
        radius: f32,
        filter: &EntityFilter,
    ) -> QueryResult<Vec<EntitySnapshot>> {
        self.timed(|grid| grid.find_in_radius(origin, radius, filter))
    }

    /// [`RegionHandle::find_in_radius`] with an extra fallible predicate.
    ///
    /// A predicate error aborts the query with the matches gathered so far.
    pub fn find_in_radius_where<E, F>(
        &self,
        origin: Position,
        radius: f32,
        filter: &EntityFilter,
        predicate: F,
    ) -> QueryResult<Vec<EntitySnapshot>>
    where
        E: Display,
        F: FnMut(&EntitySnapshot) -> Result<bool, E>,
    {
        self.timed(|grid| grid.find_in_radius_where(origin, radius, filter, predicate))
    }

    /// Closest snapshot to `origin` matching `filter`, within `max_radius`.
    #[must_use]
    pub fn find_nearest(
        &self,
        origin: Position,
        filter: &EntityFilter,
        max_radius: f32,
    ) -> QueryResult<Option<EntitySnapshot>> {
        self.timed(|grid| grid.find_nearest(origin, filter, max_radius))
    }

    /// [`RegionHandle::find_nearest`] with an extra fallible predicate.
    pub fn find_nearest_where<E, F>(
        &self,
        origin: Position,
        filter: &EntityFilter,
        max_radius: f32,
        predicate: F,
    ) -> QueryResult<Option<EntitySnapshot>>
    where
        E: Display,
        F: FnMut(&EntitySnapshot) -> Result<bool, E>,
    {
        self.timed(|grid| grid.find_nearest_where(origin, filter, max_radius, predicate))
    }

    /// Snapshot of `id` in the published generation.
    ///
    /// `None` means unknown, not dead.
    #[must_use]
    pub fn get_by_identity(&self, id: EntityId) -> QueryResult<Option<EntitySnapshot>> {
        self.timed(|grid| grid.get_by_identity(id))
    }

    /// Pins the published generation for several queries.
    #[must_use]
    pub fn snapshot(&self) -> Option<GridView> {
        self.entry.grid.snapshot()
    }

    /// Cheap plausibility pre-check of a claimed entity position.
    ///
    /// Not an authoritative confirmation; see [`ActionGate`](crate::ActionGate).
    #[must_use]
    pub fn check(&self, id: EntityId, claimed: Position, max_staleness_ms: u64) -> Validation {
        let Some(snapshot) = self.get_by_identity(id).into_value() else {
            return Validation::Unknown;
        };

        let age_ms = self
            .clock
            .now()
            .saturating_elapsed_since(snapshot.captured_at());
        if age_ms > max_staleness_ms {
            return Validation::Stale { age_ms };
        }

        let distance = snapshot.position().distance(claimed);
        let allowance = self.entry.motion.allowance(age_ms);
        if distance.is_nan() || distance > allowance {
            return Validation::Displaced {
                distance,
                allowance,
            };
        }
        Validation::Plausible
    }

    /// [`RegionHandle::check`] reduced to a yes/no.
    #[must_use]
    pub fn validate(&self, id: EntityId, claimed: Position, max_staleness_ms: u64) -> bool {
        self.check(id, claimed, max_staleness_ms).is_plausible()
    }

    /// Current metrics of this region.
    #[must_use]
    pub fn metrics(&self) -> RegionMetrics {
        self.entry.metrics()
    }

    fn timed<T>(&self, query: impl FnOnce(&DoubleBufferedGrid) -> T) -> T {
        let started = Instant::now();
        let result = query(&self.entry.grid);
        self.entry.counters.record_query(started.elapsed());
        result
    }
}
