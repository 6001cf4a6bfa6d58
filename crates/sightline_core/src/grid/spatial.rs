//! # Spatial Grid
//!
//! One generation's population bucketed into fixed-size cells.
//!
//! ## Layout
//!
//! ```text
//! entities: [ c(0,0) c(0,0) | c(3,1) | c(-1,2) c(-1,2) c(-1,2) | ... ]
//!              ^-- cells[(0,0)] = 0..2
//!                              ^-- cells[(3,1)] = 2..3
//! by_id:    EntityId -> index into entities
//! ```
//!
//! Every bucket is a contiguous slice of one dense vector, so a query touches
//! a handful of small slices and never chases per-entity pointers. The grid is
//! immutable once built; all allocation happens in the builder and can be
//! recycled through [`GridScratch`].

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use super::cell::{CellCoord, CellSize};
use crate::snapshot::{Capture, EntityId, EntitySnapshot, Generation, Position, RegionId, Timestamp};

/// Summary of one built grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GridStats {
    /// Indexed entities.
    pub entities: u32,
    /// Cells holding at least one entity.
    pub occupied_cells: u32,
    /// Size of the fullest cell.
    pub largest_bucket: u32,
    /// Repeated identities dropped during the build.
    pub duplicates: u32,
    /// Records rejected during the capture.
    pub rejected: u32,
}

/// Builder-private working buffers.
#[derive(Debug, Default)]
struct WorkBuffers {
    coords: Vec<CellCoord>,
    slots: Vec<u32>,
    seen: HashSet<EntityId>,
    capture: Vec<EntitySnapshot>,
}

/// Allocations salvaged from a retired grid.
///
/// Never visible to readers: a grid is only dismantled once the builder owns
/// the last reference to it.
#[derive(Debug, Default)]
pub struct GridScratch {
    entities: Vec<EntitySnapshot>,
    cells: HashMap<CellCoord, Range<u32>>,
    by_id: HashMap<EntityId, u32>,
    work: WorkBuffers,
}

impl GridScratch {
    /// Hands out the capture vector so the next capture writes into it.
    pub fn take_capture_storage(&mut self) -> Vec<EntitySnapshot> {
        std::mem::take(&mut self.work.capture)
    }

    /// Entity capacity currently held.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entities.capacity()
    }
}

/// Builds a [`SpatialGrid`] from a sealed capture.
pub struct SpatialGridBuilder {
    cell_size: CellSize,
    scratch: GridScratch,
}

impl SpatialGridBuilder {
    /// Creates a builder with fresh buffers.
    #[must_use]
    pub fn new(cell_size: CellSize) -> Self {
        Self {
            cell_size,
            scratch: GridScratch::default(),
        }
    }

    /// Reuses the buffers of a retired grid.
    #[must_use]
    pub fn with_scratch(mut self, scratch: GridScratch) -> Self {
        self.scratch = scratch;
        self
    }

    /// Buckets the capture. O(N) counting placement.
    ///
    /// When an identity appears more than once the first occurrence wins.
    #[must_use]
    pub fn build(self, capture: Capture) -> SpatialGrid {
        let Self { cell_size, scratch } = self;
        let GridScratch {
            mut entities,
            mut cells,
            mut by_id,
            mut work,
        } = scratch;

        let region = capture.region();
        let generation = capture.generation();
        let captured_at = capture.captured_at();
        let rejected = capture.stats().rejected();
        let mut source = capture.into_snapshots();

        // Pass 0: drop repeated identities.
        let mut duplicates = 0u32;
        work.seen.clear();
        source.retain(|snapshot| {
            if work.seen.insert(snapshot.id()) {
                true
            } else {
                duplicates += 1;
                tracing::warn!(
                    region = region.raw(),
                    entity = snapshot.id().raw(),
                    "duplicate identity in capture, keeping first occurrence"
                );
                false
            }
        });

        // Pass 1: count per cell. `end` holds the count for now.
        work.coords.clear();
        work.coords
            .extend(source.iter().map(|snapshot| cell_size.coord_of(snapshot.position())));
        cells.clear();
        for coord in &work.coords {
            cells.entry(*coord).or_insert(0..0).end += 1;
        }

        // Prefix sums. `end` becomes the write cursor, starting at `start`.
        let mut offset = 0u32;
        let mut largest_bucket = 0u32;
        for range in cells.values_mut() {
            let count = range.end;
            largest_bucket = largest_bucket.max(count);
            *range = offset..offset;
            offset += count;
        }

        // Pass 2: scatter. Afterwards every `end` is back at `start + count`.
        work.slots.clear();
        work.slots.resize(source.len(), 0);
        for (index, coord) in work.coords.iter().enumerate() {
            if let Some(range) = cells.get_mut(coord) {
                work.slots[range.end as usize] = to_index(index);
                range.end += 1;
            }
        }

        entities.clear();
        by_id.clear();
        entities.reserve(source.len());
        by_id.reserve(source.len());
        for (dest, &src) in work.slots.iter().enumerate() {
            let snapshot = source[src as usize];
            by_id.insert(snapshot.id(), to_index(dest));
            entities.push(snapshot);
        }

        source.clear();
        work.capture = source;

        let stats = GridStats {
            entities: to_index(entities.len()),
            occupied_cells: to_index(cells.len()),
            largest_bucket,
            duplicates,
            rejected,
        };

        tracing::debug!(
            region = region.raw(),
            generation = generation.get(),
            entities = stats.entities,
            cells = stats.occupied_cells,
            largest_bucket = stats.largest_bucket,
            "grid built"
        );

        SpatialGrid {
            region,
            generation,
            captured_at,
            cell_size,
            entities,
            cells,
            by_id,
            stats,
            work,
        }
    }
}

/// Result of a nearest-neighbour scan.
///
/// `error` is set when the acceptance predicate failed; `best` still holds
/// the closest entity accepted before the failure.
#[derive(Debug)]
pub struct NearestOutcome<'g, E> {
    /// Closest accepted entity.
    pub best: Option<&'g EntitySnapshot>,
    /// Predicate failure that cut the scan short.
    pub error: Option<E>,
}

/// Immutable spatial index of one region generation.
#[derive(Debug)]
pub struct SpatialGrid {
    region: RegionId,
    generation: Generation,
    captured_at: Timestamp,
    cell_size: CellSize,
    entities: Vec<EntitySnapshot>,
    cells: HashMap<CellCoord, Range<u32>>,
    by_id: HashMap<EntityId, u32>,
    stats: GridStats,
    work: WorkBuffers,
}

impl SpatialGrid {
    /// Region this grid indexes.
    #[inline]
    #[must_use]
    pub const fn region(&self) -> RegionId {
        self.region
    }

    /// Generation stamped on every entity in this grid.
    #[inline]
    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.generation
    }

    /// Clock time at which the capture started.
    #[inline]
    #[must_use]
    pub const fn captured_at(&self) -> Timestamp {
        self.captured_at
    }

    /// Cell edge length used for bucketing.
    #[inline]
    #[must_use]
    pub const fn cell_size(&self) -> CellSize {
        self.cell_size
    }

    /// Build summary.
    #[inline]
    #[must_use]
    pub const fn stats(&self) -> GridStats {
        self.stats
    }

    /// Number of indexed entities.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if the grid indexes nothing.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Looks an entity up by identity.
    #[inline]
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&EntitySnapshot> {
        self.by_id.get(&id).map(|&index| &self.entities[index as usize])
    }

    /// Every entity, bucket by bucket.
    pub fn iter(&self) -> std::slice::Iter<'_, EntitySnapshot> {
        self.entities.iter()
    }

    /// Entities of one cell. Empty for unoccupied cells.
    #[must_use]
    pub fn bucket(&self, coord: CellCoord) -> &[EntitySnapshot] {
        self.cells
            .get(&coord)
            .map_or(&[], |range| self.slice(range))
    }

    /// Calls `visit` for every entity whose exact 3D distance to `origin` is
    /// at most `radius`.
    ///
    /// Visits nothing for a non-positive or NaN radius or a non-finite origin.
    ///
    /// # Errors
    ///
    /// Stops at, and returns, the first error from `visit`.
    pub fn visit_radius<E, F>(&self, origin: Position, radius: f32, mut visit: F) -> Result<(), E>
    where
        F: FnMut(&EntitySnapshot) -> Result<(), E>,
    {
        if radius.is_nan() || radius <= 0.0 || !origin.is_finite() {
            return Ok(());
        }
        let radius_sq = radius * radius;
        let range = self.cell_size.range_around(origin, radius);

        let mut scan = |bucket: &[EntitySnapshot]| -> Result<(), E> {
            for snapshot in bucket {
                if snapshot.position().distance_squared(origin) <= radius_sq {
                    visit(snapshot)?;
                }
            }
            Ok(())
        };

        // Huge ranges: walk the occupied cells instead of the empty ones.
        if range.cell_count() > self.cells.len() as u64 {
            for (coord, bucket) in &self.cells {
                if range.contains(*coord) {
                    scan(self.slice(bucket))?;
                }
            }
        } else {
            for coord in range.iter() {
                if let Some(bucket) = self.cells.get(&coord) {
                    scan(self.slice(bucket))?;
                }
            }
        }
        Ok(())
    }

    /// Finds the accepted entity closest to `origin` within `max_radius`.
    ///
    /// Searches outward ring by ring and stops once no unvisited ring can
    /// hold anything closer. Equal distances resolve to the smaller id.
    /// `accept` is only consulted for entities that would improve on the
    /// current best.
    pub fn nearest<E, F>(&self, origin: Position, max_radius: f32, accept: F) -> NearestOutcome<'_, E>
    where
        F: FnMut(&EntitySnapshot) -> Result<bool, E>,
    {
        let outcome = NearestOutcome {
            best: None,
            error: None,
        };
        if max_radius.is_nan() || max_radius <= 0.0 || !origin.is_finite() || self.is_empty() {
            return outcome;
        }
        let mut search = NearestSearch {
            origin,
            limit_sq: max_radius * max_radius,
            best_sq: f32::INFINITY,
            accept,
            outcome,
        };

        let rings = self.cell_size.rings_for(max_radius);
        let side = rings.saturating_mul(2).saturating_add(1);
        if side.saturating_mul(side) > self.cells.len() as u64 {
            for snapshot in &self.entities {
                if search.consider(snapshot).is_err() {
                    break;
                }
            }
            return search.outcome;
        }

        let center = self.cell_size.coord_of(origin);
        let size = self.cell_size.get();
        'rings: for k in 0..=rings {
            if k > 1 && search.outcome.best.is_some() {
                // The origin sits inside the center cell, so ring k is at
                // least (k - 1) cells away.
                #[allow(clippy::cast_precision_loss)]
                let gap = (k - 1) as f32 * size;
                if gap * gap > search.best_sq {
                    break;
                }
            }
            let Ok(ring) = u32::try_from(k) else {
                break;
            };
            for coord in center.ring(ring) {
                let Some(bucket) = self.cells.get(&coord) else {
                    continue;
                };
                for snapshot in self.slice(bucket) {
                    if search.consider(snapshot).is_err() {
                        break 'rings;
                    }
                }
            }
        }
        search.outcome
    }

    /// Dismantles the grid so its allocations can back the next build.
    #[must_use]
    pub fn into_scratch(self) -> GridScratch {
        let Self {
            mut entities,
            mut cells,
            mut by_id,
            work,
            ..
        } = self;
        entities.clear();
        cells.clear();
        by_id.clear();
        GridScratch {
            entities,
            cells,
            by_id,
            work,
        }
    }

    #[inline]
    fn slice(&self, range: &Range<u32>) -> &[EntitySnapshot] {
        &self.entities[range.start as usize..range.end as usize]
    }
}

/// Running state of [`SpatialGrid::nearest`].
struct NearestSearch<'g, E, F> {
    origin: Position,
    limit_sq: f32,
    best_sq: f32,
    accept: F,
    outcome: NearestOutcome<'g, E>,
}

impl<'g, E, F> NearestSearch<'g, E, F>
where
    F: FnMut(&EntitySnapshot) -> Result<bool, E>,
{
    /// `Err(())` once the predicate has failed; the error is kept in the outcome.
    fn consider(&mut self, snapshot: &'g EntitySnapshot) -> Result<(), ()> {
        let d2 = snapshot.position().distance_squared(self.origin);
        if d2 > self.limit_sq {
            return Ok(());
        }
        let improves = match self.outcome.best {
            None => true,
            Some(current) => {
                d2 < self.best_sq || (d2 <= self.best_sq && snapshot.id() < current.id())
            }
        };
        if !improves {
            return Ok(());
        }
        match (self.accept)(snapshot) {
            Ok(true) => {
                self.best_sq = d2;
                self.outcome.best = Some(snapshot);
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(err) => {
                self.outcome.error = Some(err);
                Err(())
            }
        }
    }
}

#[inline]
fn to_index(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
