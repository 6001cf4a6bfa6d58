//! # Double-Buffered Grid
//!
//! Wait-free publication of spatial grids for one region.
//!
//! ## Architecture
//!
//! ```text
//!                  ┌──────────────────────────────────┐
//!                  │       DoubleBufferedGrid         │
//!                  │                                  │
//!                  │  ┌──────────┐    ┌──────────┐   │
//!                  │  │ Slot A   │    │ Slot B   │   │
//!                  │  │ even gen │    │ odd gen  │   │
//!                  │  └────┬─────┘    └────┬─────┘   │
//!                  │       │               │         │
//!                  │  ┌────┴───────────────┴─────┐   │
//!                  │  │ published: AtomicU64     │   │
//!                  │  │ (generation, slot = g%2) │   │
//!                  │  └──────────────────────────┘   │
//!                  └──────────────────────────────────┘
//!                               │
//!             ┌─────────────────┼─────────────────┐
//!             ▼                 ▼                 ▼
//!      ┌─────────────┐  ┌──────────────┐  ┌──────────────┐
//!      │ BuildGuard  │  │  GridView    │  │ Quiescence   │
//!      │ (1 builder) │  │ (N readers)  │  │ (teardown)   │
//!      └─────────────┘  └──────────────┘  └──────────────┘
//! ```
//!
//! ## Protocol
//!
//! - A build always targets the inactive slot, `(published + 1) % 2`.
//! - `commit` stores the finished grid into that slot, then release-stores
//!   the new generation. Readers acquire-load the generation and then the
//!   slot it names, so a grid is never visible before it is complete.
//! - Generation and active index are the same atomic word; a reader can
//!   never pair a grid with the wrong generation.
//! - Slots hold `Arc`s. A reader that keeps a [`GridView`] past the next
//!   publish keeps the old grid alive; the builder then starts from fresh
//!   buffers instead of recycling it.
//!
//! Readers never touch the build flag or the quiescence mutex.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use parking_lot::{Condvar, Mutex};

use crate::error::{BuildError, BuildResult};
use crate::grid::{GridScratch, SpatialGrid};
use crate::snapshot::{CaptureBuffer, Generation, RegionId, Timestamp};

/// Externally visible state of a region's double buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GridState {
    /// Nothing published yet.
    Empty,
    /// At least one generation published; builds may be running.
    Ready,
    /// Region is being torn down; no further generations will be accepted.
    Retired,
}

/// Two grid slots plus the publish protocol for one region.
pub struct DoubleBufferedGrid {
    region: RegionId,
    slots: [ArcSwapOption<SpatialGrid>; 2],
    /// Latest published generation. Zero while empty.
    published: AtomicU64,
    /// Single-writer build flag.
    building: AtomicBool,
    retired: AtomicBool,
    released: AtomicBool,
    /// Builds that found the inactive slot still referenced by a reader.
    retained: AtomicU64,
    quiescence: Mutex<()>,
    idle: Condvar,
}

// Compile-time assertion: the double buffer is shared across reader threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<DoubleBufferedGrid>();
    assert::<GridView>();
    assert::<BuildGuard>();
};

impl DoubleBufferedGrid {
    /// Creates an empty double buffer for `region`.
    #[must_use]
    pub fn new(region: RegionId) -> Arc<Self> {
        Arc::new(Self {
            region,
            slots: [ArcSwapOption::empty(), ArcSwapOption::empty()],
            published: AtomicU64::new(Generation::EMPTY.get()),
            building: AtomicBool::new(false),
            retired: AtomicBool::new(false),
            released: AtomicBool::new(false),
            retained: AtomicU64::new(0),
            quiescence: Mutex::new(()),
            idle: Condvar::new(),
        })
    }

    /// Region this buffer belongs to.
    #[inline]
    #[must_use]
    pub const fn region(&self) -> RegionId {
        self.region
    }

    /// Latest published generation, [`Generation::EMPTY`] if none.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> Generation {
        Generation::new(self.published.load(Ordering::Acquire))
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> GridState {
        if self.retired.load(Ordering::Acquire) {
            GridState::Retired
        } else if self.generation().is_empty() {
            GridState::Empty
        } else {
            GridState::Ready
        }
    }

    /// Returns true while a build holds the build flag.
    #[inline]
    #[must_use]
    pub fn is_building(&self) -> bool {
        self.building.load(Ordering::Acquire)
    }

    /// Returns true once the region has been retired.
    #[inline]
    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Builds that could not recycle the inactive slot because a reader
    /// still held it.
    #[inline]
    #[must_use]
    pub fn retained_buffer_count(&self) -> u64 {
        self.retained.load(Ordering::Relaxed)
    }

    /// The currently published grid. O(1), lock-free, never blocks.
    ///
    /// `None` while the region is empty or after its buffers were released.
    #[must_use]
    pub fn active(&self) -> Option<GridView> {
        loop {
            let generation = self.published.load(Ordering::Acquire);
            if generation == 0 || self.released.load(Ordering::Acquire) {
                return None;
            }
            let slot = &self.slots[slot_index(generation)];
            if let Some(grid) = slot.load_full() {
                if grid.generation().get() == generation {
                    return Some(GridView(grid));
                }
            }
            // Two commits landed between our loads and the slot already
            // holds a newer, not yet published, generation. Reload.
            std::hint::spin_loop();
        }
    }

    /// Claims the build flag.
    ///
    /// # Errors
    ///
    /// [`BuildError::Overlap`] if another build is running (skip this cycle,
    /// never wait), [`BuildError::Retired`] once the region is torn down.
    pub fn begin_build(self: &Arc<Self>) -> BuildResult<BuildGuard> {
        if self.is_retired() {
            return Err(BuildError::Retired(self.region));
        }
        if self
            .building
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(BuildError::Overlap(self.region));
        }
        // Retired between the first check and the claim.
        if self.is_retired() {
            self.end_build();
            return Err(BuildError::Retired(self.region));
        }

        Ok(BuildGuard {
            grid: Arc::clone(self),
            target: self.generation().next(),
        })
    }

    /// Marks the region as retired. In-flight captures observe this through
    /// their cancel flag; commits are refused from now on.
    pub fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }

    /// Waits until no build holds the flag, at most `timeout`.
    ///
    /// Returns true once quiescent, false on timeout.
    #[must_use]
    pub fn wait_for_quiescence(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut guard = self.quiescence.lock();
        while self.is_building() {
            match deadline {
                Some(deadline) => {
                    if self.idle.wait_until(&mut guard, deadline).timed_out() {
                        return !self.is_building();
                    }
                }
                None => self.idle.wait(&mut guard),
            }
        }
        true
    }

    /// Tears the region down without waiting for a running build.
    ///
    /// The build keeps its own reference and fails at its next cancellation
    /// check or at commit.
    pub fn force_release(&self) {
        self.retire();
        self.release_buffers();
        self.idle.notify_all();
    }

    /// Drops both slots. Views already handed out stay valid.
    pub fn release_buffers(&self) {
        self.released.store(true, Ordering::Release);
        for slot in &self.slots {
            slot.store(None);
        }
    }

    fn end_build(&self) {
        self.building.store(false, Ordering::Release);
        let _guard = self.quiescence.lock();
        self.idle.notify_all();
    }
}

impl std::fmt::Debug for DoubleBufferedGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DoubleBufferedGrid")
            .field("region", &self.region)
            .field("generation", &self.generation())
            .field("state", &self.state())
            .field("building", &self.is_building())
            .finish_non_exhaustive()
    }
}

/// Exclusive right to build the next generation of one region.
///
/// Dropping the guard without committing abandons the build: the flag is
/// released and the published generation stays untouched.
pub struct BuildGuard {
    grid: Arc<DoubleBufferedGrid>,
    target: Generation,
}

impl BuildGuard {
    /// Region being built.
    #[inline]
    #[must_use]
    pub fn region(&self) -> RegionId {
        self.grid.region
    }

    /// Generation this build will publish.
    #[inline]
    #[must_use]
    pub const fn target_generation(&self) -> Generation {
        self.target
    }

    /// A capture buffer stamped with this build's region and generation.
    ///
    /// The capture aborts if the region is retired while it runs.
    #[must_use]
    pub fn capture_buffer(&self, captured_at: Timestamp) -> CaptureBuffer<'_> {
        CaptureBuffer::new(self.grid.region, self.target, captured_at)
            .with_cancel_flag(&self.grid.retired)
    }

    /// Reclaims the inactive slot's allocations.
    ///
    /// If a reader still holds the old grid it is left to them and fresh
    /// buffers are returned instead.
    pub fn take_scratch(&mut self) -> GridScratch {
        let slot = &self.grid.slots[slot_index(self.target.get())];
        match slot.swap(None) {
            None => GridScratch::default(),
            Some(old) => match Arc::try_unwrap(old) {
                Ok(grid) => grid.into_scratch(),
                Err(_shared) => {
                    self.grid.retained.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(
                        region = self.grid.region.raw(),
                        "inactive grid still referenced, building into fresh buffers"
                    );
                    GridScratch::default()
                }
            },
        }
    }

    /// Publishes `grid` as the active generation.
    ///
    /// # Errors
    ///
    /// Refuses grids built for another region or generation, and any commit
    /// after the region was retired. The published generation is unchanged
    /// on error.
    pub fn commit(self, grid: SpatialGrid) -> BuildResult<Generation> {
        let owner = &self.grid;
        if grid.region() != owner.region {
            return Err(BuildError::RegionMismatch {
                expected: owner.region,
                found: grid.region(),
            });
        }
        if grid.generation() != self.target {
            return Err(BuildError::GenerationMismatch {
                expected: self.target,
                found: grid.generation(),
            });
        }
        if owner.is_retired() {
            return Err(BuildError::Retired(owner.region));
        }

        let index = slot_index(self.target.get());
        owner.slots[index].store(Some(Arc::new(grid)));
        owner.published.store(self.target.get(), Ordering::Release);
        if owner.released.load(Ordering::Acquire) {
            owner.slots[index].store(None);
        }
        Ok(self.target)
    }
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        self.grid.end_build();
    }
}

/// Shared handle to one published grid.
///
/// Every query through a view runs against the same generation.
#[derive(Clone, Debug)]
pub struct GridView(Arc<SpatialGrid>);

impl GridView {
    /// Generation of the viewed grid.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.0.generation()
    }
}

impl std::ops::Deref for GridView {
    type Target = SpatialGrid;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[inline]
fn slot_index(generation: u64) -> usize {
    usize::from(generation % 2 == 1)
}
