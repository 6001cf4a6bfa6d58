//! # Capture Buffer
//!
//! The sink an authoritative source writes its entity enumeration into.
//!
//! Records are validated and frozen into [`EntitySnapshot`]s as they arrive,
//! so the source only pays for a copy per entity and never waits on the grid
//! build. Bad records are rejected and counted; they never fail the capture.
//! A capture does fail when its deadline passes or the region is retired
//! while the source is still iterating.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use super::entity::{EntityRecord, EntitySnapshot, Generation, RegionId, Timestamp};
use super::position::Bounds;
use crate::error::{CaptureError, CaptureResult, RejectReason};

/// Deadline and cancellation are polled once per this many pushes.
const POLL_INTERVAL: u32 = 256;

/// Per-capture acceptance counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Records accepted into the capture.
    pub accepted: u32,
    /// Records with a NaN or infinite coordinate.
    pub non_finite: u32,
    /// Records outside the region bounds.
    pub out_of_bounds: u32,
    /// Records with a negative or non-finite radius.
    pub invalid_radius: u32,
}

impl CaptureStats {
    /// Total rejected records.
    #[inline]
    #[must_use]
    pub const fn rejected(&self) -> u32 {
        self.non_finite + self.out_of_bounds + self.invalid_radius
    }

    fn count(&mut self, reason: RejectReason) {
        match reason {
            RejectReason::NonFinite => self.non_finite += 1,
            RejectReason::OutOfBounds => self.out_of_bounds += 1,
            RejectReason::InvalidRadius => self.invalid_radius += 1,
            // Duplicates are detected by the grid builder.
            RejectReason::Duplicate => {}
        }
    }
}

/// Collects one region's population for one generation.
pub struct CaptureBuffer<'a> {
    region: RegionId,
    generation: Generation,
    captured_at: Timestamp,
    snapshots: Vec<EntitySnapshot>,
    bounds: Option<Bounds>,
    budget: Option<Duration>,
    cancel: Option<&'a AtomicBool>,
    started: Instant,
    since_poll: u32,
    stats: CaptureStats,
    aborted: Option<CaptureError>,
}

impl<'a> CaptureBuffer<'a> {
    /// Creates an empty capture for `region`, to be published as `generation`.
    #[must_use]
    pub fn new(region: RegionId, generation: Generation, captured_at: Timestamp) -> Self {
        Self {
            region,
            generation,
            captured_at,
            snapshots: Vec::new(),
            bounds: None,
            budget: None,
            cancel: None,
            started: Instant::now(),
            since_poll: 0,
            stats: CaptureStats::default(),
            aborted: None,
        }
    }

    /// Reuses an existing allocation for the snapshots.
    #[must_use]
    pub fn with_storage(mut self, mut storage: Vec<EntitySnapshot>) -> Self {
        storage.clear();
        self.snapshots = storage;
        self
    }

    /// Rejects records whose position lies outside `bounds`.
    #[must_use]
    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Fails the capture with [`CaptureError::Timeout`] once `budget` has elapsed.
    #[must_use]
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Fails the capture with [`CaptureError::RegionUnloading`] once `flag` is set.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Region being captured.
    #[inline]
    #[must_use]
    pub const fn region(&self) -> RegionId {
        self.region
    }

    /// Generation the capture will be published as.
    #[inline]
    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.generation
    }

    /// Accepted records so far.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Returns true if nothing has been accepted.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Counters so far.
    #[inline]
    #[must_use]
    pub const fn stats(&self) -> CaptureStats {
        self.stats
    }

    /// Pre-allocates room for `additional` records.
    pub fn reserve(&mut self, additional: usize) {
        self.snapshots.reserve(additional);
    }

    /// Adds one record.
    ///
    /// Invalid records are logged and dropped (`Ok`). `Err` means the whole
    /// capture is void and the source should stop iterating.
    ///
    /// # Errors
    ///
    /// [`CaptureError::Timeout`] or [`CaptureError::RegionUnloading`].
    pub fn push(&mut self, record: EntityRecord) -> CaptureResult<()> {
        if let Some(err) = &self.aborted {
            return Err(err.clone());
        }

        self.since_poll += 1;
        if self.since_poll >= POLL_INTERVAL {
            self.since_poll = 0;
            self.poll()?;
        }

        if let Some(reason) = self.check(&record) {
            tracing::warn!(
                region = self.region.raw(),
                entity = record.id.raw(),
                ?reason,
                "rejected captured record"
            );
            self.stats.count(reason);
            return Ok(());
        }

        self.snapshots
            .push(EntitySnapshot::from_record(&record, self.region, self.generation));
        self.stats.accepted += 1;
        Ok(())
    }

    /// Adds every record from an iterator, stopping at the first abort.
    ///
    /// # Errors
    ///
    /// Same as [`CaptureBuffer::push`].
    pub fn extend<I>(&mut self, records: I) -> CaptureResult<()>
    where
        I: IntoIterator<Item = EntityRecord>,
    {
        for record in records {
            self.push(record)?;
        }
        Ok(())
    }

    /// Seals the capture.
    ///
    /// # Errors
    ///
    /// Returns the abort reason if the deadline passed or the region was
    /// retired at any point during the capture.
    pub fn finish(mut self) -> CaptureResult<Capture> {
        if let Some(err) = self.aborted.take() {
            return Err(err);
        }
        self.poll()?;

        Ok(Capture {
            region: self.region,
            generation: self.generation,
            captured_at: self.captured_at,
            snapshots: self.snapshots,
            stats: self.stats,
            elapsed: self.started.elapsed(),
        })
    }

    fn check(&self, record: &EntityRecord) -> Option<RejectReason> {
        if !record.position.is_finite() {
            return Some(RejectReason::NonFinite);
        }
        if !record.radius.is_finite() || record.radius < 0.0 {
            return Some(RejectReason::InvalidRadius);
        }
        match self.bounds {
            Some(bounds) if !bounds.contains(record.position) => Some(RejectReason::OutOfBounds),
            _ => None,
        }
    }

    fn poll(&mut self) -> CaptureResult<()> {
        let err = if self.cancel.is_some_and(|flag| flag.load(Ordering::Acquire)) {
            CaptureError::RegionUnloading(self.region)
        } else if let Some(budget) = self.budget.filter(|b| self.started.elapsed() > *b) {
            CaptureError::Timeout {
                region: self.region,
                budget_ms: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
            }
        } else {
            return Ok(());
        };

        self.aborted = Some(err.clone());
        Err(err)
    }
}

/// A sealed capture, ready to be bucketed by the grid builder.
#[derive(Debug)]
pub struct Capture {
    region: RegionId,
    generation: Generation,
    captured_at: Timestamp,
    snapshots: Vec<EntitySnapshot>,
    stats: CaptureStats,
    elapsed: Duration,
}

impl Capture {
    /// Region captured.
    #[inline]
    #[must_use]
    pub const fn region(&self) -> RegionId {
        self.region
    }

    /// Generation stamped on every snapshot.
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

    /// Accepted snapshots, in source order.
    #[inline]
    #[must_use]
    pub fn snapshots(&self) -> &[EntitySnapshot] {
        &self.snapshots
    }

    /// Number of accepted snapshots.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Returns true if no snapshot was accepted.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Acceptance counters.
    #[inline]
    #[must_use]
    pub const fn stats(&self) -> CaptureStats {
        self.stats
    }

    /// Wall time the source spent filling the buffer.
    #[inline]
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub(crate) fn into_snapshots(self) -> Vec<EntitySnapshot> {
        self.snapshots
    }
}
