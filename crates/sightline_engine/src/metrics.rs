//! # Metrics
//!
//! Per-region counters updated with relaxed atomics by builders and readers,
//! and plain snapshot structs for operators.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use sightline_core::{Generation, GridState, RegionId};

/// Live counters of one region.
#[derive(Debug, Default)]
pub(crate) struct RegionCounters {
    last_build_us: AtomicU64,
    entities_captured: AtomicU64,
    rejected_entities: AtomicU64,
    skipped_cycles: AtomicU64,
    failed_builds: AtomicU64,
    overlap_skips: AtomicU64,
    queue_full_skips: AtomicU64,
    published_builds: AtomicU64,
    consecutive_skips: AtomicU64,
    query_count: AtomicU64,
    avg_query_ns: AtomicU64,
}

impl RegionCounters {
    pub(crate) fn record_published(&self, duration: Duration, entities: u64, rejected: u64) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.last_build_us.store(micros, Ordering::Relaxed);
        self.entities_captured.store(entities, Ordering::Relaxed);
        self.rejected_entities.fetch_add(rejected, Ordering::Relaxed);
        self.published_builds.fetch_add(1, Ordering::Relaxed);
        self.consecutive_skips.store(0, Ordering::Relaxed);
    }

    /// Returns the consecutive skip count after this one.
    pub(crate) fn record_overlap(&self) -> u64 {
        self.overlap_skips.fetch_add(1, Ordering::Relaxed);
        self.record_skip()
    }

    /// Returns the consecutive skip count after this one.
    pub(crate) fn record_queue_full(&self) -> u64 {
        self.queue_full_skips.fetch_add(1, Ordering::Relaxed);
        self.record_skip()
    }

    /// Returns the consecutive skip count after this one.
    pub(crate) fn record_failure(&self) -> u64 {
        self.failed_builds.fetch_add(1, Ordering::Relaxed);
        self.record_skip()
    }

    /// Skip with no more specific cause. Returns the consecutive skip count.
    pub(crate) fn record_skip(&self) -> u64 {
        self.skipped_cycles.fetch_add(1, Ordering::Relaxed);
        self.consecutive_skips.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Rolling average, same weighting as the tick loop statistics.
    pub(crate) fn record_query(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        let first = self.query_count.fetch_add(1, Ordering::Relaxed) == 0;
        let _ = self
            .avg_query_ns
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |avg| {
                Some(if first { nanos } else { avg.saturating_mul(15).saturating_add(nanos) / 16 })
            });
    }

    pub(crate) fn snapshot(
        &self,
        region: RegionId,
        state: GridState,
        generation: Generation,
        retained_buffers: u64,
        current_interval_ms: u64,
    ) -> RegionMetrics {
        RegionMetrics {
            region,
            state,
            generation,
            last_build_duration: Duration::from_micros(self.last_build_us.load(Ordering::Relaxed)),
            entities_captured: self.entities_captured.load(Ordering::Relaxed),
            rejected_entities: self.rejected_entities.load(Ordering::Relaxed),
            skipped_cycle_count: self.skipped_cycles.load(Ordering::Relaxed),
            failed_builds: self.failed_builds.load(Ordering::Relaxed),
            overlap_skips: self.overlap_skips.load(Ordering::Relaxed),
            queue_full_skips: self.queue_full_skips.load(Ordering::Relaxed),
            published_builds: self.published_builds.load(Ordering::Relaxed),
            retained_buffers,
            consecutive_skips: self.consecutive_skips.load(Ordering::Relaxed),
            query_count: self.query_count.load(Ordering::Relaxed),
            average_query_latency: Duration::from_nanos(self.avg_query_ns.load(Ordering::Relaxed)),
            current_interval_ms,
        }
    }
}

/// Point-in-time view of one region.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RegionMetrics {
    /// Region described.
    pub region: RegionId,
    /// Lifecycle state.
    pub state: GridState,
    /// Latest published generation.
    pub generation: Generation,
    /// Capture + build + commit time of the latest published generation.
    pub last_build_duration: Duration,
    /// Entities in the latest published generation.
    pub entities_captured: u64,
    /// Records rejected over the region's lifetime.
    pub rejected_entities: u64,
    /// Cycles that did not publish (overlap, full queue or failure).
    pub skipped_cycle_count: u64,
    /// Cycles whose capture failed.
    pub failed_builds: u64,
    /// Cycles skipped because a build was still running.
    pub overlap_skips: u64,
    /// Cycles skipped because the build queue was full.
    pub queue_full_skips: u64,
    /// Generations published.
    pub published_builds: u64,
    /// Builds that could not recycle a grid still held by a reader.
    pub retained_buffers: u64,
    /// Skipped cycles since the last publish.
    pub consecutive_skips: u64,
    /// Queries answered through the region handle.
    pub query_count: u64,
    /// Rolling average query latency.
    pub average_query_latency: Duration,
    /// Refresh interval currently in effect, including backoff.
    pub current_interval_ms: u64,
}

impl RegionMetrics {
    /// Last build duration in fractional milliseconds.
    #[must_use]
    pub fn last_build_duration_ms(&self) -> f64 {
        self.last_build_duration.as_secs_f64() * 1_000.0
    }
}

/// Point-in-time view of the whole manager.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EngineMetrics {
    /// Registered regions.
    pub regions: usize,
    /// Build jobs handed to the pool or run inline.
    pub dispatched_jobs: u64,
    /// Build jobs dropped because the queue was full.
    pub dropped_jobs: u64,
    /// Build jobs waiting for a worker.
    pub queued_jobs: usize,
    /// Generations published across all live regions.
    pub published_builds: u64,
    /// Per-region detail, ordered by region id.
    pub per_region: Vec<RegionMetrics>,
}
