//! # Refresh Cycle
//!
//! One capture + build + commit for one region, and the schedule that decides
//! when the next one is due.
//!
//! ## Outcomes
//!
//! - **Published**: a new generation is live.
//! - **Skipped**: nothing ran. A build was still in flight, the queue was
//!   full, or the region is being torn down. Retried on a later tick.
//! - **Failed**: the capture aborted. The previous generation stays live,
//!   and the region backs off before retrying.
//!
//! A run of skipped cycles reaching the alert threshold is logged at error
//! level; isolated skips are invisible to readers beyond ordinary staleness.

use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use sightline_core::{BuildError, CaptureError, Generation, SpatialGridBuilder, Timestamp};

use crate::config::{EngineConfig, RegionOptions};
use crate::region::RegionEntry;
use crate::source::EntitySource;

/// Largest backoff exponent; keeps the shift in range.
const MAX_BACKOFF_SHIFT: u32 = 16;

/// Why a cycle published nothing without failing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The previous build of this region is still running.
    Overlap,
    /// The build queue was full.
    QueueFull,
    /// The region is being torn down.
    Retired,
}

/// Result of one refresh cycle.
#[derive(Clone, Debug, PartialEq)]
pub enum BuildOutcome {
    /// A new generation was published.
    Published {
        /// The new generation.
        generation: Generation,
        /// Entities it holds.
        entities: usize,
        /// Capture + build + commit time.
        duration: Duration,
    },
    /// The cycle did not run.
    Skipped(SkipReason),
    /// The capture failed; the previous generation stays published.
    Failed(CaptureError),
}

impl BuildOutcome {
    /// Returns true for [`BuildOutcome::Published`].
    #[must_use]
    pub const fn is_published(&self) -> bool {
        matches!(self, Self::Published { .. })
    }
}

/// Timing knobs of one region, fixed at registration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct RefreshPolicy {
    pub(crate) base_interval_ms: u64,
    pub(crate) adaptive: bool,
    pub(crate) min_interval_ms: u64,
    pub(crate) max_interval_ms: u64,
    pub(crate) hot_entity_threshold: u32,
    pub(crate) max_entities: u32,
    pub(crate) build_timeout: Duration,
    pub(crate) alert_after: u32,
}

impl RefreshPolicy {
    pub(crate) fn new(config: &EngineConfig, options: &RegionOptions) -> Self {
        Self {
            base_interval_ms: options.refresh_interval_ms,
            adaptive: options.adaptive_refresh,
            min_interval_ms: config.min_interval_ms,
            max_interval_ms: config.max_interval_ms,
            hot_entity_threshold: config.hot_entity_threshold,
            max_entities: config.max_entities_per_region,
            build_timeout: config.build_timeout(),
            alert_after: config.alert_after_skipped_cycles,
        }
    }

    /// Interval after a successful build of `entities`.
    ///
    /// Adaptive regions slide linearly from `max_interval_ms` when empty to
    /// `min_interval_ms` at the hot threshold and beyond.
    pub(crate) fn interval_for(&self, entities: usize) -> u64 {
        if !self.adaptive {
            return self.base_interval_ms;
        }
        let hot = u64::from(self.hot_entity_threshold.max(1));
        let load = u64::try_from(entities).unwrap_or(u64::MAX).min(hot);
        let span = self.max_interval_ms.saturating_sub(self.min_interval_ms);
        self.max_interval_ms - span * load / hot
    }

    /// Delay before retrying after `failures` consecutive failures.
    pub(crate) fn backoff(&self, interval_ms: u64, failures: u32) -> u64 {
        let shift = failures.min(MAX_BACKOFF_SHIFT);
        interval_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_interval_ms.max(interval_ms))
    }
}

/// When a region is next due. Touched only by the ticking thread and the
/// region's builder, never by readers.
#[derive(Debug)]
pub(crate) struct RefreshSchedule {
    policy: RefreshPolicy,
    next_due: Timestamp,
    interval_ms: u64,
    failures: u32,
}

impl RefreshSchedule {
    /// A schedule that is due immediately.
    pub(crate) fn new(policy: RefreshPolicy, now: Timestamp) -> Self {
        Self {
            policy,
            next_due: now,
            interval_ms: policy.base_interval_ms,
            failures: 0,
        }
    }

    pub(crate) fn policy(&self) -> &RefreshPolicy {
        &self.policy
    }

    pub(crate) fn is_due(&self, now: Timestamp) -> bool {
        now >= self.next_due
    }

    pub(crate) fn current_interval_ms(&self) -> u64 {
        if self.failures == 0 {
            self.interval_ms
        } else {
            self.policy.backoff(self.interval_ms, self.failures)
        }
    }

    pub(crate) fn on_dispatch(&mut self, now: Timestamp) {
        self.next_due = now.add_millis(self.current_interval_ms());
    }

    pub(crate) fn on_success(&mut self, now: Timestamp, entities: usize) {
        self.failures = 0;
        self.interval_ms = self.policy.interval_for(entities);
        self.next_due = now.add_millis(self.interval_ms);
    }

    /// Returns the backoff delay now in effect.
    pub(crate) fn on_failure(&mut self, now: Timestamp) -> u64 {
        self.failures = self.failures.saturating_add(1);
        let delay = self.current_interval_ms();
        self.next_due = now.add_millis(delay);
        delay
    }
}

/// Runs one capture + build + commit for `entry` on the calling thread.
///
/// Never returns an error: every path ends in a [`BuildOutcome`], with the
/// region's counters and schedule updated. A panicking source unwinds out;
/// callers go through [`run_refresh_isolated`].
fn run_refresh(
    entry: &RegionEntry,
    source: &dyn EntitySource,
    now: Timestamp,
) -> BuildOutcome {
    let region = entry.grid.region();
    let started = Instant::now();

    let mut guard = match entry.grid.begin_build() {
        Ok(guard) => guard,
        Err(BuildError::Overlap(_)) => {
            let streak = entry.counters.record_overlap();
            tracing::debug!(region = region.raw(), streak, "build still in flight, skipping cycle");
            entry.alert_if_stuck(streak);
            return BuildOutcome::Skipped(SkipReason::Overlap);
        }
        Err(_) => return BuildOutcome::Skipped(SkipReason::Retired),
    };

    let policy = *entry.schedule.lock().policy();
    let mut scratch = guard.take_scratch();
    let captured = {
        let mut buffer = guard
            .capture_buffer(now)
            .with_storage(scratch.take_capture_storage())
            .with_budget(policy.build_timeout);
        if let Some(bounds) = entry.options.bounds {
            buffer = buffer.with_bounds(bounds);
        }
        match source.capture(region, &mut buffer) {
            Ok(()) => buffer.finish(),
            Err(err) => Err(err),
        }
    };
    let capture = match captured {
        Ok(capture) => capture,
        Err(err) => {
            drop(guard);
            return fail(entry, now, err);
        }
    };

    let entities = capture.len();
    if entities > policy.max_entities as usize {
        tracing::warn!(
            region = region.raw(),
            entities,
            soft_cap = policy.max_entities,
            "region exceeds its entity soft cap"
        );
    }

    let grid = SpatialGridBuilder::new(entry.cell_size)
        .with_scratch(scratch)
        .build(capture);
    let stats = grid.stats();
    let entities = grid.len();

    let generation = match guard.commit(grid) {
        Ok(generation) => generation,
        Err(BuildError::Retired(_)) => {
            return fail(entry, now, CaptureError::RegionUnloading(region));
        }
        Err(err) => {
            return fail(
                entry,
                now,
                CaptureError::SourceUnavailable {
                    region,
                    reason: err.to_string(),
                },
            );
        }
    };

    let duration = started.elapsed();
    entry.counters.record_published(
        duration,
        entities as u64,
        u64::from(stats.rejected) + u64::from(stats.duplicates),
    );
    entry.schedule.lock().on_success(now, entities);

    tracing::debug!(
        region = region.raw(),
        generation = generation.get(),
        entities,
        build_us = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX),
        "generation published"
    );

    BuildOutcome::Published {
        generation,
        entities,
        duration,
    }
}

/// [`run_refresh`] with a panicking source contained to its own region.
///
/// The build flag is released by the guard while unwinding; the region is
/// charged a failed cycle and backs off like any other capture failure.
pub(crate) fn run_refresh_isolated(
    entry: &RegionEntry,
    source: &dyn EntitySource,
    now: Timestamp,
) -> BuildOutcome {
    match panic::catch_unwind(AssertUnwindSafe(|| run_refresh(entry, source, now))) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "capture panicked".to_owned());
            fail(
                entry,
                now,
                CaptureError::SourceUnavailable {
                    region: entry.grid.region(),
                    reason: format!("panic: {reason}"),
                },
            )
        }
    }
}

fn fail(entry: &RegionEntry, now: Timestamp, err: CaptureError) -> BuildOutcome {
    let region = entry.grid.region();
    if matches!(err, CaptureError::RegionUnloading(_)) {
        tracing::debug!(region = region.raw(), "capture cancelled by teardown");
        return BuildOutcome::Failed(err);
    }

    let streak = entry.counters.record_failure();
    let backoff_ms = entry.schedule.lock().on_failure(now);
    tracing::warn!(
        region = region.raw(),
        %err,
        backoff_ms,
        "capture failed, keeping previous generation"
    );
    entry.alert_if_stuck(streak);
    BuildOutcome::Failed(err)
}
