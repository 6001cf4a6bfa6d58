//! # Consumer Validation Contract
//!
//! Query results can be one refresh interval old. Reading them is always
//! fine; acting on them is not. Before mutating anything on the strength of
//! a snapshot, a consumer must go back to the authoritative simulation.
//!
//! ```text
//!   snapshot ──► check()        cheap, snapshot only, may say "plausible"
//!                   │           for an entity that died a millisecond ago
//!                   ▼
//!            Authority::confirm  authoritative, may be expensive
//!                   │
//!                   ▼
//!            filter re-check     on the live record
//!                   │
//!                   ▼
//!              caller action
//! ```
//!
//! [`ActionGate`] strings the three steps together. The engine itself never
//! mutates simulation state.

use std::fmt::Display;

use sightline_core::{EntityFilter, EntityId, EntityRecord, EntitySnapshot, RegionId};

use crate::error::ActionRejected;
use crate::region::RegionHandle;

/// How far an entity can plausibly move in a given time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotionBound {
    /// Units per second.
    pub max_speed: f32,
    /// Flat slack in units.
    pub tolerance: f32,
}

impl MotionBound {
    /// Maximum plausible displacement after `elapsed_ms`.
    #[must_use]
    pub fn allowance(&self, elapsed_ms: u64) -> f32 {
        #[allow(clippy::cast_precision_loss)]
        let secs = elapsed_ms as f32 / 1_000.0;
        self.max_speed.mul_add(secs, self.tolerance)
    }
}

/// Verdict of the cheap snapshot pre-check.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Validation {
    /// Identity present and the claimed position is reachable.
    Plausible,
    /// No snapshot of this identity in the current generation.
    Unknown,
    /// The snapshot is older than the caller accepts.
    Stale {
        /// Snapshot age in milliseconds.
        age_ms: u64,
    },
    /// The claimed position is farther than the entity could have moved.
    Displaced {
        /// Distance between snapshot and claimed position.
        distance: f32,
        /// Distance the entity could have covered.
        allowance: f32,
    },
}

impl Validation {
    /// True for [`Validation::Plausible`].
    #[inline]
    #[must_use]
    pub const fn is_plausible(&self) -> bool {
        matches!(self, Self::Plausible)
    }
}

/// The authoritative, non-snapshot path to an entity's live state.
pub trait Authority {
    /// Error reported when confirmation itself cannot be performed.
    type Error: Display;

    /// Reads the live record of `id`, or `None` if it no longer exists.
    ///
    /// # Errors
    ///
    /// Whatever the simulation reports when it cannot answer.
    fn confirm(&self, region: RegionId, id: EntityId) -> Result<Option<EntityRecord>, Self::Error>;
}

/// Runs an action only after snapshot, authority and requirement agree.
pub struct ActionGate<'a, A: Authority> {
    handle: &'a RegionHandle,
    authority: &'a A,
    max_staleness_ms: u64,
}

impl<'a, A: Authority> ActionGate<'a, A> {
    /// Staleness accepted when none is set.
    pub const DEFAULT_MAX_STALENESS_MS: u64 = 1_000;

    /// Creates a gate for one region.
    #[must_use]
    pub const fn new(handle: &'a RegionHandle, authority: &'a A) -> Self {
        Self {
            handle,
            authority,
            max_staleness_ms: Self::DEFAULT_MAX_STALENESS_MS,
        }
    }

    /// Sets the snapshot age beyond which the pre-check fails.
    #[must_use]
    pub const fn with_max_staleness(mut self, max_staleness_ms: u64) -> Self {
        self.max_staleness_ms = max_staleness_ms;
        self
    }

    /// Runs `action` on the live record of `target`.
    ///
    /// # Errors
    ///
    /// [`ActionRejected`] naming the first step that refused.
    pub fn act_on<T, F>(
        &self,
        target: &EntitySnapshot,
        requirement: &EntityFilter,
        action: F,
    ) -> Result<T, ActionRejected<A::Error>>
    where
        F: FnOnce(&EntityRecord) -> T,
    {
        let verdict = self
            .handle
            .check(target.id(), target.position(), self.max_staleness_ms);
        if !verdict.is_plausible() {
            return Err(ActionRejected::Implausible(verdict));
        }

        let live = self
            .authority
            .confirm(self.handle.id(), target.id())
            .map_err(ActionRejected::Authority)?
            .ok_or(ActionRejected::Gone(target.id()))?;

        if !requirement.matches_record(&live) {
            tracing::debug!(
                region = self.handle.id().raw(),
                entity = target.id().raw(),
                "live entity no longer matches the action requirement"
            );
            return Err(ActionRejected::NoLongerMatches(target.id()));
        }

        Ok(action(&live))
    }
}
