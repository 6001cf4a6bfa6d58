//! # Entity Filters
//!
//! A closed set of primitive conditions. Every check is a couple of bit
//! tests, so filter cost never depends on anything but the candidate count.

use crate::snapshot::{
    Bounds, Disposition, EntityId, EntityKind, EntityRecord, EntitySnapshot, Position, StatusFlags,
};

/// Set of [`EntityKind`]s.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KindSet(u8);

impl KindSet {
    /// Every kind.
    pub const ALL: Self = Self(0b1_1111);

    /// No kind.
    pub const NONE: Self = Self(0);

    /// Set holding exactly `kinds`.
    #[must_use]
    pub fn of(kinds: &[EntityKind]) -> Self {
        kinds.iter().fold(Self::NONE, |set, kind| set.with(*kind))
    }

    /// Returns a copy with `kind` added.
    #[inline]
    #[must_use]
    pub const fn with(self, kind: EntityKind) -> Self {
        Self(self.0 | kind.bit())
    }

    /// Returns true if `kind` is in the set.
    #[inline]
    #[must_use]
    pub const fn contains(self, kind: EntityKind) -> bool {
        self.0 & kind.bit() != 0
    }
}

/// Set of [`Disposition`]s.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DispositionSet(u8);

impl DispositionSet {
    /// Every disposition.
    pub const ALL: Self = Self(0b111);

    /// Set holding exactly `dispositions`.
    #[must_use]
    pub fn of(dispositions: &[Disposition]) -> Self {
        Self(dispositions.iter().fold(0, |bits, d| bits | d.bit()))
    }

    /// Returns true if `disposition` is in the set.
    #[inline]
    #[must_use]
    pub const fn contains(self, disposition: Disposition) -> bool {
        self.0 & disposition.bit() != 0
    }
}

/// Conjunction of primitive entity conditions.
///
/// ```rust,ignore
/// let targets = EntityFilter::hostile()
///     .kinds(KindSet::of(&[EntityKind::Creature, EntityKind::Player]))
///     .exclude_flags(StatusFlags::EVADING);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EntityFilter {
    alive_only: bool,
    kinds: KindSet,
    dispositions: DispositionSet,
    required: StatusFlags,
    excluded: StatusFlags,
    within: Option<Bounds>,
    except: Option<EntityId>,
}

impl Default for EntityFilter {
    fn default() -> Self {
        Self::any()
    }
}

impl EntityFilter {
    /// Matches everything.
    #[must_use]
    pub const fn any() -> Self {
        Self {
            alive_only: false,
            kinds: KindSet::ALL,
            dispositions: DispositionSet::ALL,
            required: StatusFlags::empty(),
            excluded: StatusFlags::empty(),
            within: None,
            except: None,
        }
    }

    /// Matches living entities.
    #[must_use]
    pub const fn alive() -> Self {
        let mut filter = Self::any();
        filter.alive_only = true;
        filter
    }

    /// Matches living hostile entities.
    #[must_use]
    pub fn hostile() -> Self {
        Self::alive().dispositions(DispositionSet::of(&[Disposition::Hostile]))
    }

    /// Restricts to the given kinds.
    #[must_use]
    pub const fn kinds(mut self, kinds: KindSet) -> Self {
        self.kinds = kinds;
        self
    }

    /// Restricts to the given dispositions.
    #[must_use]
    pub const fn dispositions(mut self, dispositions: DispositionSet) -> Self {
        self.dispositions = dispositions;
        self
    }

    /// Requires every flag in `flags`.
    #[must_use]
    pub const fn require(mut self, flags: StatusFlags) -> Self {
        self.required = self.required.with(flags);
        self
    }

    /// Rejects entities carrying any flag in `flags`.
    #[must_use]
    pub const fn exclude_flags(mut self, flags: StatusFlags) -> Self {
        self.excluded = self.excluded.with(flags);
        self
    }

    /// Restricts to a horizontal sub-region.
    #[must_use]
    pub const fn within(mut self, bounds: Bounds) -> Self {
        self.within = Some(bounds);
        self
    }

    /// Skips one identity, usually the querying entity itself.
    #[must_use]
    pub const fn excluding(mut self, id: EntityId) -> Self {
        self.except = Some(id);
        self
    }

    /// Tests a published snapshot.
    #[inline]
    #[must_use]
    pub fn matches(&self, snapshot: &EntitySnapshot) -> bool {
        self.matches_parts(
            snapshot.id(),
            snapshot.kind(),
            snapshot.disposition(),
            snapshot.flags(),
            snapshot.position(),
        )
    }

    /// Tests a live record from the authoritative side.
    #[inline]
    #[must_use]
    pub fn matches_record(&self, record: &EntityRecord) -> bool {
        self.matches_parts(
            record.id,
            record.kind,
            record.disposition,
            record.flags,
            record.position,
        )
    }

    fn matches_parts(
        &self,
        id: EntityId,
        kind: EntityKind,
        disposition: Disposition,
        flags: StatusFlags,
        position: Position,
    ) -> bool {
        if self.alive_only && !flags.contains(StatusFlags::ALIVE) {
            return false;
        }
        if !self.kinds.contains(kind) || !self.dispositions.contains(disposition) {
            return false;
        }
        if !flags.contains(self.required) || flags.intersects(self.excluded) {
            return false;
        }
        if self.except == Some(id) {
            return false;
        }
        self.within.map_or(true, |bounds| bounds.contains(position))
    }
}
