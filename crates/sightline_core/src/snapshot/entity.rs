//! # Entity Snapshots
//!
//! An [`EntityRecord`] is what the authoritative simulation hands over during
//! a capture pass. An [`EntitySnapshot`] is the immutable copy stored in a
//! published grid: the record plus the region and generation it belongs to.
//! Snapshots are never mutated; an entity that changes simply shows up
//! differently in the next generation.

use std::fmt;

use super::flags::StatusFlags;
use super::position::Position;

/// Stable identity of an entity, assigned by the simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Wraps a raw simulation identifier.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// Identifier of a region: an independently refreshed area of the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct RegionId(u32);

impl RegionId {
    /// Wraps a raw region identifier.
    #[inline]
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region#{}", self.0)
    }
}

/// What sort of thing an entity is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntityKind {
    /// A player character.
    Player = 0,
    /// A mobile creature or NPC.
    Creature = 1,
    /// A static world object (chest, door, resource node).
    StaticObject = 2,
    /// An invisible area that reacts to presence.
    TriggerVolume = 3,
    /// Remains of a dead creature or player.
    Corpse = 4,
}

impl EntityKind {
    /// Every kind, in discriminant order.
    pub const ALL: [Self; 5] = [
        Self::Player,
        Self::Creature,
        Self::StaticObject,
        Self::TriggerVolume,
        Self::Corpse,
    ];

    /// Single-bit mask for this kind.
    #[inline]
    #[must_use]
    pub const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Stance of an entity towards the querying side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Disposition {
    /// Will attack or can be attacked.
    Hostile = 0,
    /// Allied.
    Friendly = 1,
    /// Neither.
    Neutral = 2,
}

impl Disposition {
    /// Single-bit mask for this disposition.
    #[inline]
    #[must_use]
    pub const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Milliseconds on the simulation's monotonic clock.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Clock origin.
    pub const ZERO: Self = Self(0);

    /// Creates a timestamp from milliseconds.
    #[inline]
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp in milliseconds.
    #[inline]
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Milliseconds elapsed since `earlier`, zero if `earlier` is in the future.
    #[inline]
    #[must_use]
    pub const fn saturating_elapsed_since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    /// Returns this timestamp shifted forward.
    #[inline]
    #[must_use]
    pub const fn add_millis(self, millis: u64) -> Self {
        Self(self.0.saturating_add(millis))
    }
}

/// Identifier of one published capture+build cycle of a region.
///
/// Strictly increasing per region. Zero is reserved for "nothing published yet".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Generation(u64);

impl Generation {
    /// No generation has been published.
    pub const EMPTY: Self = Self(0);

    /// Wraps a raw generation number.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw generation number.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns the generation that follows this one.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns true for [`Generation::EMPTY`].
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen{}", self.0)
    }
}

/// One entity as enumerated by the authoritative simulation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EntityRecord {
    /// Stable identity.
    pub id: EntityId,
    /// Kind of entity.
    pub kind: EntityKind,
    /// Position at observation time.
    pub position: Position,
    /// Bounding radius.
    pub radius: f32,
    /// Stance towards the querying side.
    pub disposition: Disposition,
    /// Status bits.
    pub flags: StatusFlags,
    /// When the simulation observed this state.
    pub observed_at: Timestamp,
}

impl EntityRecord {
    /// Default bounding radius for records that do not set one.
    pub const DEFAULT_RADIUS: f32 = 0.5;

    /// Creates a living, neutral record with the default radius.
    #[must_use]
    pub const fn new(
        id: EntityId,
        kind: EntityKind,
        position: Position,
        observed_at: Timestamp,
    ) -> Self {
        Self {
            id,
            kind,
            position,
            radius: Self::DEFAULT_RADIUS,
            disposition: Disposition::Neutral,
            flags: StatusFlags::ALIVE,
            observed_at,
        }
    }

    /// Sets the bounding radius.
    #[must_use]
    pub const fn with_radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }

    /// Sets the disposition.
    #[must_use]
    pub const fn with_disposition(mut self, disposition: Disposition) -> Self {
        self.disposition = disposition;
        self
    }

    /// Replaces the status flags.
    #[must_use]
    pub const fn with_flags(mut self, flags: StatusFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// Immutable copy of one entity as it was at capture time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EntitySnapshot {
    id: EntityId,
    kind: EntityKind,
    disposition: Disposition,
    flags: StatusFlags,
    region: RegionId,
    position: Position,
    radius: f32,
    captured_at: Timestamp,
    generation: Generation,
}

impl EntitySnapshot {
    /// Freezes a record into the given region and generation.
    #[must_use]
    pub fn from_record(record: &EntityRecord, region: RegionId, generation: Generation) -> Self {
        Self {
            id: record.id,
            kind: record.kind,
            disposition: record.disposition,
            flags: record.flags,
            region,
            position: record.position,
            radius: record.radius,
            captured_at: record.observed_at,
            generation,
        }
    }

    /// Stable identity.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Kind of entity.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Stance towards the querying side.
    #[inline]
    #[must_use]
    pub const fn disposition(&self) -> Disposition {
        self.disposition
    }

    /// Status bits.
    #[inline]
    #[must_use]
    pub const fn flags(&self) -> StatusFlags {
        self.flags
    }

    /// Region the entity was captured in.
    #[inline]
    #[must_use]
    pub const fn region(&self) -> RegionId {
        self.region
    }

    /// Position at capture time.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> Position {
        self.position
    }

    /// Bounding radius.
    #[inline]
    #[must_use]
    pub const fn radius(&self) -> f32 {
        self.radius
    }

    /// When the simulation observed this state.
    #[inline]
    #[must_use]
    pub const fn captured_at(&self) -> Timestamp {
        self.captured_at
    }

    /// Generation this snapshot belongs to.
    #[inline]
    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.generation
    }

    /// Shorthand for the [`StatusFlags::ALIVE`] bit.
    #[inline]
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        self.flags.contains(StatusFlags::ALIVE)
    }

    /// Shorthand for a hostile disposition.
    #[inline]
    #[must_use]
    pub fn is_hostile(&self) -> bool {
        self.disposition == Disposition::Hostile
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_carries_record_and_generation() {
        let record = EntityRecord::new(
            EntityId::new(7),
            EntityKind::Creature,
            Position::new(1.0, 2.0, 3.0),
            Timestamp::from_millis(40),
        )
        .with_disposition(Disposition::Hostile)
        .with_radius(2.0);

        let snap = EntitySnapshot::from_record(&record, RegionId::new(3), Generation::new(9));
        assert_eq!(snap.id(), EntityId::new(7));
        assert_eq!(snap.region(), RegionId::new(3));
        assert_eq!(snap.generation(), Generation::new(9));
        assert_eq!(snap.captured_at(), Timestamp::from_millis(40));
        assert!(snap.is_alive());
        assert!(snap.is_hostile());
        assert!((snap.radius() - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_generation_ordering() {
        assert!(Generation::EMPTY.is_empty());
        assert_eq!(Generation::EMPTY.next(), Generation::new(1));
        assert!(Generation::new(4) < Generation::new(5));
    }

    #[test]
    fn test_timestamp_elapsed_saturates() {
        let early = Timestamp::from_millis(100);
        let late = early.add_millis(250);
        assert_eq!(late.saturating_elapsed_since(early), 250);
        assert_eq!(early.saturating_elapsed_since(late), 0);
    }

    #[test]
    fn test_kind_bits_are_distinct() {
        let mut seen = 0u8;
        for kind in EntityKind::ALL {
            assert_eq!(seen & kind.bit(), 0);
            seen |= kind.bit();
        }
    }
}
