//! # Status Flags
//!
//! Per-entity status bits captured alongside position.

use std::ops::{BitOr, BitOrAssign};

/// Bitmask of entity status flags (up to 16).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct StatusFlags(u16);

impl StatusFlags {
    /// Entity is alive.
    pub const ALIVE: Self = Self(1 << 0);
    /// Entity is engaged in combat.
    pub const IN_COMBAT: Self = Self(1 << 1);
    /// Entity is stunned, rooted, feared or similar.
    pub const CROWD_CONTROLLED: Self = Self(1 << 2);
    /// Entity is hidden from ordinary detection.
    pub const STEALTHED: Self = Self(1 << 3);
    /// Entity can be interacted with (loot, use, talk).
    pub const INTERACTABLE: Self = Self(1 << 4);
    /// Entity is returning to its leash point and ignores threats.
    pub const EVADING: Self = Self(1 << 5);

    /// No flags set.
    #[inline]
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Creates flags from raw bits.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Returns true if no flag is set.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true if every flag in `other` is set.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if any flag in `other` is set.
    #[inline]
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns a copy with `other` added.
    #[inline]
    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns a copy with `other` removed.
    #[inline]
    #[must_use]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl BitOr for StatusFlags {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        self.with(rhs)
    }
}

impl BitOrAssign for StatusFlags {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.with(rhs);
    }
}
