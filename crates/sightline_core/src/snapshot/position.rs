//! # Positions and Bounds
//!
//! World-space coordinates exactly as the simulation reported them.
//! Bucketing only looks at the horizontal plane (x, y); z is carried along
//! for exact-distance refinement.

use bytemuck::{Pod, Zeroable};

/// Position of an entity in world space.
///
/// Same layout as the ECS position component: 16 bytes, SIMD friendly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Position {
    /// X coordinate in world space.
    pub x: f32,
    /// Y coordinate in world space.
    pub y: f32,
    /// Z (vertical) coordinate in world space.
    pub z: f32,
    /// Padding for alignment.
    pub _padding: f32,
}

impl Position {
    /// Creates a new position.
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            _padding: 0.0,
        }
    }

    /// Creates a position on the ground plane (z = 0).
    #[inline]
    #[must_use]
    pub const fn planar(x: f32, y: f32) -> Self {
        Self::new(x, y, 0.0)
    }

    /// Returns true if every coordinate is finite.
    #[inline]
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Squared 3D distance to another position.
    #[inline]
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    /// 3D distance to another position.
    #[inline]
    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        self.distance_squared(other).sqrt()
    }

    /// Squared distance on the horizontal plane, ignoring z.
    #[inline]
    #[must_use]
    pub fn planar_distance_squared(self, other: Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// Axis-aligned rectangle on the horizontal plane.
///
/// Used for region extents (captures outside are rejected) and for
/// sub-region query filters. Edges are inclusive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    /// Smallest x inside the bounds.
    pub min_x: f32,
    /// Smallest y inside the bounds.
    pub min_y: f32,
    /// Largest x inside the bounds.
    pub max_x: f32,
    /// Largest y inside the bounds.
    pub max_y: f32,
}

impl Bounds {
    /// Creates bounds from two opposite corners in any order.
    #[must_use]
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            min_x: x0.min(x1),
            min_y: y0.min(y1),
            max_x: x0.max(x1),
            max_y: y0.max(y1),
        }
    }

    /// Creates bounds from a `[min_x, min_y, max_x, max_y]` array.
    #[must_use]
    pub fn from_array(corners: [f32; 4]) -> Self {
        Self::new(corners[0], corners[1], corners[2], corners[3])
    }

    /// Returns true if all four edges are finite numbers.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.min_x.is_finite()
            && self.min_y.is_finite()
            && self.max_x.is_finite()
            && self.max_y.is_finite()
    }

    /// Returns true if the position lies inside (edges included).
    #[inline]
    #[must_use]
    pub fn contains(&self, position: Position) -> bool {
        position.x >= self.min_x
            && position.x <= self.max_x
            && position.y >= self.min_y
            && position.y <= self.max_y
    }

    /// Width along x.
    #[must_use]
    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    /// Height along y.
    #[must_use]
    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }
}
