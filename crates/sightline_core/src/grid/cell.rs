//! # Cell Geometry
//!
//! Cell coordinate = `floor(position / cell_size)` on each horizontal axis.
//! The vertical axis never takes part in bucketing.

use crate::error::GridError;
use crate::snapshot::Position;

/// Validated cell edge length.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellSize(f32);

impl CellSize {
    /// Validates a cell edge length.
    ///
    /// # Errors
    ///
    /// [`GridError::InvalidCellSize`] if `size` is not finite or not > 0.
    pub fn new(size: f32) -> Result<Self, GridError> {
        if size.is_finite() && size > 0.0 {
            Ok(Self(size))
        } else {
            Err(GridError::InvalidCellSize(size))
        }
    }

    /// Edge length in world units.
    #[inline]
    #[must_use]
    pub const fn get(self) -> f32 {
        self.0
    }

    /// Cell holding `position`.
    #[inline]
    #[must_use]
    pub fn coord_of(self, position: Position) -> CellCoord {
        CellCoord::new(self.axis(position.x), self.axis(position.y))
    }

    /// Every cell that can hold a point within `radius` of `origin`.
    #[must_use]
    pub fn range_around(self, origin: Position, radius: f32) -> CellRange {
        CellRange {
            min: CellCoord::new(self.axis(origin.x - radius), self.axis(origin.y - radius)),
            max: CellCoord::new(self.axis(origin.x + radius), self.axis(origin.y + radius)),
        }
    }

    /// Rings needed around the origin cell to cover `radius`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn rings_for(self, radius: f32) -> u64 {
        // Saturating float-to-int cast: an infinite radius yields u64::MAX.
        (radius / self.0).ceil() as u64
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn axis(self, v: f32) -> i32 {
        (v / self.0).floor() as i32
    }
}

/// Integer key of one cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellCoord {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl CellCoord {
    /// Creates a cell coordinate.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Cells at Chebyshev distance exactly `k` from this one.
    ///
    /// `k = 0` yields only this cell. Coordinates that would leave the
    /// `i32` range are skipped.
    pub fn ring(self, k: u32) -> impl Iterator<Item = CellCoord> {
        let k = i64::from(k);
        let cx = i64::from(self.x);
        let cy = i64::from(self.y);
        (-k..=k)
            .flat_map(move |dy| {
                // Full rows on the top and bottom edge, only the two ends in between.
                let step = if dy.abs() == k || k == 0 { 1 } else { 2 * k };
                let step = usize::try_from(step).unwrap_or(usize::MAX);
                (-k..=k).step_by(step).map(move |dx| (cx + dx, cy + dy))
            })
            .filter_map(|(x, y)| {
                Some(CellCoord::new(i32::try_from(x).ok()?, i32::try_from(y).ok()?))
            })
    }
}

/// Inclusive rectangle of cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellRange {
    /// Lowest column and row.
    pub min: CellCoord,
    /// Highest column and row.
    pub max: CellCoord,
}

impl CellRange {
    /// Number of cells covered.
    #[must_use]
    pub fn cell_count(&self) -> u64 {
        let w = i64::from(self.max.x) - i64::from(self.min.x) + 1;
        let h = i64::from(self.max.y) - i64::from(self.min.y) + 1;
        u64::try_from(w.max(0))
            .unwrap_or(0)
            .saturating_mul(u64::try_from(h.max(0)).unwrap_or(0))
    }

    /// Returns true if `coord` lies in the rectangle.
    #[inline]
    #[must_use]
    pub fn contains(&self, coord: CellCoord) -> bool {
        coord.x >= self.min.x
            && coord.x <= self.max.x
            && coord.y >= self.min.y
            && coord.y <= self.max.y
    }

    /// Every cell in the rectangle, row by row.
    pub fn iter(&self) -> impl Iterator<Item = CellCoord> {
        let (min, max) = (self.min, self.max);
        (min.y..=max.y).flat_map(move |y| (min.x..=max.x).map(move |x| CellCoord::new(x, y)))
    }
}
