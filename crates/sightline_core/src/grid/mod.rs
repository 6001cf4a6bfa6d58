//! # Spatial Partitioning
//!
//! Fixed-size horizontal cells over one captured population. A radius query
//! visits `O((r / cell_size + 1)^2)` cells and refines by exact distance, so
//! the cell size should sit near the typical query radius.

mod cell;
mod spatial;

pub use cell::{CellCoord, CellRange, CellSize};
pub use spatial::{GridScratch, GridStats, NearestOutcome, SpatialGrid, SpatialGridBuilder};
