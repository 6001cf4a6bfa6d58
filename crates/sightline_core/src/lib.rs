//! # Sightline Core
//!
//! Non-blocking proximity queries over a continuously mutating population.
//!
//! An authoritative simulation periodically copies a region's entities into a
//! [`CaptureBuffer`]; the capture is bucketed into an immutable
//! [`SpatialGrid`]; the grid is published through a [`DoubleBufferedGrid`].
//! Any number of readers query the published generation concurrently, without
//! locks and without ever observing a half-built grid.
//!
//! ## Architecture Rules
//!
//! 1. **Readers never block** - a query is one atomic load plus a walk over
//!    immutable memory
//! 2. **Snapshots are values** - never references into live simulation state
//! 3. **Staleness is bounded and reported** - every answer carries its generation
//!
//! ## Example
//!
//! ```rust,ignore
//! use sightline_core::{DoubleBufferedGrid, EntityFilter, Position, RegionId};
//!
//! let grid = DoubleBufferedGrid::new(RegionId::new(1));
//! // builder: begin_build -> capture_buffer -> SpatialGridBuilder::build -> commit
//! let hits = grid.find_in_radius(Position::planar(0.0, 0.0), 15.0, &EntityFilter::alive());
//! println!("{} entities at {}", hits.value().len(), hits.generation());
//! ```

#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod error;
pub mod grid;
pub mod query;
pub mod snapshot;
pub mod sync;

pub use error::{BuildError, BuildResult, CaptureError, CaptureResult, GridError, RejectReason};
pub use grid::{CellCoord, CellSize, GridScratch, GridStats, SpatialGrid, SpatialGridBuilder};
pub use query::{DispositionSet, EntityFilter, KindSet, QueryResult, QueryStatus};
pub use snapshot::{
    Bounds, Capture, CaptureBuffer, CaptureStats, Disposition, EntityId, EntityKind,
    EntityRecord, EntitySnapshot, Generation, Position, RegionId, StatusFlags, Timestamp,
};
pub use sync::{BuildGuard, DoubleBufferedGrid, GridState, GridView};
