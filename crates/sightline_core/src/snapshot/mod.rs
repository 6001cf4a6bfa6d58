//! # Snapshot Model
//!
//! Immutable value copies of entity state, and the buffer that captures them.

mod capture;
mod entity;
mod flags;
mod position;

pub use capture::{Capture, CaptureBuffer, CaptureStats};
pub use entity::{
    Disposition, EntityId, EntityKind, EntityRecord, EntitySnapshot, Generation, RegionId,
    Timestamp,
};
pub use flags::StatusFlags;
pub use position::{Bounds, Position};
