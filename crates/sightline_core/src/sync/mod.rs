//! # Synchronization Primitives
//!
//! The per-region publish/swap protocol between one builder and any number
//! of readers.

mod double_buffer;

pub use double_buffer::{BuildGuard, DoubleBufferedGrid, GridState, GridView};
