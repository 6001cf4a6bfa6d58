//! # Sightline Sim
//!
//! A deterministic authoritative world for exercising the engine, and the
//! soak harness behind the `reader_soak` binary.
//!
//! [`SimWorld`] implements both sides of the engine boundary: it is the
//! [`EntitySource`](sightline_engine::EntitySource) captures read from and
//! the [`Authority`](sightline_engine::Authority) actions are confirmed
//! against.

#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod soak;
pub mod world;

pub use soak::{run_soak, SoakConfig, SoakReport};
pub use world::{SimWorld, WorldConfig};
