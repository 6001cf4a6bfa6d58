//! # Sightline Engine
//!
//! Keeps one [`DoubleBufferedGrid`](sightline_core::DoubleBufferedGrid) per
//! live region fresh, and hands consumers a [`RegionHandle`] to query it.
//!
//! ## Architecture Rules
//!
//! 1. **Regions are independent** - a failing capture in one region never
//!    touches another; it backs off and keeps its last good generation
//! 2. **The refresh loop never stalls** - overlapping builds and a full job
//!    queue skip the cycle instead of waiting
//! 3. **Teardown is bounded** - unregistering waits for a running build at
//!    most `unregister_timeout_ms`, then force-releases with a warning
//! 4. **Reading is not acting** - mutations go through [`ActionGate`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use sightline_engine::{EngineConfig, GridManager, RefreshDriver};
//!
//! let config = EngineConfig::load("sightline.toml")?;
//! let manager = Arc::new(GridManager::new(config, Arc::new(world))?);
//! let zone = manager.register_region(RegionId::new(7))?;
//! let _driver = RefreshDriver::spawn(Arc::clone(&manager), Duration::from_millis(25))?;
//!
//! let hostiles = zone.find_in_radius(bot.position(), 30.0, &EntityFilter::hostile());
//! ```

#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod clock;
pub mod config;
pub mod driver;
pub mod error;
pub mod manager;
pub mod metrics;
mod pool;
pub mod refresh;
pub mod region;
pub mod source;
pub mod validation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, RegionOptions, RegionOverride};
pub use driver::RefreshDriver;
pub use error::{ActionRejected, ConfigError, EngineError, EngineResult};
pub use manager::{GridManager, Teardown, TickReport};
pub use metrics::{EngineMetrics, RegionMetrics};
pub use refresh::{BuildOutcome, SkipReason};
pub use region::RegionHandle;
pub use source::EntitySource;
pub use validation::{ActionGate, Authority, MotionBound, Validation};
