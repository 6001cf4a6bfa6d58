//! # Core Error Types
//!
//! Failures of the capture, build and publish steps. None of these ever reach
//! a query caller: the engine turns them into skipped cycles and metrics.

use thiserror::Error;

use crate::snapshot::{Generation, RegionId};

/// A capture pass could not produce a consistent population.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The authoritative source could not enumerate the region.
    #[error("entity source unavailable for {region}: {reason}")]
    SourceUnavailable {
        /// Region being captured.
        region: RegionId,
        /// Reason reported by the source.
        reason: String,
    },

    /// The region was unloaded while its capture was running.
    #[error("{0} is unloading")]
    RegionUnloading(RegionId),

    /// The capture ran past its deadline.
    #[error("capture of {region} exceeded {budget_ms}ms")]
    Timeout {
        /// Region being captured.
        region: RegionId,
        /// Configured capture budget.
        budget_ms: u64,
    },
}

impl CaptureError {
    /// Shorthand for [`CaptureError::SourceUnavailable`].
    pub fn unavailable(region: RegionId, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            region,
            reason: reason.into(),
        }
    }
}

/// Publishing a grid into a [`DoubleBufferedGrid`](crate::DoubleBufferedGrid) failed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildError {
    /// Another build already holds the region's build flag.
    #[error("build already in progress for {0}")]
    Overlap(RegionId),

    /// The region has been retired and accepts no new generations.
    #[error("{0} is retired")]
    Retired(RegionId),

    /// The grid was built for another region.
    #[error("grid belongs to {found}, expected {expected}")]
    RegionMismatch {
        /// Region of the double buffer.
        expected: RegionId,
        /// Region stamped on the grid.
        found: RegionId,
    },

    /// The grid was stamped with a generation other than the one being built.
    #[error("grid stamped {found}, build targets {expected}")]
    GenerationMismatch {
        /// Generation the build guard targets.
        expected: Generation,
        /// Generation stamped on the grid.
        found: Generation,
    },
}

/// Invalid grid geometry.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum GridError {
    /// Cell size must be a finite number greater than zero.
    #[error("invalid cell size {0}: must be finite and > 0")]
    InvalidCellSize(f32),
}

/// Why a captured record was dropped instead of indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// A coordinate was NaN or infinite.
    NonFinite,
    /// The position lies outside the region bounds.
    OutOfBounds,
    /// The radius was negative or not finite.
    InvalidRadius,
    /// The identity already appeared earlier in the same capture.
    Duplicate,
}

/// Result type for capture operations.
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Result type for publish operations.
pub type BuildResult<T> = Result<T, BuildError>;
