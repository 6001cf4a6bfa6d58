//! # Entity Source
//!
//! The boundary with the authoritative simulation.
//!
//! A source enumerates one region's live entities into a capture buffer. It
//! should run on the execution context that owns mutation for that region,
//! or under a short critical section that covers only the iteration. It must
//! never hand over a half-updated entity.

use sightline_core::{CaptureBuffer, CaptureError, RegionId};

/// Enumerates live entities for capture.
pub trait EntitySource: Send + Sync {
    /// Pushes every live entity of `region` into `sink`.
    ///
    /// Stop and propagate as soon as [`CaptureBuffer::push`] returns `Err`.
    ///
    /// # Errors
    ///
    /// [`CaptureError::SourceUnavailable`] when the region cannot be
    /// enumerated, or any abort reported by the sink.
    fn capture(&self, region: RegionId, sink: &mut CaptureBuffer<'_>) -> Result<(), CaptureError>;
}

impl<F> EntitySource for F
where
    F: Fn(RegionId, &mut CaptureBuffer<'_>) -> Result<(), CaptureError> + Send + Sync,
{
    fn capture(&self, region: RegionId, sink: &mut CaptureBuffer<'_>) -> Result<(), CaptureError> {
        self(region, sink)
    }
}
