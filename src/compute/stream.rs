//! Ordered compute stream abstraction.
//!
//! A stream executes uploads and kernel launches in submission order without
//! blocking the caller. The host blocks only in [`ComputeStream::synchronize`],
//! after which counts and payloads from every prior launch are readable.

use super::upload::{BlockUpload, ExtractionParams, PointRecord, SliceParams, SliceUpload};
use crate::core::Result;

/// Backend-neutral compute stream
pub trait ComputeStream: Send {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Grow the payload buffer so it holds at least `capacity` records.
    /// Capacity never shrinks.
    fn ensure_point_capacity(&mut self, capacity: usize) -> Result<()>;

    /// Current payload buffer capacity in records
    fn point_capacity(&self) -> usize;

    /// Reset the count cell and launch point extraction over `upload`.
    ///
    /// The payload buffer must already hold `upload.max_points()` records.
    fn launch_point_extraction(&mut self, upload: BlockUpload, params: &ExtractionParams) -> Result<()>;

    /// Launch slice rasterization into the slice buffer
    fn launch_slice(&mut self, upload: SliceUpload, params: &SliceParams) -> Result<()>;

    /// Block until all submitted work is complete
    fn synchronize(&mut self) -> Result<()>;

    /// Count written by the last extraction. Call after `synchronize`.
    fn read_point_count(&mut self) -> Result<usize>;

    /// Copy the first `count` records of the payload buffer into `out`
    fn read_points(&mut self, count: usize, out: &mut Vec<PointRecord>) -> Result<()>;

    /// Copy the last slice into `out`, one value per cell
    fn read_slice(&mut self, out: &mut Vec<f32>) -> Result<()>;
}
