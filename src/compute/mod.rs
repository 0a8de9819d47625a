//! Compute streams and kernels
//!
//! Two backends implement [`ComputeStream`]: [`GpuStream`] runs WGSL
//! kernels through wgpu, [`CpuStream`] runs the same kernels on a rayon
//! pool behind a worker thread.

pub mod upload;
pub mod kernels;
pub mod stream;
pub mod host_pool;
pub mod failure;
pub mod cpu;
pub mod context;
pub mod pool;
pub mod gpu;

pub use context::ComputeContext;
pub use cpu::CpuStream;
pub use gpu::GpuStream;
pub use stream::ComputeStream;
pub use upload::{BlockUpload, ExtractionParams, GpuVoxel, PointRecord, SliceParams, SliceUpload};
