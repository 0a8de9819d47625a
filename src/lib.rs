//! Layercast - GPU/CPU extraction of point clouds, distance slices and meshes from sparse voxel block layers

pub mod core;
pub mod math;
pub mod voxel;
pub mod sensor;
pub mod compute;
pub mod convert;

pub use convert::LayerConverter;
