//! Sensor-side types: camera intrinsics and image frames

pub mod camera;
pub mod frame;

pub use camera::Camera;
pub use frame::{ColorImage, DepthImage};
