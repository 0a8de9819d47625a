//! Message schemas produced and consumed by layercast.
//!
//! These mirror the field layout of the middleware messages the converter
//! talks to (point clouds, images, camera info, distance map slices and
//! meshes). They are plain serde structs; the byte layout of the transport
//! is the middleware's concern.

pub mod geometry;
pub mod map;
pub mod sensor;

pub use geometry::{ColorRgba, Index3D, Point, Point32};
pub use map::{DistanceMapSlice, Mesh, MeshBlock};
pub use sensor::{CameraInfo, Header, Image, PointCloud2, PointField};

/// Image encoding names
pub mod encodings {
    pub const TYPE_32FC1: &str = "32FC1";
    pub const RGB8: &str = "rgb8";
    pub const RGBA8: &str = "rgba8";
    pub const MONO8: &str = "mono8";
    pub const MONO16: &str = "mono16";
}
