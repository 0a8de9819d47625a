//! Pinhole camera intrinsics

/// Pinhole camera model
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    /// Focal length in pixels, u axis
    pub fu: f32,
    /// Focal length in pixels, v axis
    pub fv: f32,
    /// Principal point u
    pub cu: f32,
    /// Principal point v
    pub cv: f32,
    pub width: u32,
    pub height: u32,
}

impl Camera {
    pub fn new(fu: f32, fv: f32, cu: f32, cv: f32, width: u32, height: u32) -> Self {
        Self { fu, fv, cu, cv, width, height }
    }
}
