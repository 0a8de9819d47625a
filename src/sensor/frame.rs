//! Depth and color frames in their native buffers

use image::{ImageBuffer, Luma};

/// Depth in meters, one f32 per pixel
pub type DepthImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// 8-bit RGB color frame
pub type ColorImage = image::RgbImage;

/// Bytes per depth pixel
pub const DEPTH_BYTES_PER_PIXEL: usize = std::mem::size_of::<f32>();

/// Bytes per color pixel
pub const COLOR_BYTES_PER_PIXEL: usize = 3;
