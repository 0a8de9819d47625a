//! Conversions from voxel layers and frames to messages

pub mod selector;
pub mod points;
pub mod slice;
pub mod mesh;
pub mod image;
pub mod converter;

pub use converter::LayerConverter;
pub use selector::select_blocks;
