//! Block selection

use crate::compute::upload::BlockUpload;
use crate::math::Aabb;
use crate::voxel::index::BlockIndex;
use crate::voxel::layer::{BlockLayer, VoxelBlockLayer};
use crate::voxel::voxel::ExtractableVoxel;

/// Allocated blocks to process, sorted.
///
/// With no AABB every allocated block is selected. Otherwise only blocks
/// whose bounds intersect the AABB; an empty AABB selects nothing.
pub fn select_blocks<B>(layer: &BlockLayer<B>, aabb: Option<&Aabb>) -> Vec<BlockIndex> {
    let mut indices: Vec<BlockIndex> = match aabb {
        None => layer.all_block_indices().copied().collect(),
        Some(aabb) if aabb.is_empty() => Vec::new(),
        Some(aabb) => layer
            .all_block_indices()
            .filter(|index| layer.block_bounds(**index).intersects(aabb))
            .copied()
            .collect(),
    };
    indices.sort_unstable();
    indices
}

/// Pack the selected blocks for a kernel launch
pub fn upload_blocks<V: ExtractableVoxel>(layer: &VoxelBlockLayer<V>, indices: &[BlockIndex]) -> BlockUpload {
    BlockUpload::from_layer(layer, indices)
}
