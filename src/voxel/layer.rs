//! Sparse block layer - spatial lookup for allocated blocks.

use std::collections::HashMap;

use glam::Vec3;

use crate::math::Aabb;
use crate::voxel::block::VoxelBlock;
use crate::voxel::index::{BlockIndex, VOXELS_PER_SIDE};
use crate::voxel::mesh::MeshBlock;
use crate::voxel::voxel::{ColorVoxel, EsdfVoxel, OccupancyVoxel, TsdfVoxel};

/// Sparse mapping from block index to block.
///
/// Only allocated regions are stored; everything else is unobserved space.
pub struct BlockLayer<B> {
    blocks: HashMap<BlockIndex, B>,
    /// Edge length of a block in meters
    block_size: f32,
}

pub type VoxelBlockLayer<V> = BlockLayer<VoxelBlock<V>>;
pub type TsdfLayer = VoxelBlockLayer<TsdfVoxel>;
pub type EsdfLayer = VoxelBlockLayer<EsdfVoxel>;
pub type OccupancyLayer = VoxelBlockLayer<OccupancyVoxel>;
pub type ColorLayer = VoxelBlockLayer<ColorVoxel>;
pub type MeshLayer = BlockLayer<MeshBlock>;

impl<B> BlockLayer<B> {
    /// Create an empty layer
    pub fn new(block_size: f32) -> Self {
        debug_assert!(block_size > 0.0);
        Self {
            blocks: HashMap::new(),
            block_size,
        }
    }

    /// Create an empty layer from the voxel edge length
    pub fn from_voxel_size(voxel_size: f32) -> Self {
        Self::new(voxel_size * VOXELS_PER_SIDE as f32)
    }

    pub fn block_size(&self) -> f32 {
        self.block_size
    }

    pub fn voxel_size(&self) -> f32 {
        self.block_size / VOXELS_PER_SIDE as f32
    }

    /// Get a block by index
    pub fn get_block_at_index(&self, index: BlockIndex) -> Option<&B> {
        self.blocks.get(&index)
    }

    /// Get mutable block by index
    pub fn get_block_at_index_mut(&mut self, index: BlockIndex) -> Option<&mut B> {
        self.blocks.get_mut(&index)
    }

    /// Insert a block, replacing any block already at `index`
    pub fn insert_block(&mut self, index: BlockIndex, block: B) -> Option<B> {
        self.blocks.insert(index, block)
    }

    /// All allocated block indices (unordered)
    pub fn all_block_indices(&self) -> impl Iterator<Item = &BlockIndex> {
        self.blocks.keys()
    }

    /// All allocated blocks
    pub fn iter(&self) -> impl Iterator<Item = (&BlockIndex, &B)> {
        self.blocks.iter()
    }

    pub fn num_allocated_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// World bounds of a block
    pub fn block_bounds(&self, index: BlockIndex) -> Aabb {
        let origin = index.world_origin(self.block_size);
        Aabb::new(origin, origin + Vec3::splat(self.block_size))
    }

    /// Bounds of all allocated blocks, None for an empty layer
    pub fn allocated_aabb(&self) -> Option<Aabb> {
        if self.blocks.is_empty() {
            return None;
        }
        let mut aabb = Aabb::empty();
        for index in self.blocks.keys() {
            let bounds = self.block_bounds(*index);
            aabb.expand(bounds.min);
            aabb.expand(bounds.max);
        }
        Some(aabb)
    }
}

impl<B: Default> BlockLayer<B> {
    /// Get the block at `index`, allocating an empty one if needed
    pub fn allocate_block(&mut self, index: BlockIndex) -> &mut B {
        self.blocks.entry(index).or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_get_block() {
        let mut layer = TsdfLayer::new(0.4);
        let index = BlockIndex::new(1, 2, 3);
        layer.allocate_block(index);

        assert!(layer.get_block_at_index(index).is_some());
        assert!(layer.get_block_at_index(BlockIndex::new(0, 0, 0)).is_none());
        assert_eq!(layer.num_allocated_blocks(), 1);
    }

    #[test]
    fn test_allocate_is_idempotent() {
        let mut layer = TsdfLayer::new(0.4);
        layer.allocate_block(BlockIndex::new(0, 0, 0)).set(
            glam::UVec3::ZERO,
            TsdfVoxel { distance: 1.0, weight: 1.0 },
        );
        let block = layer.allocate_block(BlockIndex::new(0, 0, 0));
        assert_eq!(block.get(glam::UVec3::ZERO).weight, 1.0);
        assert_eq!(layer.num_allocated_blocks(), 1);
    }

    #[test]
    fn test_block_at_position() {
        let mut layer = EsdfLayer::new(1.0);
        layer.allocate_block(BlockIndex::new(0, 0, 0));
        let inside = BlockIndex::from_world_pos(Vec3::new(0.5, 0.5, 0.5), layer.block_size());
        let outside = BlockIndex::from_world_pos(Vec3::new(1.5, 0.5, 0.5), layer.block_size());
        assert!(layer.get_block_at_index(inside).is_some());
        assert!(layer.get_block_at_index(outside).is_none());
    }

    #[test]
    fn test_voxel_size() {
        let layer = TsdfLayer::from_voxel_size(0.05);
        assert!((layer.block_size() - 0.4).abs() < 1e-6);
        assert!((layer.voxel_size() - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_allocated_aabb() {
        let mut layer = TsdfLayer::new(1.0);
        assert!(layer.allocated_aabb().is_none());

        layer.allocate_block(BlockIndex::new(0, 0, 0));
        layer.allocate_block(BlockIndex::new(2, -1, 0));
        let aabb = layer.allocated_aabb().unwrap();
        assert_eq!(aabb.min, Vec3::new(0.0, -1.0, 0.0));
        assert_eq!(aabb.max, Vec3::new(3.0, 1.0, 1.0));
    }
}
