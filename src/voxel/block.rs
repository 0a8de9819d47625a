//! Fixed-size voxel block

use glam::UVec3;

use super::index::{linear_voxel_index, VOXELS_PER_BLOCK};

/// Cube of `VOXELS_PER_SIDE`³ voxels
#[derive(Clone, Debug, PartialEq)]
pub struct VoxelBlock<V> {
    voxels: Vec<V>,
}

impl<V: Copy + Default> VoxelBlock<V> {
    /// Block with every voxel at its default (unobserved) state
    pub fn new() -> Self {
        Self {
            voxels: vec![V::default(); VOXELS_PER_BLOCK],
        }
    }

    /// Get voxel at local coordinates
    pub fn get(&self, voxel: UVec3) -> &V {
        &self.voxels[linear_voxel_index(voxel)]
    }

    /// Get mutable voxel at local coordinates
    pub fn get_mut(&mut self, voxel: UVec3) -> &mut V {
        &mut self.voxels[linear_voxel_index(voxel)]
    }

    /// Set voxel at local coordinates
    pub fn set(&mut self, voxel: UVec3, value: V) {
        self.voxels[linear_voxel_index(voxel)] = value;
    }

    /// All voxels in linear order (x fastest)
    pub fn voxels(&self) -> &[V] {
        &self.voxels
    }
}

impl<V: Copy + Default> Default for VoxelBlock<V> {
    fn default() -> Self {
        Self::new()
    }
}
