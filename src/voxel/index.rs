//! Block and voxel indexing

use glam::{IVec3, UVec3, Vec3};
use layercast_msgs::Index3D;

/// Number of voxels per block side
pub const VOXELS_PER_SIDE: u32 = 8;

/// Number of voxels in one block
pub const VOXELS_PER_BLOCK: usize = (VOXELS_PER_SIDE * VOXELS_PER_SIDE * VOXELS_PER_SIDE) as usize;

/// Integer coordinate identifying a block in a sparse layer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockIndex {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockIndex {
    /// Create a new block index
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Block containing a world position
    pub fn from_world_pos(pos: Vec3, block_size: f32) -> Self {
        Self {
            x: (pos.x / block_size).floor() as i32,
            y: (pos.y / block_size).floor() as i32,
            z: (pos.z / block_size).floor() as i32,
        }
    }

    /// World-space origin (minimum corner) of this block
    pub fn world_origin(&self, block_size: f32) -> Vec3 {
        Vec3::new(
            self.x as f32 * block_size,
            self.y as f32 * block_size,
            self.z as f32 * block_size,
        )
    }

    pub fn as_ivec3(&self) -> IVec3 {
        IVec3::new(self.x, self.y, self.z)
    }

    /// Packed for GPU upload (w is padding)
    pub fn to_gpu(&self) -> [i32; 4] {
        [self.x, self.y, self.z, 0]
    }
}

impl From<BlockIndex> for Index3D {
    fn from(index: BlockIndex) -> Self {
        Index3D::new(index.x, index.y, index.z)
    }
}

impl From<Index3D> for BlockIndex {
    fn from(index: Index3D) -> Self {
        BlockIndex::new(index.x, index.y, index.z)
    }
}

/// Linear offset of a voxel inside a block, x fastest
pub fn linear_voxel_index(voxel: UVec3) -> usize {
    debug_assert!(voxel.x < VOXELS_PER_SIDE && voxel.y < VOXELS_PER_SIDE && voxel.z < VOXELS_PER_SIDE);
    (voxel.x + VOXELS_PER_SIDE * (voxel.y + VOXELS_PER_SIDE * voxel.z)) as usize
}

/// Inverse of [`linear_voxel_index`]
pub fn voxel_index_from_linear(linear: usize) -> UVec3 {
    let n = VOXELS_PER_SIDE as usize;
    UVec3::new((linear % n) as u32, ((linear / n) % n) as u32, (linear / (n * n)) as u32)
}

/// World-space center of a voxel
pub fn voxel_center(block: BlockIndex, voxel: UVec3, block_size: f32) -> Vec3 {
    let voxel_size = block_size / VOXELS_PER_SIDE as f32;
    block.world_origin(block_size) + (voxel.as_vec3() + Vec3::splat(0.5)) * voxel_size
}

/// Split a global voxel coordinate into (block, voxel-in-block)
pub fn split_global_voxel(global: IVec3) -> (BlockIndex, UVec3) {
    let n = VOXELS_PER_SIDE as i32;
    let block = IVec3::new(
        global.x.div_euclid(n),
        global.y.div_euclid(n),
        global.z.div_euclid(n),
    );
    let local = global - block * n;
    (BlockIndex::new(block.x, block.y, block.z), local.as_uvec3())
}
