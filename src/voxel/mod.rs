//! Sparse voxel block layers and their voxel types

pub mod index;
pub mod voxel;
pub mod block;
pub mod layer;
pub mod mesh;
pub mod synthetic;

pub use index::{BlockIndex, VOXELS_PER_BLOCK, VOXELS_PER_SIDE};
pub use voxel::{AcceptPredicate, ColorVoxel, EsdfVoxel, ExtractableVoxel, OccupancyVoxel, PayloadKind, TsdfVoxel};
pub use block::VoxelBlock;
pub use layer::{BlockLayer, ColorLayer, EsdfLayer, MeshLayer, OccupancyLayer, TsdfLayer, VoxelBlockLayer};
pub use mesh::{Color, MeshBlock};
