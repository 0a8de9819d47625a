//! Device-side records and per-call uploads.
//!
//! Every struct with `Pod` here must match its WGSL counterpart in
//! `shaders/extract_points.wgsl` / `shaders/distance_slice.wgsl` exactly.

use bytemuck::{Pod, Zeroable};
use glam::{IVec2, UVec2, Vec2, Vec3};

use crate::core::config::SliceInterpolation;
use crate::math::Aabb;
use crate::voxel::index::{BlockIndex, VOXELS_PER_BLOCK};
use crate::voxel::layer::VoxelBlockLayer;
use crate::voxel::voxel::{AcceptPredicate, ExtractableVoxel, VoxelSample};

/// Table entry for a block column that is not allocated
pub const EMPTY_SLOT: u32 = u32::MAX;

/// Bounds beyond this are clamped before upload; shaders may not see infinities
const GPU_BOUND_LIMIT: f32 = 1.0e30;

/// Voxel as uploaded to the device (16 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuVoxel {
    pub value: f32,
    /// Payload bits copied into the output record
    pub payload: u32,
    /// 1 if observed
    pub observed: u32,
    pub _pad: u32,
}

impl GpuVoxel {
    pub fn from_sample(sample: VoxelSample) -> Self {
        Self {
            value: sample.value,
            payload: sample.payload,
            observed: sample.observed as u32,
            _pad: 0,
        }
    }

    pub fn sample(&self) -> VoxelSample {
        VoxelSample {
            observed: self.observed != 0,
            value: self.value,
            payload: self.payload,
        }
    }
}

/// One extracted point (16 bytes, same layout as a PCL XYZI point)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PointRecord {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Payload bits (float intensity or packed rgb)
    pub payload: u32,
}

impl PointRecord {
    pub fn new(position: Vec3, payload: u32) -> Self {
        Self {
            x: position.x,
            y: position.y,
            z: position.z,
            payload,
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }
}

/// Selected blocks packed for the extraction kernel
#[derive(Clone, Debug, Default)]
pub struct BlockUpload {
    /// Block indices (xyz, w unused), one per selected block
    pub indices: Vec<[i32; 4]>,
    /// `VOXELS_PER_BLOCK` voxels per block, block-major, same order as `indices`
    pub voxels: Vec<GpuVoxel>,
}

impl BlockUpload {
    /// Pack the voxels of `indices` from `layer`. Indices must be allocated.
    pub fn from_layer<V: ExtractableVoxel>(layer: &VoxelBlockLayer<V>, indices: &[BlockIndex]) -> Self {
        let voxel_size = layer.voxel_size();
        let mut upload = Self {
            indices: Vec::with_capacity(indices.len()),
            voxels: Vec::with_capacity(indices.len() * VOXELS_PER_BLOCK),
        };
        for index in indices {
            let Some(block) = layer.get_block_at_index(*index) else {
                debug_assert!(false, "selected block {:?} is not allocated", index);
                continue;
            };
            upload.indices.push(index.to_gpu());
            upload
                .voxels
                .extend(block.voxels().iter().map(|v| GpuVoxel::from_sample(v.sample(voxel_size))));
        }
        upload
    }

    pub fn block_count(&self) -> usize {
        self.indices.len()
    }

    /// Conservative output bound: every voxel of every block accepted
    pub fn max_points(&self) -> usize {
        self.indices.len() * VOXELS_PER_BLOCK
    }
}

/// Per-call extraction parameters
#[derive(Clone, Copy, Debug)]
pub struct ExtractionParams {
    /// Only voxels whose centers lie inside are emitted
    pub aabb: Aabb,
    pub predicate: AcceptPredicate,
    pub voxel_size: f32,
    pub block_size: f32,
}

/// Extraction uniform (64 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ExtractUniform {
    pub aabb_min: [f32; 3],
    pub block_count: u32,
    pub aabb_max: [f32; 3],
    pub voxel_size: f32,
    pub block_size: f32,
    pub predicate_mode: u32,
    pub predicate_param: f32,
    /// Payload buffer capacity in records
    pub capacity: u32,
    /// Invocations per dispatch row
    pub row_stride: u32,
    pub _pad: [u32; 3],
}

impl ExtractUniform {
    pub fn new(params: &ExtractionParams, block_count: u32, capacity: u32, row_stride: u32) -> Self {
        let (predicate_mode, predicate_param) = params.predicate.to_gpu();
        let clamp = |v: Vec3| v.clamp(Vec3::splat(-GPU_BOUND_LIMIT), Vec3::splat(GPU_BOUND_LIMIT)).to_array();
        Self {
            aabb_min: clamp(params.aabb.min),
            block_count,
            aabb_max: clamp(params.aabb.max),
            voxel_size: params.voxel_size,
            block_size: params.block_size,
            predicate_mode,
            predicate_param,
            capacity,
            row_stride,
            _pad: [0; 3],
        }
    }
}

/// Per-call slice parameters
#[derive(Clone, Copy, Debug)]
pub struct SliceParams {
    /// World xy of the grid's min corner
    pub origin: Vec2,
    /// Cell size in meters
    pub resolution: f32,
    /// World z of the slice plane
    pub height: f32,
    pub width: u32,
    pub rows: u32,
    /// Global voxel z coordinate containing `height`
    pub voxel_z: i32,
    pub voxel_size: f32,
    pub unknown_value: f32,
    pub interpolation: SliceInterpolation,
}

impl SliceParams {
    pub fn cell_count(&self) -> usize {
        self.width as usize * self.rows as usize
    }
}

/// Blocks of one block layer plus a dense xy lookup table
#[derive(Clone, Debug, Default)]
pub struct SliceUpload {
    /// Block coordinate of table cell (0, 0)
    pub table_min: IVec2,
    pub table_dims: UVec2,
    /// Row-major slot per block column, `EMPTY_SLOT` when unallocated
    pub table: Vec<u32>,
    /// `VOXELS_PER_BLOCK` voxels per slot
    pub voxels: Vec<GpuVoxel>,
}

impl SliceUpload {
    /// Slot of the block at block coordinates (x, y), if uploaded
    pub fn slot(&self, block_x: i32, block_y: i32) -> Option<u32> {
        let t = IVec2::new(block_x, block_y) - self.table_min;
        if t.x < 0 || t.y < 0 || t.x as u32 >= self.table_dims.x || t.y as u32 >= self.table_dims.y {
            return None;
        }
        let slot = self.table[(t.y as u32 * self.table_dims.x + t.x as u32) as usize];
        (slot != EMPTY_SLOT).then_some(slot)
    }

    pub fn block_count(&self) -> usize {
        self.voxels.len() / VOXELS_PER_BLOCK
    }
}

/// Slice uniform (64 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct SliceUniform {
    pub origin: [f32; 2],
    pub resolution: f32,
    pub height: f32,
    pub width: u32,
    pub rows: u32,
    pub voxel_z: i32,
    pub interpolation: u32,
    pub table_min: [i32; 2],
    pub table_dims: [u32; 2],
    pub voxel_size: f32,
    pub unknown_value: f32,
    pub _pad: [u32; 2],
}

impl SliceUniform {
    pub fn new(params: &SliceParams, upload: &SliceUpload) -> Self {
        Self {
            origin: params.origin.to_array(),
            resolution: params.resolution,
            height: params.height,
            width: params.width,
            rows: params.rows,
            voxel_z: params.voxel_z,
            interpolation: params.interpolation.gpu_mode(),
            table_min: upload.table_min.to_array(),
            table_dims: upload.table_dims.to_array(),
            voxel_size: params.voxel_size,
            unknown_value: params.unknown_value,
            _pad: [0; 2],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::layer::TsdfLayer;
    use crate::voxel::voxel::TsdfVoxel;

    #[test]
    fn test_uniform_sizes() {
        // Must match the WGSL struct layouts
        assert_eq!(std::mem::size_of::<GpuVoxel>(), 16);
        assert_eq!(std::mem::size_of::<PointRecord>(), 16);
        assert_eq!(std::mem::size_of::<ExtractUniform>(), 64);
        assert_eq!(std::mem::size_of::<SliceUniform>(), 64);
    }

    #[test]
    fn test_block_upload_packs_in_order() {
        let mut layer = TsdfLayer::new(0.8);
        let a = BlockIndex::new(0, 0, 0);
        let b = BlockIndex::new(1, 0, 0);
        layer.allocate_block(a);
        layer
            .allocate_block(b)
            .set(glam::UVec3::ZERO, TsdfVoxel { distance: 0.05, weight: 1.0 });

        let upload = BlockUpload::from_layer(&layer, &[a, b]);
        assert_eq!(upload.block_count(), 2);
        assert_eq!(upload.max_points(), 1024);
        assert_eq!(upload.indices[1], [1, 0, 0, 0]);
        assert_eq!(upload.voxels[VOXELS_PER_BLOCK].observed, 1);
        assert_eq!(upload.voxels[VOXELS_PER_BLOCK].value, 0.05);
        assert_eq!(upload.voxels[0].observed, 0);
    }

    #[test]
    fn test_infinite_bounds_are_clamped() {
        let params = ExtractionParams {
            aabb: Aabb::infinite(),
            predicate: AcceptPredicate::Observed,
            voxel_size: 0.1,
            block_size: 0.8,
        };
        let uniform = ExtractUniform::new(&params, 1, 512, 256);
        assert!(uniform.aabb_min.iter().all(|v| v.is_finite()));
        assert!(uniform.aabb_max.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_slice_table_lookup() {
        let upload = SliceUpload {
            table_min: IVec2::new(-1, 2),
            table_dims: UVec2::new(2, 1),
            table: vec![EMPTY_SLOT, 0],
            voxels: vec![GpuVoxel::default(); VOXELS_PER_BLOCK],
        };
        assert_eq!(upload.slot(0, 2), Some(0));
        assert_eq!(upload.slot(-1, 2), None);
        assert_eq!(upload.slot(5, 2), None);
        assert_eq!(upload.block_count(), 1);
    }
}
