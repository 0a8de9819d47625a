//! Host implementations of the extraction and slice kernels.
//!
//! These follow `shaders/extract_points.wgsl` and `shaders/distance_slice.wgsl`
//! line for line so both backends produce the same sets.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU32, Ordering};

use glam::{IVec3, Vec2};
use rayon::prelude::*;

use super::upload::{BlockUpload, ExtractionParams, PointRecord, SliceParams, SliceUpload};
use crate::core::config::SliceInterpolation;
use crate::voxel::index::{
    linear_voxel_index, split_global_voxel, voxel_center, voxel_index_from_linear, BlockIndex,
    VOXELS_PER_BLOCK,
};

/// Emit one record per accepted voxel whose center lies in the AABB.
///
/// Slots are claimed with `fetch_add` on `count`; emission order is not
/// deterministic. `slots` must hold at least `upload.max_points()` cells.
pub fn extract_points(
    upload: &BlockUpload,
    params: &ExtractionParams,
    slots: &[OnceLock<PointRecord>],
    count: &AtomicU32,
) {
    upload
        .voxels
        .par_chunks(VOXELS_PER_BLOCK)
        .zip(upload.indices.par_iter())
        .for_each(|(voxels, index)| {
            let block = BlockIndex::new(index[0], index[1], index[2]);
            for (linear, voxel) in voxels.iter().enumerate() {
                if !params.predicate.accepts(&voxel.sample()) {
                    continue;
                }
                let position = voxel_center(block, voxel_index_from_linear(linear), params.block_size);
                if !params.aabb.contains_point(position) {
                    continue;
                }
                let slot = count.fetch_add(1, Ordering::Relaxed) as usize;
                match slots.get(slot) {
                    Some(cell) => {
                        let _ = cell.set(PointRecord::new(position, voxel.payload));
                    }
                    None => debug_assert!(false, "payload slot {} out of capacity", slot),
                }
            }
        });
}

/// Fill `out` (row-major, `params.width` per row) with sampled distances
pub fn rasterize_slice(upload: &SliceUpload, params: &SliceParams, out: &mut [f32]) {
    if params.width == 0 {
        return;
    }
    out.par_chunks_mut(params.width as usize)
        .enumerate()
        .for_each(|(row, cells)| {
            for (col, cell) in cells.iter_mut().enumerate() {
                *cell = sample_cell(upload, params, col as u32, row as u32);
            }
        });
}

/// Distance at the center of cell (col, row), or the unknown sentinel
pub fn sample_cell(upload: &SliceUpload, params: &SliceParams, col: u32, row: u32) -> f32 {
    let world = params.origin
        + (Vec2::new(col as f32, row as f32) + Vec2::splat(0.5)) * params.resolution;
    let f = world / params.voxel_size;

    let nearest = lookup(upload, params.voxel_z, f.x.floor() as i32, f.y.floor() as i32);
    let mut value = nearest.unwrap_or(params.unknown_value);

    if params.interpolation == SliceInterpolation::Bilinear {
        let s = f - Vec2::splat(0.5);
        let x0 = s.x.floor() as i32;
        let y0 = s.y.floor() as i32;
        let t = s - s.floor();
        let corners = (
            lookup(upload, params.voxel_z, x0, y0),
            lookup(upload, params.voxel_z, x0 + 1, y0),
            lookup(upload, params.voxel_z, x0, y0 + 1),
            lookup(upload, params.voxel_z, x0 + 1, y0 + 1),
        );
        // Any unobserved corner falls back to nearest
        if let (Some(v00), Some(v10), Some(v01), Some(v11)) = corners {
            let bottom = v00 + (v10 - v00) * t.x;
            let top = v01 + (v11 - v01) * t.x;
            value = bottom + (top - bottom) * t.y;
        }
    }
    value
}

/// Observed value of the voxel at global voxel coordinates (x, y, voxel_z)
fn lookup(upload: &SliceUpload, voxel_z: i32, x: i32, y: i32) -> Option<f32> {
    let (block, local) = split_global_voxel(IVec3::new(x, y, voxel_z));
    let slot = upload.slot(block.x, block.y)? as usize;
    let voxel = upload.voxels[slot * VOXELS_PER_BLOCK + linear_voxel_index(local)];
    (voxel.observed != 0).then_some(voxel.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::upload::{GpuVoxel, EMPTY_SLOT};
    use crate::math::Aabb;
    use crate::voxel::voxel::AcceptPredicate;
    use glam::{IVec2, UVec2, UVec3, Vec3};

    fn observed(value: f32) -> GpuVoxel {
        GpuVoxel {
            value,
            payload: value.to_bits(),
            observed: 1,
            _pad: 0,
        }
    }

    fn single_block_upload(voxels: &[(UVec3, GpuVoxel)]) -> BlockUpload {
        let mut upload = BlockUpload {
            indices: vec![[0, 0, 0, 0]],
            voxels: vec![GpuVoxel::default(); VOXELS_PER_BLOCK],
        };
        for (v, voxel) in voxels {
            upload.voxels[linear_voxel_index(*v)] = *voxel;
        }
        upload
    }

    fn run(upload: &BlockUpload, params: &ExtractionParams) -> Vec<PointRecord> {
        let slots: Vec<OnceLock<PointRecord>> = (0..upload.max_points()).map(|_| OnceLock::new()).collect();
        let count = AtomicU32::new(0);
        extract_points(upload, params, &slots, &count);
        let n = count.load(Ordering::Relaxed) as usize;
        slots[..n].iter().filter_map(|s| s.get().copied()).collect()
    }

    #[test]
    fn test_extract_predicate_and_aabb() {
        let upload = single_block_upload(&[
            (UVec3::new(0, 0, 0), observed(0.05)),
            (UVec3::new(1, 0, 0), observed(0.9)),
            (UVec3::new(7, 7, 7), observed(0.0)),
        ]);
        let mut params = ExtractionParams {
            aabb: Aabb::infinite(),
            predicate: AcceptPredicate::WithinDistance(0.1),
            voxel_size: 0.1,
            block_size: 0.8,
        };
        assert_eq!(run(&upload, &params).len(), 2);

        params.aabb = Aabb::new(Vec3::ZERO, Vec3::splat(0.2));
        let points = run(&upload, &params);
        assert_eq!(points.len(), 1);
        assert!((points[0].position() - Vec3::splat(0.05)).length() < 1e-6);
        assert_eq!(f32::from_bits(points[0].payload), 0.05);
    }

    fn slice_upload(voxels: &[(UVec3, GpuVoxel)]) -> SliceUpload {
        let mut block = vec![GpuVoxel::default(); VOXELS_PER_BLOCK];
        for (v, voxel) in voxels {
            block[linear_voxel_index(*v)] = *voxel;
        }
        SliceUpload {
            table_min: IVec2::ZERO,
            table_dims: UVec2::new(2, 1),
            table: vec![0, EMPTY_SLOT],
            voxels: block,
        }
    }

    fn slice_params(interpolation: SliceInterpolation) -> SliceParams {
        SliceParams {
            origin: Vec2::ZERO,
            resolution: 1.0,
            height: 0.5,
            width: 2,
            rows: 1,
            voxel_z: 0,
            voxel_size: 1.0,
            unknown_value: 1000.0,
            interpolation,
        }
    }

    #[test]
    fn test_slice_nearest_and_sentinel() {
        let upload = slice_upload(&[(UVec3::new(0, 0, 0), observed(2.5))]);
        let params = slice_params(SliceInterpolation::Nearest);
        let mut out = vec![0.0; params.cell_count()];
        rasterize_slice(&upload, &params, &mut out);
        assert_eq!(out, vec![2.5, 1000.0]);
    }

    #[test]
    fn test_slice_bilinear_blends_observed_neighbors() {
        let upload = slice_upload(&[
            (UVec3::new(0, 0, 0), observed(0.0)),
            (UVec3::new(1, 0, 0), observed(1.0)),
            (UVec3::new(0, 1, 0), observed(0.0)),
            (UVec3::new(1, 1, 0), observed(1.0)),
        ]);
        let mut params = slice_params(SliceInterpolation::Bilinear);
        params.resolution = 0.5;
        params.width = 4;
        params.rows = 4;
        // Cell (2, 1) centers at (1.25, 0.75), three quarters of the way from x0 to x1
        let value = sample_cell(&upload, &params, 2, 1);
        assert!((value - 0.75).abs() < 1e-6, "got {value}");
    }

    #[test]
    fn test_slice_bilinear_falls_back_to_nearest() {
        let upload = slice_upload(&[(UVec3::new(0, 0, 0), observed(3.0))]);
        let params = slice_params(SliceInterpolation::Bilinear);
        assert_eq!(sample_cell(&upload, &params, 0, 0), 3.0);
    }
}
