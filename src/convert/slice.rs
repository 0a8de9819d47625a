//! Distance map slice planning, upload and marshaling

use glam::{IVec2, UVec2, Vec2, Vec3};
use layercast_msgs::{DistanceMapSlice, Point};

use super::selector::select_blocks;
use crate::compute::stream::ComputeStream;
use crate::compute::upload::{GpuVoxel, SliceUpload, EMPTY_SLOT};
use crate::core::error::Error;
use crate::core::Result;
use crate::math::Aabb;
use crate::voxel::index::VOXELS_PER_SIDE;
use crate::voxel::layer::VoxelBlockLayer;
use crate::voxel::voxel::ExtractableVoxel;

/// Output grid of a slice, fixed before launch
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SliceGrid {
    /// World xy of the min corner
    pub origin: Vec2,
    pub resolution: f32,
    pub width: u32,
    pub rows: u32,
}

impl SliceGrid {
    /// Grid covering the horizontal extent of `aabb`, `ceil(extent / resolution)`
    /// cells per axis. Degenerate extents or resolutions give an empty grid.
    pub fn new(aabb: &Aabb, resolution: f32) -> Self {
        let size = aabb.size();
        let origin = if aabb.min.x.is_finite() && aabb.min.y.is_finite() {
            Vec2::new(aabb.min.x, aabb.min.y)
        } else {
            Vec2::ZERO
        };
        let valid = resolution > 0.0
            && resolution.is_finite()
            && size.x > 0.0
            && size.y > 0.0
            && size.x.is_finite()
            && size.y.is_finite();
        if !valid {
            return Self {
                origin,
                resolution,
                width: 0,
                rows: 0,
            };
        }
        Self {
            origin,
            resolution,
            width: (size.x / resolution).ceil() as u32,
            rows: (size.y / resolution).ceil() as u32,
        }
    }

    pub fn cell_count(&self) -> usize {
        (self.width as usize).saturating_mul(self.rows as usize)
    }

    /// Cell count, rejecting grids larger than `max_cells`.
    ///
    /// Axis counts saturate at `u32::MAX` in [`SliceGrid::new`], so a
    /// saturated axis always fails here.
    pub fn checked_cell_count(&self, max_cells: usize) -> Result<usize> {
        let saturated = self.width == u32::MAX || self.rows == u32::MAX;
        match (self.width as usize).checked_mul(self.rows as usize) {
            Some(cells) if cells <= max_cells && !saturated => Ok(cells),
            _ => Err(Error::InvalidRequest(format!(
                "slice grid {}x{} exceeds the limit of {} cells",
                self.width, self.rows, max_cells
            ))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cell_count() == 0
    }

    /// World xy of the max corner
    pub fn max_corner(&self) -> Vec2 {
        self.origin + Vec2::new(self.width as f32, self.rows as f32) * self.resolution
    }
}

/// Global voxel z coordinate of the slice plane
pub fn slice_voxel_z(height: f32, voxel_size: f32) -> i32 {
    (height / voxel_size).floor() as i32
}

/// Upload the blocks of the slice's block layer that the grid can touch,
/// with a dense xy lookup table over their range.
pub fn build_slice_upload<V: ExtractableVoxel>(
    layer: &VoxelBlockLayer<V>,
    grid: &SliceGrid,
    height: f32,
) -> SliceUpload {
    if grid.is_empty() {
        return SliceUpload::default();
    }
    let voxel_size = layer.voxel_size();
    let block_z = slice_voxel_z(height, voxel_size).div_euclid(VOXELS_PER_SIDE as i32);

    // One voxel of margin for bilinear neighbors and for z rounding
    let margin = Vec3::splat(voxel_size);
    let reach = Aabb::new(
        grid.origin.extend(height) - margin,
        grid.max_corner().extend(height) + margin,
    );
    let indices: Vec<_> = select_blocks(layer, Some(&reach))
        .into_iter()
        .filter(|index| index.z == block_z)
        .collect();
    if indices.is_empty() {
        return SliceUpload::default();
    }

    let mut min = IVec2::new(indices[0].x, indices[0].y);
    let mut max = min;
    for index in &indices {
        min = min.min(IVec2::new(index.x, index.y));
        max = max.max(IVec2::new(index.x, index.y));
    }
    let dims = (max - min + IVec2::ONE).as_uvec2();

    let mut upload = SliceUpload {
        table_min: min,
        table_dims: dims,
        table: vec![EMPTY_SLOT; dims.x as usize * dims.y as usize],
        voxels: Vec::with_capacity(indices.len() * crate::voxel::index::VOXELS_PER_BLOCK),
    };
    let mut slot = 0u32;
    for index in &indices {
        let Some(block) = layer.get_block_at_index(*index) else {
            continue;
        };
        let t = UVec2::new((index.x - min.x) as u32, (index.y - min.y) as u32);
        upload.table[(t.y * dims.x + t.x) as usize] = slot;
        upload
            .voxels
            .extend(block.voxels().iter().map(|v| GpuVoxel::from_sample(v.sample(voxel_size))));
        slot += 1;
    }
    log::trace!(
        "Slice upload: {} blocks at block z {}, table {}x{}",
        slot,
        block_z,
        dims.x,
        dims.y
    );
    upload
}

/// Wait for the stream and copy the whole grid
pub fn read_back_slice(stream: &mut dyn ComputeStream, cells: usize) -> Result<Vec<f32>> {
    stream.synchronize()?;
    let mut data = Vec::with_capacity(cells);
    stream.read_slice(&mut data)?;
    debug_assert_eq!(data.len(), cells);
    Ok(data)
}

/// Assemble the output message
pub fn slice_message(grid: &SliceGrid, height: f32, unknown_value: f32, data: Vec<f32>) -> DistanceMapSlice {
    DistanceMapSlice {
        header: Default::default(),
        origin: Point {
            x: grid.origin.x as f64,
            y: grid.origin.y as f64,
            z: height as f64,
        },
        resolution: grid.resolution,
        width: grid.width,
        height: grid.rows,
        unknown_value,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::index::BlockIndex;
    use crate::voxel::layer::EsdfLayer;

    #[test]
    fn test_grid_dimensions() {
        let aabb = Aabb::new(Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.5, 2.0));
        let grid = SliceGrid::new(&aabb, 0.25);
        assert_eq!((grid.width, grid.rows), (8, 2));
        assert_eq!(grid.origin, Vec2::new(-1.0, 0.0));

        // Partial cells round up
        let grid = SliceGrid::new(&aabb, 0.3);
        assert_eq!((grid.width, grid.rows), (7, 2));
    }

    #[test]
    fn test_oversized_grid_is_rejected() {
        let huge = Aabb::new(Vec3::ZERO, Vec3::new(1.0e6, 1.0e6, 1.0));
        let grid = SliceGrid::new(&huge, 1.0e-4);
        assert_eq!(grid.width, u32::MAX);
        assert!(matches!(grid.checked_cell_count(usize::MAX), Err(Error::InvalidRequest(_))));

        let grid = SliceGrid::new(&Aabb::new(Vec3::ZERO, Vec3::new(1.0, 1.0, 1.0)), 0.1);
        assert_eq!(grid.checked_cell_count(100).unwrap(), 100);
        assert!(grid.checked_cell_count(99).is_err());
    }

    #[test]
    fn test_degenerate_grid_is_empty() {
        let flat = Aabb::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 1.0));
        assert!(SliceGrid::new(&flat, 0.1).is_empty());
        let inverted = Aabb::new(Vec3::ONE, Vec3::ZERO);
        assert!(SliceGrid::new(&inverted, 0.1).is_empty());
        let unit = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert!(SliceGrid::new(&unit, 0.0).is_empty());
        assert!(SliceGrid::new(&Aabb::infinite(), 0.1).is_empty());
    }

    #[test]
    fn test_upload_takes_only_the_slice_block_layer() {
        let mut layer = EsdfLayer::new(0.8);
        layer.allocate_block(BlockIndex::new(0, 0, 0));
        layer.allocate_block(BlockIndex::new(1, 0, 0));
        layer.allocate_block(BlockIndex::new(0, 0, 1));
        layer.allocate_block(BlockIndex::new(0, 2, 0));

        let grid = SliceGrid::new(&Aabb::new(Vec3::ZERO, Vec3::new(1.6, 0.8, 0.8)), 0.1);
        let upload = build_slice_upload(&layer, &grid, 0.4);
        assert_eq!(upload.block_count(), 2);
        assert_eq!(upload.table_dims, UVec2::new(2, 1));
        assert!(upload.slot(0, 0).is_some());
        assert!(upload.slot(1, 0).is_some());
        assert!(upload.slot(0, 2).is_none());
    }

    #[test]
    fn test_upload_for_empty_layer_is_empty() {
        let layer = EsdfLayer::new(0.8);
        let grid = SliceGrid::new(&Aabb::new(Vec3::ZERO, Vec3::ONE), 0.1);
        let upload = build_slice_upload(&layer, &grid, 0.5);
        assert_eq!(upload.block_count(), 0);
        assert!(upload.table.is_empty());
    }
}
