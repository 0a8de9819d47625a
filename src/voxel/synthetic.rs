//! Synthetic sphere layers for tools, benches and tests

use super::index::{voxel_center, voxel_index_from_linear, BlockIndex, VOXELS_PER_BLOCK};
use super::layer::{EsdfLayer, MeshLayer, TsdfLayer};
use super::mesh::{Color, MeshBlock};
use super::voxel::{EsdfVoxel, TsdfVoxel, TSDF_TRUNCATION_VOXELS};

/// Block indices covering a sphere plus `margin`, centered at the origin
fn covering_blocks(radius: f32, margin: f32, block_size: f32) -> impl Iterator<Item = BlockIndex> {
    let reach = ((radius + margin) / block_size).ceil() as i32;
    (-reach..reach).flat_map(move |x| {
        (-reach..reach).flat_map(move |y| (-reach..reach).map(move |z| BlockIndex::new(x, y, z)))
    })
}

/// TSDF of a sphere at the origin; voxels inside the truncation band are observed
pub fn sphere_tsdf(radius: f32, block_size: f32) -> TsdfLayer {
    let mut layer = TsdfLayer::new(block_size);
    let truncation = TSDF_TRUNCATION_VOXELS * layer.voxel_size();
    for index in covering_blocks(radius, truncation, block_size) {
        let block = layer.allocate_block(index);
        for i in 0..VOXELS_PER_BLOCK {
            let v = voxel_index_from_linear(i);
            let d = voxel_center(index, v, block_size).length() - radius;
            if d.abs() < truncation {
                block.set(v, TsdfVoxel { distance: d, weight: 1.0 });
            }
        }
    }
    layer
}

/// ESDF of a sphere at the origin, every voxel observed
pub fn sphere_esdf(radius: f32, block_size: f32) -> EsdfLayer {
    let mut layer = EsdfLayer::new(block_size);
    let voxel_size = layer.voxel_size();
    for index in covering_blocks(radius, 2.0 * block_size, block_size) {
        let block = layer.allocate_block(index);
        for i in 0..VOXELS_PER_BLOCK {
            let v = voxel_index_from_linear(i);
            let d = voxel_center(index, v, block_size).length() - radius;
            block.set(
                v,
                EsdfVoxel {
                    squared_distance_vox: (d / voxel_size).powi(2),
                    is_inside: d < 0.0,
                    observed: true,
                },
            );
        }
    }
    layer
}

/// One small tangent triangle per surface voxel of the sphere, colored by normal
pub fn sphere_mesh(radius: f32, block_size: f32) -> MeshLayer {
    let mut layer = MeshLayer::new(block_size);
    let voxel_size = layer.voxel_size();
    let half = voxel_size * 0.5;
    for index in covering_blocks(radius, voxel_size, block_size) {
        let mut block = MeshBlock::default();
        for i in 0..VOXELS_PER_BLOCK {
            let center = voxel_center(index, voxel_index_from_linear(i), block_size);
            if (center.length() - radius).abs() >= half {
                continue;
            }
            let normal = center.normalize_or_zero();
            let p = normal * radius;
            let tangent = normal.any_orthonormal_vector() * half;
            let bitangent = normal.cross(tangent);
            let color = Color::new(
                ((normal.x * 0.5 + 0.5) * 255.0) as u8,
                ((normal.y * 0.5 + 0.5) * 255.0) as u8,
                ((normal.z * 0.5 + 0.5) * 255.0) as u8,
            );
            block.push_triangle([p - tangent, p + tangent, p + bitangent], color);
        }
        if !block.is_empty() {
            layer.insert_block(index, block);
        }
    }
    layer
}
