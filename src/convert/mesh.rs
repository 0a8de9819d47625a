//! Mesh layer to Mesh message concatenation

use glam::Vec3;
use layercast_msgs::{ColorRgba, Index3D, Mesh, MeshBlock as MeshBlockMsg, Point32};

use super::selector::select_blocks;
use crate::voxel::index::BlockIndex;
use crate::voxel::layer::MeshLayer;
use crate::voxel::mesh::{Color, MeshBlock};

pub fn point_message_from_vector(v: Vec3) -> Point32 {
    Point32::new(v.x, v.y, v.z)
}

/// 8-bit color to a normalized RGBA message, fully opaque
pub fn color_message_from_color(color: Color) -> ColorRgba {
    ColorRgba {
        r: color.r as f32 / 255.0,
        g: color.g as f32 / 255.0,
        b: color.b as f32 / 255.0,
        a: 1.0,
    }
}

pub fn index3d_message_from_index(index: BlockIndex) -> Index3D {
    index.into()
}

/// Append `block` to the flat arrays of `mesh`, shifting its triangle
/// indices by the vertices already present. Short normal or color arrays
/// are padded so all per-vertex arrays stay aligned.
fn append_block(mesh: &mut Mesh, block: &MeshBlock) {
    let offset = mesh.vertices.len() as i32;
    let n = block.vertices.len();

    mesh.vertices.extend(block.vertices.iter().copied().map(point_message_from_vector));
    mesh.normals.extend(
        (0..n).map(|i| point_message_from_vector(block.normals.get(i).copied().unwrap_or(Vec3::ZERO))),
    );
    mesh.colors.extend(
        (0..n).map(|i| color_message_from_color(block.colors.get(i).copied().unwrap_or(Color::GRAY))),
    );
    mesh.triangles.extend(block.triangles.iter().map(|t| t + offset));
}

/// Concatenate the blocks at `indices`. Unallocated and empty blocks are skipped.
pub fn mesh_message_from_mesh_blocks(layer: &MeshLayer, indices: &[BlockIndex]) -> Mesh {
    let mut mesh = Mesh {
        block_size: layer.block_size(),
        ..Default::default()
    };
    for index in indices {
        let Some(block) = layer.get_block_at_index(*index) else {
            log::trace!("Mesh block {:?} not allocated, skipping", index);
            continue;
        };
        if block.is_empty() {
            continue;
        }
        append_block(&mut mesh, block);
        mesh.block_indices.push(index3d_message_from_index(*index));
    }
    log::debug!(
        "Mesh message: {} blocks, {} vertices, {} triangles",
        mesh.block_indices.len(),
        mesh.vertex_count(),
        mesh.triangle_count()
    );
    mesh
}

/// Concatenate every allocated block, in sorted index order
pub fn mesh_message_from_mesh_layer(layer: &MeshLayer) -> Mesh {
    mesh_message_from_mesh_blocks(layer, &select_blocks(layer, None))
}

/// One block as a message, triangle indices left block-local
pub fn mesh_block_message_from_mesh_block(block: &MeshBlock) -> MeshBlockMsg {
    let mut mesh = Mesh::default();
    append_block(&mut mesh, block);
    MeshBlockMsg {
        vertices: mesh.vertices,
        normals: mesh.normals,
        colors: mesh.colors,
        triangles: mesh.triangles,
    }
}
