//! Map messages: distance map slices and meshes

use serde::{Deserialize, Serialize};

use crate::geometry::{ColorRgba, Index3D, Point, Point32};
use crate::sensor::Header;

/// Dense horizontal slice through a distance field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistanceMapSlice {
    pub header: Header,
    /// World position of the grid's min corner; z is the slice height
    pub origin: Point,
    /// Cell size in meters
    pub resolution: f32,
    pub width: u32,
    pub height: u32,
    /// Value written for cells with no observed data
    pub unknown_value: f32,
    /// Row-major, `width * height` values
    pub data: Vec<f32>,
}

/// Mesh geometry for a single block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshBlock {
    pub vertices: Vec<Point32>,
    pub normals: Vec<Point32>,
    pub colors: Vec<ColorRgba>,
    /// Triangle vertex indices, three per triangle
    pub triangles: Vec<i32>,
}

/// Mesh assembled from one or more blocks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub header: Header,
    pub block_size: f32,
    /// Blocks that contributed geometry, in concatenation order
    pub block_indices: Vec<Index3D>,
    pub vertices: Vec<Point32>,
    pub normals: Vec<Point32>,
    pub colors: Vec<ColorRgba>,
    /// Triangle vertex indices into the concatenated vertex array
    pub triangles: Vec<i32>,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len() / 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_json_shape() {
        let slice = DistanceMapSlice {
            header: Header::with_frame("map"),
            resolution: 0.05,
            width: 2,
            height: 1,
            unknown_value: 1000.0,
            data: vec![0.5, 1000.0],
            ..Default::default()
        };
        let json = serde_json::to_value(&slice).unwrap();
        assert_eq!(json["header"]["frame_id"], "map");
        assert_eq!(json["data"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_mesh_counts() {
        let mesh = Mesh {
            vertices: vec![Point32::default(); 4],
            triangles: vec![0, 1, 2, 1, 2, 3],
            ..Default::default()
        };
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.triangle_count(), 2);
    }
}
