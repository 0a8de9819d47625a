//! Per-block mesh geometry

use glam::Vec3;

/// 8-bit RGB color
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const GRAY: Color = Color { r: 128, g: 128, b: 128 };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Mesh extracted for one block. Triangle indices are block-local.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshBlock {
    pub vertices: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub colors: Vec<Color>,
    /// Three vertex indices per triangle
    pub triangles: Vec<i32>,
}

impl MeshBlock {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Append a triangle with its own three vertices
    pub fn push_triangle(&mut self, corners: [Vec3; 3], color: Color) {
        let base = self.vertices.len() as i32;
        let normal = (corners[1] - corners[0]).cross(corners[2] - corners[0]).normalize_or_zero();
        for corner in corners {
            self.vertices.push(corner);
            self.normals.push(normal);
            self.colors.push(color);
        }
        self.triangles.extend_from_slice(&[base, base + 1, base + 2]);
    }
}
