//! # Procedural Geometry Generation
//!
//! Meshes for the renderer's scene objects: UV spheres, quads, the skybox
//! cube, and OBJ models loaded through `tobj`. Everything is produced as
//! [`GeometryData`] and turned into [`Vertex3D`]s (with tangents) before
//! upload.
//!
//! ## Usage
//!
//! ```rust
//! use lightpass::gfx::geometry::{generate_quad, generate_sphere};
//!
//! let ball = generate_sphere(0.5, 32, 32);
//! let floor = generate_quad(
//!     [[-5.0, -0.5, 5.0], [5.0, -0.5, 5.0], [5.0, -0.5, -5.0], [-5.0, -0.5, -5.0]],
//!     4.0,
//! );
//! assert_eq!(floor.triangle_count(), 2);
//! assert!(ball.vertex_count() > 0);
//! ```

pub mod model;
pub mod primitives;

pub use model::load_obj;
pub use primitives::*;

use crate::gfx::scene::vertex::Vertex3D;
use cgmath::{InnerSpace, Vector2, Vector3};

/// Represents generated geometry data ready for GPU upload
#[derive(Debug, Clone, Default)]
pub struct GeometryData {
    /// Vertex positions (x, y, z)
    pub vertices: Vec<[f32; 3]>,
    /// Texture coordinates (u, v)
    pub tex_coords: Vec<[f32; 2]>,
    /// Normal vectors (x, y, z)
    pub normals: Vec<[f32; 3]>,
    /// Triangle indices (counter-clockwise winding seen from outside)
    pub indices: Vec<u32>,
}

impl GeometryData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Per-vertex tangents derived from texture coordinate gradients.
    ///
    /// `w` holds the bitangent handedness. Vertices whose triangles have
    /// degenerate UVs get an arbitrary tangent orthogonal to the normal.
    pub fn compute_tangents(&self) -> Vec<[f32; 4]> {
        let count = self.vertices.len();
        let mut tangents = vec![Vector3::new(0.0f32, 0.0, 0.0); count];
        let mut bitangents = vec![Vector3::new(0.0f32, 0.0, 0.0); count];

        let position = |i: usize| Vector3::from(self.vertices[i]);
        let uv = |i: usize| Vector2::from(self.tex_coords.get(i).copied().unwrap_or([0.0, 0.0]));

        for triangle in self.indices.chunks_exact(3) {
            let [i0, i1, i2] = [triangle[0] as usize, triangle[1] as usize, triangle[2] as usize];
            if i0 >= count || i1 >= count || i2 >= count {
                continue;
            }
            let e1 = position(i1) - position(i0);
            let e2 = position(i2) - position(i0);
            let d1 = uv(i1) - uv(i0);
            let d2 = uv(i2) - uv(i0);
            let r = d1.x * d2.y - d2.x * d1.y;
            if r.abs() < 1e-12 {
                continue;
            }
            let tangent = (e1 * d2.y - e2 * d1.y) / r;
            let bitangent = (e2 * d1.x - e1 * d2.x) / r;
            for &i in &[i0, i1, i2] {
                tangents[i] += tangent;
                bitangents[i] += bitangent;
            }
        }

        (0..count)
            .map(|i| {
                let normal = Vector3::from(self.normals.get(i).copied().unwrap_or([0.0, 1.0, 0.0]));
                let t = tangents[i] - normal * normal.dot(tangents[i]);
                let t = if t.magnitude2() > 1e-12 {
                    t.normalize()
                } else {
                    any_perpendicular(normal)
                };
                let handedness = if normal.cross(t).dot(bitangents[i]) < 0.0 {
                    -1.0
                } else {
                    1.0
                };
                [t.x, t.y, t.z, handedness]
            })
            .collect()
    }

    /// Interleaves the attribute streams into the GPU vertex format
    pub fn to_vertices(&self) -> Vec<Vertex3D> {
        let tangents = self.compute_tangents();
        (0..self.vertices.len())
            .map(|i| Vertex3D {
                position: self.vertices[i],
                normal: self.normals.get(i).copied().unwrap_or([0.0, 1.0, 0.0]),
                tex_coord: self.tex_coords.get(i).copied().unwrap_or([0.0, 0.0]),
                tangent: tangents[i],
            })
            .collect()
    }
}

fn any_perpendicular(normal: Vector3<f32>) -> Vector3<f32> {
    let axis = if normal.x.abs() < 0.9 {
        Vector3::unit_x()
    } else {
        Vector3::unit_y()
    };
    let t = axis - normal * normal.dot(axis);
    if t.magnitude2() > 1e-12 {
        t.normalize()
    } else {
        Vector3::unit_x()
    }
}
