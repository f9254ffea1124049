//! # Primitive Shape Generation
//!
//! Spheres, quads and the skybox cube. Shapes come with normals and texture
//! coordinates; tangents are derived later by [`GeometryData::to_vertices`].

use super::GeometryData;
use cgmath::{InnerSpace, Vector3};
use std::f32::consts::PI;

/// Generate a UV sphere centered at the origin
///
/// # Arguments
/// * `radius` - Sphere radius
/// * `rings` - Number of latitude rows of vertices (pole to pole)
/// * `sectors` - Number of longitude columns of vertices; the seam column is duplicated
pub fn generate_sphere(radius: f32, rings: u32, sectors: u32) -> GeometryData {
    let mut data = GeometryData::new();

    let rings = rings.max(3);
    let sectors = sectors.max(3);
    let ring_step = 1.0 / (rings - 1) as f32;
    let sector_step = 1.0 / (sectors - 1) as f32;

    for r in 0..rings {
        let polar = PI * r as f32 * ring_step;
        for s in 0..sectors {
            let azimuth = 2.0 * PI * s as f32 * sector_step;
            let y = (-PI / 2.0 + polar).sin();
            let x = azimuth.cos() * polar.sin();
            let z = azimuth.sin() * polar.sin();

            data.vertices.push([x * radius, y * radius, z * radius]);
            data.normals.push([x, y, z]);
            data.tex_coords.push([s as f32 * sector_step, r as f32 * ring_step]);
        }
    }

    for r in 0..rings - 1 {
        for s in 0..sectors - 1 {
            let a = r * sectors + s;
            let b = a + 1;
            let c = (r + 1) * sectors + s + 1;
            let d = (r + 1) * sectors + s;

            data.indices.extend_from_slice(&[a, c, b, a, d, c]);
        }
    }

    data
}

/// Generate a quad from four corners given counter-clockwise seen from the front
///
/// Texture coordinates run 0..`uv_repeat` along both edges so tiled textures
/// repeat across large surfaces.
pub fn generate_quad(corners: [[f32; 3]; 4], uv_repeat: f32) -> GeometryData {
    let mut data = GeometryData::new();
    let v: Vec<Vector3<f32>> = corners.iter().map(|&c| Vector3::from(c)).collect();

    for i in 0..4 {
        let next = v[(i + 1) % 4];
        let prev = v[(i + 3) % 4];
        let normal = (v[i] - next).cross(v[i] - prev);
        let normal = if normal.magnitude2() > 0.0 {
            normal.normalize()
        } else {
            Vector3::unit_y()
        };
        data.vertices.push(corners[i]);
        data.normals.push(normal.into());
    }

    data.tex_coords = vec![
        [0.0, uv_repeat],
        [uv_repeat, uv_repeat],
        [uv_repeat, 0.0],
        [0.0, 0.0],
    ];
    data.indices = vec![0, 1, 2, 0, 2, 3];

    data
}

/// Generate the unit skybox cube (corners at ±1)
///
/// Normals point inwards; the skybox samples its cubemap by position, so
/// texture coordinates are left at zero.
pub fn generate_skybox() -> GeometryData {
    let mut data = GeometryData::new();

    for i in 0..8u32 {
        let corner = [
            if i & 1 == 0 { -1.0 } else { 1.0 },
            if i & 2 == 0 { -1.0 } else { 1.0 },
            if i & 4 == 0 { -1.0 } else { 1.0 },
        ];
        let inward = -Vector3::from(corner).normalize();
        data.vertices.push(corner);
        data.normals.push(inward.into());
        data.tex_coords.push([0.0, 0.0]);
    }

    // Wound counter-clockwise seen from inside the cube
    data.indices = vec![
        1, 7, 3, 1, 5, 7, // +X
        0, 6, 4, 0, 2, 6, // -X
        2, 7, 6, 2, 3, 7, // +Y
        0, 5, 1, 0, 4, 5, // -Y
        4, 7, 5, 4, 6, 7, // +Z
        0, 3, 2, 0, 1, 3, // -Z
    ];

    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face_normal(data: &GeometryData, triangle: &[u32]) -> Vector3<f32> {
        let p = |i: u32| Vector3::from(data.vertices[i as usize]);
        (p(triangle[1]) - p(triangle[0])).cross(p(triangle[2]) - p(triangle[0]))
    }

    #[test]
    fn test_sphere_generation() {
        let sphere = generate_sphere(0.5, 32, 32);
        assert_eq!(sphere.vertex_count(), 32 * 32);
        assert_eq!(sphere.triangle_count(), 31 * 31 * 2);
        assert_eq!(sphere.vertices.len(), sphere.normals.len());
        assert_eq!(sphere.vertices.len(), sphere.tex_coords.len());
        for v in &sphere.vertices {
            let r = Vector3::from(*v).magnitude();
            assert!((r - 0.5).abs() < 1e-5);
        }
    }

    #[test]
    fn test_sphere_winds_outward() {
        let sphere = generate_sphere(1.0, 12, 12);
        for triangle in sphere.indices.chunks_exact(3) {
            let n = face_normal(&sphere, triangle);
            if n.magnitude2() < 1e-10 {
                continue; // collapsed pole triangle
            }
            let centroid = triangle
                .iter()
                .map(|&i| Vector3::from(sphere.vertices[i as usize]))
                .fold(Vector3::new(0.0, 0.0, 0.0), |acc, p| acc + p);
            assert!(n.dot(centroid) > 0.0);
        }
    }

    #[test]
    fn test_quad_faces_up() {
        let quad = generate_quad(
            [[-5.0, -0.5, 5.0], [5.0, -0.5, 5.0], [5.0, -0.5, -5.0], [-5.0, -0.5, -5.0]],
            1.0,
        );
        assert_eq!(quad.vertex_count(), 4);
        for n in &quad.normals {
            assert_eq!(*n, [0.0, 1.0, 0.0]);
        }
        for triangle in quad.indices.chunks_exact(3) {
            assert!(face_normal(&quad, triangle).y > 0.0);
        }
    }

    #[test]
    fn test_quad_tangents_follow_u() {
        let quad = generate_quad(
            [[-1.0, 0.0, 1.0], [1.0, 0.0, 1.0], [1.0, 0.0, -1.0], [-1.0, 0.0, -1.0]],
            1.0,
        );
        for tangent in quad.compute_tangents() {
            assert!((tangent[0] - 1.0).abs() < 1e-5);
            assert!(tangent[1].abs() < 1e-5);
            assert!(tangent[2].abs() < 1e-5);
        }
    }

    #[test]
    fn test_skybox_faces_inward() {
        let sky = generate_skybox();
        assert_eq!(sky.triangle_count(), 12);
        for triangle in sky.indices.chunks_exact(3) {
            let n = face_normal(&sky, triangle);
            let centroid = triangle
                .iter()
                .map(|&i| Vector3::from(sky.vertices[i as usize]))
                .fold(Vector3::new(0.0, 0.0, 0.0), |acc, p| acc + p);
            assert!(n.dot(centroid) < 0.0);
        }
    }
}
