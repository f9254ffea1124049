//! OBJ model loading

use std::path::Path;

use cgmath::{InnerSpace, Vector3};

use super::GeometryData;
use crate::error::{RenderError, Result};

/// Loads every model of an OBJ file as triangulated, single-index geometry
///
/// Missing normals are replaced by area-weighted vertex normals; missing
/// texture coordinates default to zero.
pub fn load_obj(path: impl AsRef<Path>) -> Result<Vec<GeometryData>> {
    let path = path.as_ref();
    let (models, _materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
    )
    .map_err(|err| match err {
        tobj::LoadError::OpenFileFailed => RenderError::Asset {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, err.to_string()),
        },
        other => RenderError::ModelLoad {
            path: path.to_path_buf(),
            message: other.to_string(),
        },
    })?;

    let geometry: Vec<GeometryData> = models
        .iter()
        .map(|model| from_tobj_mesh(&model.mesh))
        .collect();
    log::info!(
        "Loaded {} model(s) from {}",
        geometry.len(),
        path.display()
    );
    Ok(geometry)
}

fn from_tobj_mesh(mesh: &tobj::Mesh) -> GeometryData {
    let vertices: Vec<[f32; 3]> = mesh
        .positions
        .chunks_exact(3)
        .map(|p| [p[0], p[1], p[2]])
        .collect();

    let normals = if mesh.normals.len() == mesh.positions.len() {
        mesh.normals
            .chunks_exact(3)
            .map(|n| [n[0], n[1], n[2]])
            .collect()
    } else {
        vertex_normals(&vertices, &mesh.indices)
    };

    let tex_coords = if mesh.texcoords.len() / 2 == vertices.len() {
        mesh.texcoords.chunks_exact(2).map(|t| [t[0], t[1]]).collect()
    } else {
        vec![[0.0, 0.0]; vertices.len()]
    };

    GeometryData {
        vertices,
        tex_coords,
        normals,
        indices: mesh.indices.clone(),
    }
}

/// Area-weighted vertex normals from triangle faces
pub fn vertex_normals(vertices: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut accumulated = vec![Vector3::new(0.0f32, 0.0, 0.0); vertices.len()];
    for triangle in indices.chunks_exact(3) {
        let idx = [triangle[0] as usize, triangle[1] as usize, triangle[2] as usize];
        if idx.iter().any(|&i| i >= vertices.len()) {
            continue;
        }
        let p0 = Vector3::from(vertices[idx[0]]);
        let p1 = Vector3::from(vertices[idx[1]]);
        let p2 = Vector3::from(vertices[idx[2]]);
        let face = (p1 - p0).cross(p2 - p0);
        for i in idx {
            accumulated[i] += face;
        }
    }
    accumulated
        .into_iter()
        .map(|n| {
            if n.magnitude2() > 0.0 {
                n.normalize().into()
            } else {
                [0.0, 1.0, 0.0]
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_an_asset_error() {
        let err = load_obj("does/not/exist.obj").unwrap_err();
        assert!(matches!(err, RenderError::Asset { .. }));
        assert!(err.to_string().contains("does/not/exist.obj"));
    }

    #[test]
    fn test_vertex_normals_of_flat_triangle() {
        let vertices = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let normals = vertex_normals(&vertices, &[0, 1, 2]);
        for n in normals {
            assert_eq!(n, [0.0, 0.0, 1.0]);
        }
    }
}
