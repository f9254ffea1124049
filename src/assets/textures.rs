use std::f32::consts::TAU;
use std::path::Path;

use cgmath::{InnerSpace, Vector3};

use crate::error::{RenderError, Result};

/// Tightly packed RGBA8 pixels, top row first
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl ImageData {
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> [u8; 4]) -> Self {
        let mut pixels = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&f(x, y));
            }
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * self.width + x) * 4) as usize;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Decodes a PNG or JPEG file into RGBA8
pub fn load_image(path: impl AsRef<Path>) -> Result<ImageData> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| RenderError::Asset {
        path: path.to_path_buf(),
        source,
    })?;
    let image = image::load_from_memory(&bytes).map_err(|err| RenderError::ImageDecode {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    let rgba = image.to_rgba8();
    log::info!(
        "Decoded {} ({}x{})",
        path.display(),
        rgba.width(),
        rgba.height()
    );
    Ok(ImageData {
        width: rgba.width(),
        height: rgba.height(),
        pixels: rgba.into_raw(),
    })
}

/// Two-colour checkerboard with `cells` squares per side
pub fn checker(size: u32, cells: u32, a: [u8; 4], b: [u8; 4]) -> ImageData {
    let cell = (size / cells.max(1)).max(1);
    ImageData::from_fn(size, size, |x, y| {
        if (x / cell + y / cell) % 2 == 0 {
            a
        } else {
            b
        }
    })
}

fn bump_height(u: f32, v: f32, bumps: f32) -> f32 {
    0.5 + 0.5 * (TAU * bumps * u).sin() * (TAU * bumps * v).sin()
}

fn encode_unit(value: f32) -> u8 {
    ((value * 0.5 + 0.5).clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Tangent-space normal map and matching height map of a grid of round bumps
///
/// Returns `(normal, height)`. Normals are derived from the height field by
/// central differences and encoded as `n * 0.5 + 0.5`.
pub fn bump_maps(size: u32, bumps: u32, depth: f32) -> (ImageData, ImageData) {
    let bumps = bumps.max(1) as f32;
    let step = 1.0 / size as f32;
    let at = |x: u32, y: u32| ((x as f32 + 0.5) * step, (y as f32 + 0.5) * step);

    let height = ImageData::from_fn(size, size, |x, y| {
        let (u, v) = at(x, y);
        let h = (bump_height(u, v, bumps) * 255.0).round() as u8;
        [h, h, h, 255]
    });

    let normal = ImageData::from_fn(size, size, |x, y| {
        let (u, v) = at(x, y);
        let du = (bump_height(u + step, v, bumps) - bump_height(u - step, v, bumps)) / (2.0 * step);
        let dv = (bump_height(u, v + step, bumps) - bump_height(u, v - step, bumps)) / (2.0 * step);
        let n = Vector3::new(-du * depth, -dv * depth, 1.0).normalize();
        [encode_unit(n.x), encode_unit(n.y), encode_unit(n.z), 255]
    });

    (normal, height)
}

/// Direction through texel `(sc, tc)` of a cube face, in +X, -X, +Y, -Y, +Z, -Z order
pub fn cube_face_direction(face: usize, sc: f32, tc: f32) -> Vector3<f32> {
    let direction = match face {
        0 => Vector3::new(1.0, -tc, -sc),
        1 => Vector3::new(-1.0, -tc, sc),
        2 => Vector3::new(sc, 1.0, tc),
        3 => Vector3::new(sc, -1.0, -tc),
        4 => Vector3::new(sc, -tc, 1.0),
        _ => Vector3::new(-sc, -tc, -1.0),
    };
    direction.normalize()
}

/// Six faces of a sky gradient: zenith blue fading to a pale horizon over brown ground
pub fn sky_faces(size: u32) -> [ImageData; 6] {
    let zenith = Vector3::new(0.15, 0.35, 0.85);
    let horizon = Vector3::new(0.75, 0.85, 0.95);
    let ground = Vector3::new(0.35, 0.28, 0.2);

    std::array::from_fn(|face| {
        ImageData::from_fn(size, size, |x, y| {
            let sc = 2.0 * (x as f32 + 0.5) / size as f32 - 1.0;
            let tc = 2.0 * (y as f32 + 0.5) / size as f32 - 1.0;
            let up = cube_face_direction(face, sc, tc).y;
            let color = if up >= 0.0 {
                horizon + (zenith - horizon) * up.sqrt()
            } else {
                horizon + (ground - horizon) * (-up * 4.0).min(1.0)
            };
            [
                (color.x * 255.0) as u8,
                (color.y * 255.0) as u8,
                (color.z * 255.0) as u8,
                255,
            ]
        })
    })
}
