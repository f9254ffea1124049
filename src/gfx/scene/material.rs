//! Surface materials and the per-object uniform blocks derived from them

use bytemuck::{Pod, Zeroable};

/// Blinn-Phong material of one scene object
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    pub shininess: f32,
    /// Fraction of the reflection capture mixed into the final colour
    pub reflectance: f32,
}

impl Default for Material {
    /// Zeroed material; textured objects take their colour from the diffuse map
    fn default() -> Self {
        Self {
            diffuse: [0.0; 4],
            specular: [0.0; 4],
            shininess: 0.0,
            reflectance: 0.0,
        }
    }
}

impl Material {
    pub fn new(diffuse: [f32; 4], specular: [f32; 4], shininess: f32, reflectance: f32) -> Self {
        Self {
            diffuse,
            specular,
            shininess,
            reflectance,
        }
    }

    pub fn block(&self) -> MaterialBlock {
        MaterialBlock {
            diffuse: self.diffuse,
            specular: self.specular,
            shininess: self.shininess,
            reflectance: self.reflectance,
            _padding: [0.0; 2],
        }
    }
}

/// GPU layout of the material block (`@binding(3)`)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialBlock {
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    pub shininess: f32,
    pub reflectance: f32,
    pub _padding: [f32; 2],
}

/// Which optional texture slots of an object hold real textures
///
/// Unset slots are bound to fallback textures and the shader skips them
/// based on these flags.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct SurfaceFlags {
    pub diffuse_textured: u32,
    pub normal_textured: u32,
    pub height_textured: u32,
    pub _padding: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_block_layout() {
        assert_eq!(std::mem::size_of::<MaterialBlock>(), 48);
        let block = Material::new([0.0, 0.0, 0.0, 1.0], [1.0; 4], 200.0, 0.25).block();
        assert_eq!(block.shininess, 200.0);
        assert_eq!(block.reflectance, 0.25);
    }
}
