use cgmath::Point3;

use super::{
    light::{Light, LightSet},
    material::{Material, SurfaceFlags},
};
use crate::error::{RenderError, Result};

/// Index of an object in [`Scene::objects`]
pub type ObjectId = usize;

/// Opaque handle to an uploaded, immutable mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub u32);

/// Opaque handle to a decoded, uploaded texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

/// One drawable object
#[derive(Debug, Clone)]
pub struct SceneObject {
    pub name: String,
    pub mesh: MeshHandle,
    pub material: Material,
    pub diffuse_texture: Option<TextureHandle>,
    pub normal_texture: Option<TextureHandle>,
    pub height_texture: Option<TextureHandle>,
    pub casts_shadow: bool,
    /// World-space center, used as the capture point when the object is reflective
    pub center: Point3<f32>,
}

impl SceneObject {
    pub fn new(name: &str, mesh: MeshHandle, material: Material) -> Self {
        Self {
            name: name.to_string(),
            mesh,
            material,
            diffuse_texture: None,
            normal_texture: None,
            height_texture: None,
            casts_shadow: true,
            center: Point3::new(0.0, 0.0, 0.0),
        }
    }

    pub fn with_diffuse_texture(mut self, texture: TextureHandle) -> Self {
        self.diffuse_texture = Some(texture);
        self
    }

    pub fn with_normal_texture(mut self, texture: TextureHandle) -> Self {
        self.normal_texture = Some(texture);
        self
    }

    pub fn with_height_texture(mut self, texture: TextureHandle) -> Self {
        self.height_texture = Some(texture);
        self
    }

    pub fn with_center(mut self, center: Point3<f32>) -> Self {
        self.center = center;
        self
    }

    pub fn with_shadow(mut self, casts_shadow: bool) -> Self {
        self.casts_shadow = casts_shadow;
        self
    }

    pub fn surface_flags(&self) -> SurfaceFlags {
        SurfaceFlags {
            diffuse_textured: self.diffuse_texture.is_some() as u32,
            normal_textured: self.normal_texture.is_some() as u32,
            height_textured: self.height_texture.is_some() as u32,
            _padding: 0,
        }
    }
}

/// Sky cube drawn behind everything else
#[derive(Debug, Clone, Copy)]
pub struct Skybox {
    pub mesh: MeshHandle,
    pub cubemap: TextureHandle,
}

/// Fixed set of objects and lights rendered every frame
///
/// Objects are created once at startup; only light positions and the camera
/// change while the renderer runs.
#[derive(Debug, Clone)]
pub struct Scene {
    pub objects: Vec<SceneObject>,
    pub lights: LightSet,
    pub reflective: Option<ObjectId>,
    pub skybox: Option<Skybox>,
    /// Point every shadow-casting light looks at
    pub center: Point3<f32>,
}

impl Scene {
    pub fn new(light_capacity: usize) -> Self {
        Self {
            objects: Vec::new(),
            lights: LightSet::new(light_capacity),
            reflective: None,
            skybox: None,
            center: Point3::new(0.0, 0.0, 0.0),
        }
    }

    pub fn add_object(&mut self, object: SceneObject) -> ObjectId {
        self.objects.push(object);
        self.objects.len() - 1
    }

    pub fn add_light(&mut self, light: Light) -> Result<usize> {
        self.lights.push(light)
    }

    /// Marks the object whose surroundings are captured into the cubemap
    pub fn set_reflective(&mut self, id: ObjectId) -> Result<()> {
        if id >= self.objects.len() {
            return Err(RenderError::UnknownObject(id));
        }
        self.reflective = Some(id);
        Ok(())
    }

    pub fn set_skybox(&mut self, skybox: Skybox) {
        self.skybox = Some(skybox);
    }

    pub fn object(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.get(id)
    }

    pub fn shadow_casters(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.objects
            .iter()
            .enumerate()
            .filter(|(_, object)| object.casts_shadow)
            .map(|(id, _)| id)
    }

    pub fn object_ids(&self) -> std::ops::Range<ObjectId> {
        0..self.objects.len()
    }
}
