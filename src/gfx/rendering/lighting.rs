//! Final compositing pass
//!
//! Draws every scene object with its material and textures, sampling the
//! shadow maps, the blurred occlusion target and, for the reflective object,
//! the reflection cubemap. Runs last in the frame.

use bytemuck::{Pod, Zeroable};

use crate::config::{RendererConfig, MAX_LIGHTS};
use crate::error::Result;
use crate::gfx::rendering::backend::{
    ColorTarget, CullFace, DrawItem, PassInputs, PassRecord, Program, RenderBackend, SharedBuffer,
};
use crate::gfx::rendering::bindings::{BindingTable, Role};
use crate::gfx::rendering::registry::{
    AttachmentPoint, BoundTarget, ResourceRegistry, TargetFormat, TargetHandle, TargetKind,
    TargetSize,
};
use crate::gfx::rendering::shadow_stage::ShadowMapSet;
use crate::gfx::scene::Scene;

/// GPU layout of the lighting parameters (frame group, binding 4)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightingParams {
    pub shadow_bias: [[[f32; 4]; 4]; MAX_LIGHTS],
    /// Filter taps per axis
    pub shadow_samples: u32,
    /// Tap spacing in shadow map texels
    pub shadow_distance: f32,
    pub depth_bias: f32,
    pub parallax_scale: f32,
    pub parallax_bias: f32,
    pub shadow_map_size: f32,
    pub _padding: [f32; 2],
}

/// Per-pass switches for optional inputs (shared group, binding 15)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct PassFlags {
    pub occlusion_enabled: u32,
    pub reflection_enabled: u32,
    pub _padding: [u32; 2],
}

impl PassFlags {
    pub fn new(occlusion: bool, reflection: bool) -> Self {
        Self {
            occlusion_enabled: occlusion as u32,
            reflection_enabled: reflection as u32,
            _padding: [0; 2],
        }
    }
}

pub struct LightingStage {
    params: LightingParams,
    depth: BoundTarget,
    shadow_maps: TargetHandle,
    occlusion: TargetHandle,
    reflection: TargetHandle,
    clear_color: [f64; 4],
}

impl LightingStage {
    /// Needs the shadow, occlusion and reflection roles to be assigned
    pub fn new(
        registry: &mut ResourceRegistry,
        bindings: &mut BindingTable,
        config: &RendererConfig,
    ) -> Result<Self> {
        let shadow_maps = bindings.require(Role::ShadowMaps)?;
        let occlusion = bindings.require(Role::OcclusionRaw)?;
        let reflection = bindings.require(Role::ReflectionCube)?;

        let depth = registry.acquire(
            "screen depth",
            TargetKind::RenderBuffer,
            TargetSize::Screen,
            TargetFormat::Depth32,
        )?;
        let depth = registry.bind_as_target(depth, AttachmentPoint::Depth, 0)?;
        bindings.assign(Role::ScreenDepth, depth.handle);

        let mut params = LightingParams::zeroed();
        params.shadow_bias = ShadowMapSet::default().bias_matrices();
        params.shadow_samples = config.shadow.samples.max(1);
        params.shadow_distance = config.shadow.distance;
        params.depth_bias = config.shadow.depth_bias;
        params.parallax_scale = config.parallax_scale;
        params.parallax_bias = config.parallax_bias;
        params.shadow_map_size = config.shadow_map_size as f32;

        Ok(Self {
            params,
            depth,
            shadow_maps,
            occlusion,
            reflection,
            clear_color: config.clear_color,
        })
    }

    pub fn params(&self) -> &LightingParams {
        &self.params
    }

    pub fn upload_params<B: RenderBackend + ?Sized>(&self, backend: &mut B) {
        backend.write_buffer(SharedBuffer::LightingParams, bytemuck::bytes_of(&self.params));
    }

    /// Takes the bias matrices of freshly regenerated shadow maps
    pub fn set_shadow_bias<B: RenderBackend + ?Sized>(&mut self, maps: &ShadowMapSet, backend: &mut B) {
        self.params.shadow_bias = maps.bias_matrices();
        self.upload_params(backend);
    }

    pub fn run<B: RenderBackend + ?Sized>(&self, scene: &Scene, backend: &mut B) {
        let mut pass = PassRecord::new("lighting", Program::Lighting)
            .with_cull(CullFace::Back)
            .with_color(ColorTarget::Surface, Some(self.clear_color))
            .with_depth(self.depth, Some(1.0))
            .with_inputs(PassInputs::Lighting {
                shadow_maps: self.shadow_maps,
                occlusion: Some(self.occlusion),
                reflection: scene.reflective.map(|_| self.reflection),
            })
            .draw_objects(scene.object_ids());
        if scene.skybox.is_some() {
            pass = pass.draw(DrawItem::Skybox);
        }
        backend.execute(&pass);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::rendering::depth_prepass::DepthPrepass;
    use crate::gfx::rendering::occlusion::OcclusionStage;
    use crate::gfx::rendering::recording::RecordingBackend;
    use crate::gfx::rendering::reflection::ReflectionStage;
    use crate::gfx::rendering::shadow_stage::ShadowStage;
    use crate::gfx::scene::{Light, Material, MeshHandle, SceneObject, Skybox, TextureHandle};

    fn build(config: &RendererConfig) -> (ShadowStage, LightingStage) {
        let mut registry = ResourceRegistry::new((640, 480), 4096);
        let mut bindings = BindingTable::new();
        let shadow = ShadowStage::new(&mut registry, &mut bindings, config).unwrap();
        DepthPrepass::new(&mut registry, &mut bindings, config).unwrap();
        OcclusionStage::new(&mut registry, &mut bindings, config).unwrap();
        ReflectionStage::new(&mut registry, &mut bindings, config).unwrap();
        let lighting = LightingStage::new(&mut registry, &mut bindings, config).unwrap();
        (shadow, lighting)
    }

    #[test]
    fn test_params_layout() {
        assert_eq!(std::mem::size_of::<LightingParams>(), MAX_LIGHTS * 64 + 32);
        assert_eq!(std::mem::size_of::<PassFlags>(), 16);
    }

    #[test]
    fn test_lighting_requires_upstream_roles() {
        let mut registry = ResourceRegistry::new((640, 480), 4096);
        let mut bindings = BindingTable::new();
        assert!(LightingStage::new(&mut registry, &mut bindings, &RendererConfig::default()).is_err());
    }

    #[test]
    fn test_shadow_bias_flows_into_params() {
        let (mut shadow, mut lighting) = build(&RendererConfig::default());
        let mut scene = Scene::new(8);
        scene.add_object(SceneObject::new("plane", MeshHandle(0), Material::default()));
        scene.add_light(Light::new([3.0, 3.0, -2.0], [0.7; 3])).unwrap();

        let mut backend = RecordingBackend::default();
        shadow.run(&scene, &mut backend);
        lighting.set_shadow_bias(shadow.maps(), &mut backend);

        assert_eq!(lighting.params().shadow_bias, shadow.maps().bias_matrices());
        assert_eq!(
            backend.last_write(SharedBuffer::LightingParams),
            Some(bytemuck::bytes_of(lighting.params()).to_vec())
        );
    }

    #[test]
    fn test_pass_draws_every_object_then_sky() {
        let (_, lighting) = build(&RendererConfig::default());
        let mut scene = Scene::new(8);
        let ball = scene.add_object(SceneObject::new("ball", MeshHandle(0), Material::default()));
        scene.add_object(SceneObject::new("plane", MeshHandle(1), Material::default()));
        scene.set_reflective(ball).unwrap();
        scene.set_skybox(Skybox {
            mesh: MeshHandle(2),
            cubemap: TextureHandle(0),
        });

        let mut backend = RecordingBackend::default();
        lighting.run(&scene, &mut backend);
        let pass = backend.passes().next().unwrap();
        assert_eq!(
            pass.draws,
            vec![DrawItem::Object(0), DrawItem::Object(1), DrawItem::Skybox]
        );
        assert!(matches!(pass.color.map(|c| c.target), Some(ColorTarget::Surface)));
        match pass.inputs {
            PassInputs::Lighting { occlusion, reflection, .. } => {
                assert!(occlusion.is_some());
                assert!(reflection.is_some());
            }
            other => panic!("unexpected inputs {:?}", other),
        }
    }
}
