//! Shadow map generation with explicit invalidation
//!
//! Shadow maps only need regenerating when a light moves. The stage keeps a
//! snapshot of the light positions it last rendered and flips to
//! [`ShadowState::Dirty`] when any of them differs; running the stage is the
//! only way back to [`ShadowState::Valid`]. All maps are regenerated together.

use cgmath::{InnerSpace, Matrix4, Point3, SquareMatrix, Vector3};

use crate::config::{RendererConfig, MAX_LIGHTS};
use crate::error::Result;
use crate::gfx::camera::camera_utils::{self, convert_matrix4_to_array, DEPTH_BIAS_MATRIX};
use crate::gfx::rendering::backend::{CullFace, PassRecord, Program, RenderBackend, SharedBuffer};
use crate::gfx::rendering::bindings::{BindingTable, Role};
use crate::gfx::rendering::registry::{
    AttachmentPoint, BoundTarget, ResourceRegistry, TargetFormat, TargetKind, TargetSize,
};
use crate::gfx::scene::{Light, LightSet, Scene};

const LIGHT_FOVY_DEGREES: f32 = 45.0;
const LIGHT_NEAR: f32 = 1.0;
const LIGHT_FAR: f32 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowState {
    Valid,
    Dirty,
}

/// Per-light matrices produced by the last regeneration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowEntry {
    pub view_projection: Matrix4<f32>,
    /// `DEPTH_BIAS_MATRIX * view_projection`
    pub bias: Matrix4<f32>,
}

/// One entry per light, ordered like the light set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShadowMapSet {
    entries: Vec<ShadowEntry>,
}

impl ShadowMapSet {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, slot: usize) -> Option<&ShadowEntry> {
        self.entries.get(slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ShadowEntry> {
        self.entries.iter()
    }

    /// Bias matrices padded to the fixed array size of the lighting uniforms
    pub fn bias_matrices(&self) -> [[[f32; 4]; 4]; MAX_LIGHTS] {
        let mut matrices = [convert_matrix4_to_array(Matrix4::identity()); MAX_LIGHTS];
        for (slot, entry) in matrices.iter_mut().zip(&self.entries) {
            *slot = convert_matrix4_to_array(entry.bias);
        }
        matrices
    }
}

/// Light position as last rendered into its shadow map
#[derive(Debug, Clone, Copy, PartialEq)]
struct LightSnapshot {
    position: [f32; 3],
}

impl LightSnapshot {
    fn of(light: &Light) -> Self {
        Self {
            position: [light.position.x, light.position.y, light.position.z],
        }
    }

    fn differs_from(&self, other: &LightSnapshot) -> bool {
        const EPSILON: f32 = 0.001;
        self.position
            .iter()
            .zip(&other.position)
            .any(|(a, b)| (a - b).abs() > EPSILON)
    }
}

pub struct ShadowStage {
    state: ShadowState,
    maps: ShadowMapSet,
    rendered: Vec<LightSnapshot>,
    layers: Vec<BoundTarget>,
    regenerations: u64,
}

impl ShadowStage {
    /// Acquires one depth layer per light slot
    pub fn new(
        registry: &mut ResourceRegistry,
        bindings: &mut BindingTable,
        config: &RendererConfig,
    ) -> Result<Self> {
        let slots = config.max_lights.max(1) as u32;
        let handle = registry.acquire(
            "shadow maps",
            TargetKind::TextureArray { layers: slots },
            TargetSize::square(config.shadow_map_size),
            TargetFormat::Depth32,
        )?;
        let layers = (0..slots)
            .map(|layer| registry.bind_as_target(handle, AttachmentPoint::Depth, layer))
            .collect::<Result<Vec<_>>>()?;
        bindings.assign(Role::ShadowMaps, handle);

        Ok(Self {
            state: ShadowState::Dirty,
            maps: ShadowMapSet::default(),
            rendered: Vec::new(),
            layers,
            regenerations: 0,
        })
    }

    pub fn state(&self) -> ShadowState {
        self.state
    }

    pub fn maps(&self) -> &ShadowMapSet {
        &self.maps
    }

    /// Marks the maps dirty if any light moved or the light count changed
    pub fn observe_lights(&mut self, lights: &LightSet) -> ShadowState {
        let moved = lights.len() != self.rendered.len()
            || lights
                .iter()
                .zip(&self.rendered)
                .any(|(light, snapshot)| LightSnapshot::of(light).differs_from(snapshot));
        if moved {
            self.state = ShadowState::Dirty;
        }
        self.state
    }

    /// Perspective view of `center` from the light position
    pub fn light_view_projection(light: &Light, center: Point3<f32>) -> Matrix4<f32> {
        let eye = light.point();
        let direction = center - eye;
        let up = if direction.cross(Vector3::unit_y()).magnitude2() < 1e-8 {
            Vector3::unit_z()
        } else {
            Vector3::unit_y()
        };
        camera_utils::perspective(LIGHT_FOVY_DEGREES, 1.0, LIGHT_NEAR, LIGHT_FAR)
            * camera_utils::look_at(eye, center, up)
    }

    fn recompute_matrices(&mut self, scene: &Scene) {
        self.maps.entries = scene
            .lights
            .iter()
            .map(|light| {
                let view_projection = Self::light_view_projection(light, scene.center);
                ShadowEntry {
                    view_projection,
                    bias: DEPTH_BIAS_MATRIX * view_projection,
                }
            })
            .collect();
        self.rendered = scene.lights.iter().map(LightSnapshot::of).collect();
    }

    /// Regenerates every shadow map if dirty. Returns true if anything was drawn.
    pub fn run<B: RenderBackend + ?Sized>(&mut self, scene: &Scene, backend: &mut B) -> bool {
        if self.state == ShadowState::Valid {
            log::debug!("Shadow stage skipped: maps valid");
            return false;
        }

        debug_assert!(
            scene.lights.len() <= self.layers.len(),
            "{} lights but only {} shadow layers",
            scene.lights.len(),
            self.layers.len()
        );
        self.recompute_matrices(scene);
        for (slot, (entry, layer)) in self.maps.entries.iter().zip(&self.layers).enumerate() {
            let slot = slot as u32;
            backend.write_buffer(
                SharedBuffer::ShadowView(slot),
                bytemuck::bytes_of(&convert_matrix4_to_array(entry.view_projection)),
            );
            let pass = PassRecord::new(format!("shadow map {}", slot), Program::ShadowDepth)
                .with_cull(CullFace::Front)
                .with_depth(*layer, Some(1.0))
                .with_view_slot(slot)
                .draw_objects(scene.shadow_casters());
            backend.execute(&pass);
        }

        self.state = ShadowState::Valid;
        self.regenerations += 1;
        log::debug!(
            "Regenerated {} shadow map(s), regeneration #{}",
            self.maps.len(),
            self.regenerations
        );
        true
    }

    pub fn get_stats(&self) -> ShadowStageStats {
        ShadowStageStats {
            state: self.state,
            maps: self.maps.len(),
            regenerations: self.regenerations,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowStageStats {
    pub state: ShadowState,
    pub maps: usize,
    pub regenerations: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::rendering::recording::RecordingBackend;
    use crate::gfx::scene::{Material, MeshHandle, SceneObject};

    fn scene() -> Scene {
        let mut scene = Scene::new(MAX_LIGHTS);
        scene.add_object(SceneObject::new("ball", MeshHandle(0), Material::default()));
        scene.add_object(SceneObject::new("plane", MeshHandle(1), Material::default()));
        scene
            .add_light(Light::new([-1.0, 1.5, 3.0], [0.7; 3]))
            .unwrap();
        scene
            .add_light(Light::new([3.0, 3.0, -2.0], [0.7; 3]))
            .unwrap();
        scene
    }

    fn stage() -> ShadowStage {
        let mut registry = ResourceRegistry::new((800, 600), 4096);
        let mut bindings = BindingTable::new();
        ShadowStage::new(&mut registry, &mut bindings, &RendererConfig::default()).unwrap()
    }

    #[test]
    fn test_one_map_per_light() {
        let mut scene = scene();
        let mut stage = stage();
        let mut backend = RecordingBackend::default();

        stage.observe_lights(&scene.lights);
        stage.run(&scene, &mut backend);
        assert_eq!(stage.maps().len(), scene.lights.len());

        scene.add_light(Light::new([0.0, 4.0, 1.0], [0.5; 3])).unwrap();
        assert_eq!(stage.observe_lights(&scene.lights), ShadowState::Dirty);
        stage.run(&scene, &mut backend);
        assert_eq!(stage.maps().len(), 3);
        assert_eq!(backend.pass_count(Program::ShadowDepth), 5);
    }

    #[test]
    fn test_bias_is_depth_bias_times_view_projection() {
        let scene = scene();
        let mut stage = stage();
        stage.run(&scene, &mut RecordingBackend::default());

        for (light, entry) in scene.lights.iter().zip(stage.maps().iter()) {
            let expected = ShadowStage::light_view_projection(light, scene.center);
            assert_eq!(entry.view_projection, expected);
            assert_eq!(entry.bias, DEPTH_BIAS_MATRIX * expected);
        }
        let padded = stage.maps().bias_matrices();
        assert_eq!(padded[1], convert_matrix4_to_array(stage.maps().get(1).unwrap().bias));
        assert_eq!(padded[2], convert_matrix4_to_array(Matrix4::identity()));
    }

    #[test]
    fn test_valid_maps_are_not_redrawn() {
        let mut scene = scene();
        let mut stage = stage();
        let mut backend = RecordingBackend::default();

        assert!(stage.run(&scene, &mut backend));
        let draws = backend.draw_count(Program::ShadowDepth);
        assert_eq!(draws, 4);

        assert_eq!(stage.observe_lights(&scene.lights), ShadowState::Valid);
        assert!(!stage.run(&scene, &mut backend));
        assert_eq!(backend.draw_count(Program::ShadowDepth), draws);

        scene.lights.set_position(1, Point3::new(3.0, 3.5, -2.0));
        assert_eq!(stage.observe_lights(&scene.lights), ShadowState::Dirty);
        assert!(stage.run(&scene, &mut backend));
        assert_eq!(stage.get_stats().regenerations, 2);
    }

    #[test]
    fn test_sub_epsilon_motion_keeps_maps_valid() {
        let mut scene = scene();
        let mut stage = stage();
        stage.run(&scene, &mut RecordingBackend::default());
        scene.lights.set_position(0, Point3::new(-1.0, 1.5, 3.0001));
        assert_eq!(stage.observe_lights(&scene.lights), ShadowState::Valid);
    }

    #[test]
    fn test_shadow_passes_cull_front_faces() {
        let scene = scene();
        let mut stage = stage();
        let mut backend = RecordingBackend::default();
        stage.run(&scene, &mut backend);
        for (slot, pass) in backend.passes().enumerate() {
            assert_eq!(pass.cull, CullFace::Front);
            assert_eq!(pass.view_slot, Some(slot as u32));
            assert_eq!(pass.depth.map(|d| d.target.layer), Some(slot as u32));
        }
        assert_eq!(backend.writes_to(SharedBuffer::ShadowView(1)).len(), 1);
    }

    #[test]
    fn test_light_straight_above_center() {
        let light = Light::new([0.0, 5.0, 0.0], [1.0; 3]);
        let vp = ShadowStage::light_view_projection(&light, Point3::new(0.0, 0.0, 0.0));
        let m: &[f32; 16] = vp.as_ref();
        assert!(m.iter().all(|v| v.is_finite()));
    }
}
