//! Per-frame sequencing of the render stages
//!
//! The host drives four callbacks. Setup happens in
//! [`FrameOrchestrator::on_context_ready`] and is the only fallible step; the
//! per-frame callbacks always run to completion. Stages execute in a fixed
//! order: shadow maps (when dirty), depth prepass, occlusion and blur,
//! reflection capture, lighting, then the optional debug surface.

use std::time::Duration;

use cgmath::Point3;

use crate::config::RendererConfig;
use crate::error::Result;
use crate::gfx::camera::{OrbitCamera, TransformState};
use crate::gfx::rendering::backend::RenderBackend;
use crate::gfx::rendering::bindings::BindingTable;
use crate::gfx::rendering::debug_surface::DebugSurface;
use crate::gfx::rendering::depth_prepass::DepthPrepass;
use crate::gfx::rendering::lighting::LightingStage;
use crate::gfx::rendering::occlusion::OcclusionStage;
use crate::gfx::rendering::reflection::ReflectionStage;
use crate::gfx::rendering::registry::ResourceRegistry;
use crate::gfx::rendering::shadow_stage::{ShadowStage, ShadowState};
use crate::gfx::scene::{LightAnimator, Scene};

/// Counters shown by the overlay
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub frame: u64,
    pub frame_time: Duration,
    pub shadow_state: ShadowState,
    pub shadow_regenerations: u64,
    pub shadow_maps_rendered: bool,
    pub reflection_captured: bool,
    pub lights: usize,
    pub objects: usize,
    pub framebuffer_size: (u32, u32),
}

pub struct FrameOrchestrator {
    config: RendererConfig,
    registry: ResourceRegistry,
    bindings: BindingTable,
    scene: Scene,
    camera: OrbitCamera,
    camera_moved: bool,
    animator: LightAnimator,
    shadow: ShadowStage,
    prepass: DepthPrepass,
    occlusion: OcclusionStage,
    reflection: ReflectionStage,
    lighting: LightingStage,
    debug: Option<DebugSurface>,
    framebuffer_size: (u32, u32),
    window_size: (u32, u32),
    stats: FrameStats,
}

impl FrameOrchestrator {
    /// Builds every stage, realises the targets and uploads the initial state
    pub fn on_context_ready<B: RenderBackend + ?Sized>(
        config: RendererConfig,
        mut scene: Scene,
        framebuffer_size: (u32, u32),
        window_size: (u32, u32),
        backend: &mut B,
    ) -> Result<Self> {
        scene.lights.set_capacity(config.max_lights)?;

        let mut registry = ResourceRegistry::new(framebuffer_size, config.max_texture_dimension);
        let mut bindings = BindingTable::new();
        let shadow = ShadowStage::new(&mut registry, &mut bindings, &config)?;
        let prepass = DepthPrepass::new(&mut registry, &mut bindings, &config)?;
        let occlusion = OcclusionStage::new(&mut registry, &mut bindings, &config)?;
        let reflection = ReflectionStage::new(&mut registry, &mut bindings, &config)?;
        let lighting = LightingStage::new(&mut registry, &mut bindings, &config)?;
        let debug = config
            .debug_view
            .map(|view| DebugSurface::new(&registry, &bindings, view))
            .transpose()?;

        backend.prepare(&registry, &scene)?;
        log::info!(
            "Renderer ready: {} targets, {} objects, {} lights, framebuffer {}x{}",
            registry.len(),
            scene.objects.len(),
            scene.lights.len(),
            framebuffer_size.0,
            framebuffer_size.1
        );

        let stats = FrameStats {
            frame: 0,
            frame_time: Duration::ZERO,
            shadow_state: shadow.state(),
            shadow_regenerations: 0,
            shadow_maps_rendered: false,
            reflection_captured: false,
            lights: scene.lights.len(),
            objects: scene.objects.len(),
            framebuffer_size,
        };

        let mut orchestrator = Self {
            camera: OrbitCamera::new(&config.camera),
            camera_moved: false,
            animator: LightAnimator::default(),
            config,
            registry,
            bindings,
            scene,
            shadow,
            prepass,
            occlusion,
            reflection,
            lighting,
            debug,
            framebuffer_size,
            window_size,
            stats,
        };

        orchestrator
            .registry
            .upload_lights(&orchestrator.scene.lights, backend);
        orchestrator
            .registry
            .upload_materials(&orchestrator.scene, backend);
        orchestrator.occlusion.upload_params(backend);
        orchestrator.lighting.upload_params(backend);
        orchestrator.update_camera(backend);
        Ok(orchestrator)
    }

    /// Recreates screen-sized targets and the projection for the new aspect
    pub fn on_resize<B: RenderBackend + ?Sized>(
        &mut self,
        framebuffer_size: (u32, u32),
        window_size: (u32, u32),
        backend: &mut B,
    ) {
        self.window_size = window_size;
        if framebuffer_size.0 == 0 || framebuffer_size.1 == 0 {
            log::debug!("Ignoring resize to empty framebuffer");
            return;
        }
        self.framebuffer_size = framebuffer_size;
        self.stats.framebuffer_size = framebuffer_size;

        let resized = self.registry.resize_screen_targets(framebuffer_size);
        if !resized.is_empty() {
            backend.targets_resized(&self.registry, &resized);
        }
        if let Some(debug) = self.debug.as_mut() {
            debug.set_screen_size(framebuffer_size);
        }
        self.update_camera(backend);
    }

    /// Animates lights, applies camera moves and tracks shadow invalidation
    pub fn on_update<B: RenderBackend + ?Sized>(
        &mut self,
        now: f32,
        elapsed: Duration,
        backend: &mut B,
    ) {
        self.stats.frame_time = elapsed;

        if self.config.animate_lights {
            self.animator.animate(&mut self.scene.lights, now);
        }
        if self.registry.shared.lights != self.scene.lights.block() {
            self.registry.upload_lights(&self.scene.lights, backend);
        }
        self.stats.shadow_state = self.shadow.observe_lights(&self.scene.lights);

        if self.camera_moved {
            self.camera_moved = false;
            self.update_camera(backend);
        }
    }

    /// Issues every pass of the frame in dependency order
    pub fn on_render<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) {
        let shadows_rendered = self.shadow.run(&self.scene, backend);
        if shadows_rendered {
            self.lighting.set_shadow_bias(self.shadow.maps(), backend);
        }

        self.prepass
            .run(&self.scene, &mut self.registry.shared.transform, backend);
        self.occlusion.run(backend);
        let captured = self
            .reflection
            .run(&self.scene, &mut self.registry.shared.transform, backend);
        self.lighting.run(&self.scene, backend);
        if let Some(debug) = &self.debug {
            debug.run(backend);
        }

        let stats = self.shadow.get_stats();
        self.stats.frame += 1;
        self.stats.shadow_state = stats.state;
        self.stats.shadow_regenerations = stats.regenerations;
        self.stats.shadow_maps_rendered = shadows_rendered;
        self.stats.reflection_captured = captured;
        self.stats.lights = self.scene.lights.len();
    }

    /// Applies `f` to the orbit camera; the transform is refreshed on the
    /// next update if `f` reports a change
    pub fn move_camera(&mut self, f: impl FnOnce(&mut OrbitCamera) -> bool) -> bool {
        let moved = f(&mut self.camera);
        self.camera_moved |= moved;
        moved
    }

    pub fn set_camera_eye(&mut self, eye: Point3<f32>) {
        self.move_camera(|camera| {
            camera.eye = eye - camera.center;
            true
        });
    }

    fn update_camera<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) {
        let camera = &self.config.camera;
        let aspect = self.framebuffer_size.0 as f32 / self.framebuffer_size.1.max(1) as f32;
        let transform = &mut self.registry.shared.transform;
        transform.look_at(self.camera.eye_position(), self.camera.center, self.camera.up);
        transform.perspective(camera.fovy_degrees, aspect, camera.near, camera.far);
        transform.upload(backend);
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Mutable scene access for light edits
    ///
    /// The light set is capped at the configured light capacity. Moved, added
    /// or removed lights reach the lights block and the shadow maps on the
    /// next update.
    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn camera(&self) -> &OrbitCamera {
        &self.camera
    }

    pub fn transform(&self) -> &TransformState {
        &self.registry.shared.transform
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    pub fn shadow_stage(&self) -> &ShadowStage {
        &self.shadow
    }

    pub fn lighting_stage(&self) -> &LightingStage {
        &self.lighting
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn framebuffer_size(&self) -> (u32, u32) {
        self.framebuffer_size
    }

    pub fn window_size(&self) -> (u32, u32) {
        self.window_size
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DebugView;
    use crate::error::RenderError;
    use crate::gfx::camera::camera_utils;
    use crate::gfx::rendering::backend::{Program, SharedBuffer};
    use crate::gfx::rendering::recording::{Command, RecordingBackend};
    use crate::gfx::scene::{Light, Material, MeshHandle, SceneObject, Skybox, TextureHandle};
    use cgmath::Vector3;

    fn demo_scene() -> Scene {
        let mut scene = Scene::new(8);
        let ball = scene.add_object(
            SceneObject::new("ball", MeshHandle(0), Material::new([0.0, 0.0, 0.0, 1.0], [1.0; 4], 200.0, 0.25))
                .with_diffuse_texture(TextureHandle(0)),
        );
        scene.add_object(
            SceneObject::new("plane", MeshHandle(1), Material::default())
                .with_diffuse_texture(TextureHandle(1))
                .with_normal_texture(TextureHandle(2)),
        );
        scene.set_reflective(ball).unwrap();
        scene.set_skybox(Skybox {
            mesh: MeshHandle(2),
            cubemap: TextureHandle(3),
        });
        scene.add_light(Light::new([-1.0, 1.5, 3.0], [0.7; 3])).unwrap();
        scene.add_light(Light::new([3.0, 3.0, -2.0], [0.7; 3])).unwrap();
        scene
    }

    fn ready(config: RendererConfig) -> (FrameOrchestrator, RecordingBackend) {
        let mut backend = RecordingBackend::default();
        let orchestrator =
            FrameOrchestrator::on_context_ready(config, demo_scene(), (800, 600), (800, 600), &mut backend)
                .unwrap();
        (orchestrator, backend)
    }

    fn static_config() -> RendererConfig {
        RendererConfig::default().with_light_animation(false)
    }

    #[test]
    fn test_setup_prepares_backend_and_uploads_shared_state() {
        let (orchestrator, backend) = ready(static_config());
        assert!(matches!(
            backend.commands()[0],
            Command::Prepare { objects: 2, .. }
        ));
        assert_eq!(backend.writes_to(SharedBuffer::Lights).len(), 1);
        assert_eq!(backend.writes_to(SharedBuffer::Material(0)).len(), 1);
        assert_eq!(backend.writes_to(SharedBuffer::Material(1)).len(), 1);
        assert_eq!(backend.transform_writes().len(), 1);
        assert_eq!(orchestrator.stats().lights, 2);
    }

    #[test]
    fn test_too_many_lights_fail_setup() {
        let mut backend = RecordingBackend::default();
        let result = FrameOrchestrator::on_context_ready(
            RendererConfig::default().with_max_lights(1),
            demo_scene(),
            (800, 600),
            (800, 600),
            &mut backend,
        );
        assert!(matches!(result, Err(RenderError::LightCapacity { capacity: 1 })));
    }

    #[test]
    fn test_stage_order_within_a_frame() {
        let (mut orchestrator, mut backend) = ready(static_config());
        backend.clear();
        orchestrator.on_update(0.0, Duration::from_millis(16), &mut backend);
        orchestrator.on_render(&mut backend);

        let mut expected = vec![Program::ShadowDepth; 2];
        expected.extend([
            Program::DepthNormal,
            Program::Occlusion,
            Program::BlurHorizontal,
            Program::BlurVertical,
        ]);
        expected.extend([Program::Lighting; 7]);
        assert_eq!(backend.program_sequence(), expected);

        let last = backend.passes().last().unwrap();
        assert_eq!(last.label, "lighting");
    }

    #[test]
    fn test_shadow_pass_skipped_while_lights_are_still() {
        let (mut orchestrator, mut backend) = ready(static_config());
        for frame in 0..3 {
            orchestrator.on_update(frame as f32, Duration::from_millis(16), &mut backend);
            orchestrator.on_render(&mut backend);
        }
        assert_eq!(backend.pass_count(Program::ShadowDepth), 2);
        assert_eq!(backend.draw_count(Program::ShadowDepth), 4);
        assert_eq!(orchestrator.stats().shadow_regenerations, 1);
        assert!(!orchestrator.stats().shadow_maps_rendered);
    }

    #[test]
    fn test_animated_light_regenerates_every_map() {
        let (mut orchestrator, mut backend) = ready(RendererConfig::default());
        orchestrator.on_update(0.0, Duration::ZERO, &mut backend);
        orchestrator.on_render(&mut backend);
        orchestrator.on_update(1.0, Duration::ZERO, &mut backend);
        assert_eq!(orchestrator.stats().shadow_state, ShadowState::Dirty);
        orchestrator.on_render(&mut backend);

        assert_eq!(backend.pass_count(Program::ShadowDepth), 4);
        assert_eq!(orchestrator.shadow_stage().maps().len(), 2);
        assert_eq!(
            orchestrator.lighting_stage().params().shadow_bias,
            orchestrator.shadow_stage().maps().bias_matrices()
        );
    }

    #[test]
    fn test_moved_light_reaches_lights_block() {
        let (mut orchestrator, mut backend) = ready(static_config());
        orchestrator.on_update(0.0, Duration::ZERO, &mut backend);
        orchestrator.on_render(&mut backend);
        assert_eq!(backend.writes_to(SharedBuffer::Lights).len(), 1);

        assert!(orchestrator
            .scene_mut()
            .lights
            .set_position(1, Point3::new(0.0, 4.0, 0.0)));
        orchestrator.on_update(1.0, Duration::ZERO, &mut backend);
        orchestrator.on_render(&mut backend);

        let writes = backend.writes_to(SharedBuffer::Lights);
        assert_eq!(writes.len(), 2);
        let block = orchestrator.scene().lights.block();
        assert_eq!(writes[1], bytemuck::bytes_of(&block).to_vec());
        assert_eq!(block.lights[1].position, [0.0, 4.0, 0.0, 1.0]);
        assert_eq!(orchestrator.stats().shadow_regenerations, 2);

        orchestrator.on_update(2.0, Duration::ZERO, &mut backend);
        assert_eq!(backend.writes_to(SharedBuffer::Lights).len(), 2);
    }

    #[test]
    fn test_light_count_changes_reach_block_and_shadow_passes() {
        let (mut orchestrator, mut backend) = ready(static_config());
        orchestrator.on_update(0.0, Duration::ZERO, &mut backend);
        orchestrator.on_render(&mut backend);

        orchestrator
            .scene_mut()
            .add_light(Light::new([0.0, 4.0, 1.0], [0.5; 3]))
            .unwrap();
        backend.clear();
        orchestrator.on_update(1.0, Duration::ZERO, &mut backend);
        orchestrator.on_render(&mut backend);
        assert_eq!(backend.pass_count(Program::ShadowDepth), 3);
        assert_eq!(orchestrator.shadow_stage().maps().len(), 3);
        assert_eq!(orchestrator.registry().shared.lights.count, 3);
        assert_eq!(backend.writes_to(SharedBuffer::Lights).len(), 1);

        orchestrator.scene_mut().lights.remove(0);
        backend.clear();
        orchestrator.on_update(2.0, Duration::ZERO, &mut backend);
        orchestrator.on_render(&mut backend);
        assert_eq!(backend.pass_count(Program::ShadowDepth), 2);
        assert_eq!(orchestrator.registry().shared.lights.count, 2);
        assert_eq!(orchestrator.stats().lights, 2);
    }

    #[test]
    fn test_adding_past_configured_capacity_fails() {
        let (mut orchestrator, mut backend) = ready(static_config().with_max_lights(2));
        let result = orchestrator
            .scene_mut()
            .add_light(Light::new([0.0, 4.0, 1.0], [0.5; 3]));
        assert!(matches!(result, Err(RenderError::LightCapacity { capacity: 2 })));

        orchestrator.on_update(0.0, Duration::ZERO, &mut backend);
        orchestrator.on_render(&mut backend);
        assert_eq!(orchestrator.scene().lights.len(), 2);
        assert_eq!(orchestrator.shadow_stage().maps().len(), 2);
        assert_eq!(backend.pass_count(Program::ShadowDepth), 2);
    }

    #[test]
    fn test_transform_is_identical_across_still_frames() {
        let (mut orchestrator, mut backend) = ready(static_config());
        let mut frame_writes = Vec::new();
        for _ in 0..2 {
            backend.clear();
            orchestrator.on_update(0.0, Duration::ZERO, &mut backend);
            orchestrator.on_render(&mut backend);
            frame_writes.push(backend.transform_writes());
        }
        assert_eq!(frame_writes[0], frame_writes[1]);
        assert!(!frame_writes[0].is_empty());
    }

    #[test]
    fn test_reflection_leaves_main_camera_in_place() {
        let (mut orchestrator, mut backend) = ready(static_config());
        backend.clear();
        orchestrator.on_update(0.0, Duration::ZERO, &mut backend);
        orchestrator.on_render(&mut backend);

        let prepass_state = *orchestrator.transform();
        let writes = backend.transform_writes();
        // prepass, six faces, restore
        assert_eq!(writes.len(), 8);
        assert_eq!(writes[0], writes[7]);
        assert_eq!(writes[7], bytemuck::bytes_of(&prepass_state.block()).to_vec());
    }

    #[test]
    fn test_resize_updates_projection_aspect() {
        let (mut orchestrator, mut backend) = ready(static_config());
        orchestrator.on_resize((1920, 1080), (960, 540), &mut backend);

        let camera = &orchestrator.config().camera;
        let expected_projection =
            camera_utils::perspective(camera.fovy_degrees, 1920.0 / 1080.0, camera.near, camera.far);
        let expected_view = camera_utils::look_at(
            orchestrator.camera().eye_position(),
            camera.center,
            camera.up,
        );
        let transform = orchestrator.transform();
        assert_eq!(transform.projection, expected_projection);
        assert_eq!(
            transform.model_view_projection,
            expected_projection * expected_view
        );

        let resized = backend.commands().iter().any(|command| {
            matches!(command, Command::Resize(handles) if handles.len() == 1)
        });
        assert!(resized);
        assert_eq!(orchestrator.window_size(), (960, 540));
    }

    #[test]
    fn test_camera_moves_apply_on_update() {
        let (mut orchestrator, mut backend) = ready(static_config());
        let before = orchestrator.transform().view;
        assert!(orchestrator.move_camera(|camera| {
            camera.camera_left(10.0);
            true
        }));
        assert_eq!(orchestrator.transform().view, before);

        orchestrator.on_update(0.0, Duration::ZERO, &mut backend);
        assert_ne!(orchestrator.transform().view, before);

        orchestrator.set_camera_eye(Point3::new(0.0, 2.0, 3.0));
        orchestrator.on_update(0.0, Duration::ZERO, &mut backend);
        assert_eq!(
            orchestrator.transform().view,
            camera_utils::look_at(Point3::new(0.0, 2.0, 3.0), Point3::new(0.0, 0.0, 0.0), Vector3::unit_y())
        );
    }

    #[test]
    fn test_debug_surface_draws_after_lighting() {
        let (mut orchestrator, mut backend) =
            ready(static_config().with_debug_view(Some(DebugView::Occlusion)));
        backend.clear();
        orchestrator.on_render(&mut backend);
        assert_eq!(backend.program_sequence().last(), Some(&Program::DebugSurface));
    }
}
