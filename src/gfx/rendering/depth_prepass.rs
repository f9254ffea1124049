//! Camera-space depth and normal prepass
//!
//! Renders the scene from the main camera into fixed-size offscreen targets
//! read by the occlusion stage, and stores the texture-space projection of the
//! current view in the transform block for the lighting stage.

use crate::config::RendererConfig;
use crate::error::Result;
use crate::gfx::camera::TransformState;
use crate::gfx::rendering::backend::{
    ColorTarget, CullFace, PassRecord, Program, RenderBackend,
};
use crate::gfx::rendering::bindings::{BindingTable, Role};
use crate::gfx::rendering::registry::{
    AttachmentPoint, BoundTarget, ResourceRegistry, TargetFormat, TargetKind, TargetSize,
};
use crate::gfx::scene::Scene;

/// Normal target clear value: zero length marks "no geometry"
const NORMAL_CLEAR: [f64; 4] = [0.0, 0.0, 0.0, 0.0];

pub struct DepthPrepass {
    depth: BoundTarget,
    normal: BoundTarget,
}

impl DepthPrepass {
    pub fn new(
        registry: &mut ResourceRegistry,
        bindings: &mut BindingTable,
        config: &RendererConfig,
    ) -> Result<Self> {
        let size = TargetSize::square(config.occlusion_size);
        let depth_handle =
            registry.acquire("prepass depth", TargetKind::Texture2d, size, TargetFormat::Depth32)?;
        let normal_handle = registry.acquire(
            "prepass normal",
            TargetKind::Texture2d,
            size,
            TargetFormat::Rgba16Float,
        )?;

        let depth = registry.bind_as_target(depth_handle, AttachmentPoint::Depth, 0)?;
        let normal = registry.bind_as_target(normal_handle, AttachmentPoint::Color(0), 0)?;
        registry.check_attachments(&normal, &depth)?;

        bindings.assign(Role::PrepassDepth, depth_handle);
        bindings.assign(Role::PrepassNormal, normal_handle);
        Ok(Self { depth, normal })
    }

    pub fn run<B: RenderBackend + ?Sized>(
        &self,
        scene: &Scene,
        transform: &mut TransformState,
        backend: &mut B,
    ) {
        transform.update_depth_bias();
        transform.upload(backend);

        let pass = PassRecord::new("depth prepass", Program::DepthNormal)
            .with_cull(CullFace::Back)
            .with_color(ColorTarget::Target(self.normal), Some(NORMAL_CLEAR))
            .with_depth(self.depth, Some(1.0))
            .draw_objects(scene.object_ids());
        backend.execute(&pass);
    }
}
