//! Draws an intermediate target into a corner of the final frame

use crate::config::DebugView;
use crate::error::{RenderError, Result};
use crate::gfx::rendering::backend::{
    ColorTarget, CullFace, DrawItem, PassInputs, PassRecord, Program, RenderBackend, Viewport,
};
use crate::gfx::rendering::bindings::{BindingTable, Role};
use crate::gfx::rendering::registry::{ResourceRegistry, TargetHandle};

pub struct DebugSurface {
    source: TargetHandle,
    program: Program,
    layer: u32,
    screen_size: (u32, u32),
}

impl DebugSurface {
    pub fn new(
        registry: &ResourceRegistry,
        bindings: &BindingTable,
        view: DebugView,
    ) -> Result<Self> {
        let (role, program, layer) = match view {
            DebugView::PrepassNormals => (Role::PrepassNormal, Program::DebugSurface, 0),
            DebugView::Occlusion => (Role::OcclusionRaw, Program::DebugSurface, 0),
            DebugView::ShadowMap(layer) => (Role::ShadowMaps, Program::DebugDepth, layer),
        };
        let source = bindings.require(role)?;
        let desc = registry.desc(source)?;
        if layer >= desc.kind.layers() {
            return Err(RenderError::incomplete(
                &desc.label,
                format!("debug view of layer {} out of range", layer),
            ));
        }
        log::info!("Debug surface showing '{}' layer {}", desc.label, layer);

        Ok(Self {
            source,
            program,
            layer,
            screen_size: registry.screen_size(),
        })
    }

    pub fn set_screen_size(&mut self, size: (u32, u32)) {
        self.screen_size = size;
    }

    /// Bottom-left rectangle, a quarter of the frame in each direction
    pub fn viewport(&self) -> Viewport {
        let (width, height) = (self.screen_size.0 as f32, self.screen_size.1 as f32);
        Viewport {
            x: 0.0,
            y: height - height / 4.0,
            width: width / 4.0,
            height: height / 4.0,
        }
    }

    pub fn run<B: RenderBackend + ?Sized>(&self, backend: &mut B) {
        let pass = PassRecord::new("debug surface", self.program)
            .with_cull(CullFace::None)
            .with_color(ColorTarget::Surface, None)
            .with_inputs(PassInputs::Debug {
                source: self.source,
                layer: self.layer,
            })
            .with_viewport(self.viewport())
            .draw(DrawItem::Fullscreen);
        backend.execute(&pass);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RendererConfig;
    use crate::gfx::rendering::recording::RecordingBackend;
    use crate::gfx::rendering::shadow_stage::ShadowStage;

    #[test]
    fn test_viewport_is_bottom_left_quarter() {
        let mut registry = ResourceRegistry::new((800, 600), 4096);
        let mut bindings = BindingTable::new();
        ShadowStage::new(&mut registry, &mut bindings, &RendererConfig::default()).unwrap();
        let mut debug = DebugSurface::new(&registry, &bindings, DebugView::ShadowMap(1)).unwrap();

        assert_eq!(
            debug.viewport(),
            Viewport {
                x: 0.0,
                y: 450.0,
                width: 200.0,
                height: 150.0
            }
        );
        debug.set_screen_size((400, 400));
        assert_eq!(debug.viewport().y, 300.0);

        let mut backend = RecordingBackend::default();
        debug.run(&mut backend);
        let pass = backend.passes().next().unwrap();
        assert_eq!(pass.program, Program::DebugDepth);
        assert_eq!(pass.color.and_then(|c| c.clear), None);
    }

    #[test]
    fn test_out_of_range_layer_is_rejected() {
        let mut registry = ResourceRegistry::new((800, 600), 4096);
        let mut bindings = BindingTable::new();
        ShadowStage::new(&mut registry, &mut bindings, &RendererConfig::default()).unwrap();
        assert!(DebugSurface::new(&registry, &bindings, DebugView::ShadowMap(8)).is_err());
        assert!(DebugSurface::new(&registry, &bindings, DebugView::Occlusion).is_err());
    }
}
