//! Pass records and the backend seam
//!
//! Stages never talk to wgpu directly. Each stage describes its work as a
//! sequence of [`PassRecord`]s and shared-buffer writes against a
//! [`RenderBackend`]. Writes and passes are applied in call order: a write
//! issued between two passes is visible to the second pass only.

use crate::error::Result;
use crate::gfx::rendering::registry::{BoundTarget, ResourceRegistry, TargetHandle};
use crate::gfx::scene::{ObjectId, Scene};

/// Uniform buffers addressed by stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SharedBuffer {
    Transform,
    Lights,
    Material(ObjectId),
    LightingParams,
    OcclusionParams,
    BlurParams,
    /// Light view-projection used while rendering one shadow layer
    ShadowView(u32),
}

/// Shader programs known to the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Program {
    ShadowDepth,
    DepthNormal,
    Occlusion,
    BlurHorizontal,
    BlurVertical,
    Lighting,
    Skybox,
    DebugSurface,
    DebugDepth,
}

impl Program {
    pub const ALL: [Program; 9] = [
        Program::ShadowDepth,
        Program::DepthNormal,
        Program::Occlusion,
        Program::BlurHorizontal,
        Program::BlurVertical,
        Program::Lighting,
        Program::Skybox,
        Program::DebugSurface,
        Program::DebugDepth,
    ];

    /// Name of the shader asset the program is built from
    pub fn shader(&self) -> &'static str {
        match self {
            Program::ShadowDepth => "shadow_depth",
            Program::DepthNormal => "depth_normal",
            Program::Occlusion => "occlusion",
            Program::BlurHorizontal | Program::BlurVertical => "blur",
            Program::Lighting => "lighting",
            Program::Skybox => "skybox",
            Program::DebugSurface => "debug",
            Program::DebugDepth => "debug_depth",
        }
    }

    /// Fragment entry point, `None` for depth-only programs
    pub fn fragment_entry(&self) -> Option<&'static str> {
        match self {
            Program::ShadowDepth => None,
            Program::BlurHorizontal => Some("fs_horizontal"),
            Program::BlurVertical => Some("fs_vertical"),
            _ => Some("fs_main"),
        }
    }

    /// Programs that consume scene vertex buffers; the rest draw a fullscreen triangle
    pub fn uses_meshes(&self) -> bool {
        matches!(
            self,
            Program::ShadowDepth | Program::DepthNormal | Program::Lighting | Program::Skybox
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullFace {
    #[default]
    Back,
    Front,
    None,
}

impl CullFace {
    pub fn face(&self) -> Option<wgpu::Face> {
        match self {
            CullFace::Back => Some(wgpu::Face::Back),
            CullFace::Front => Some(wgpu::Face::Front),
            CullFace::None => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColorTarget {
    /// The presentation surface of the current frame
    Surface,
    Target(BoundTarget),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAttachment {
    pub target: ColorTarget,
    /// `None` keeps the existing contents
    pub clear: Option<[f64; 4]>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthAttachment {
    pub target: BoundTarget,
    pub clear: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Sampled resources a pass reads, resolved by the backend into bind groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassInputs {
    None,
    Occlusion {
        depth: TargetHandle,
        normal: TargetHandle,
    },
    Blur {
        source: TargetHandle,
    },
    Lighting {
        shadow_maps: TargetHandle,
        occlusion: Option<TargetHandle>,
        reflection: Option<TargetHandle>,
    },
    Debug {
        source: TargetHandle,
        layer: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawItem {
    /// Indexed draw of one scene object with its material
    Object(ObjectId),
    /// The scene's sky cube, drawn behind everything else
    Skybox,
    /// Screen-covering triangle for image-space programs
    Fullscreen,
}

/// One render pass: attachments, program, inputs and an ordered draw list
#[derive(Debug, Clone, PartialEq)]
pub struct PassRecord {
    pub label: String,
    pub program: Program,
    pub cull: CullFace,
    pub color: Option<ColorAttachment>,
    pub depth: Option<DepthAttachment>,
    /// Slot of [`SharedBuffer::ShadowView`] bound for this pass
    pub view_slot: Option<u32>,
    pub inputs: PassInputs,
    pub viewport: Option<Viewport>,
    pub draws: Vec<DrawItem>,
}

impl PassRecord {
    pub fn new(label: impl Into<String>, program: Program) -> Self {
        Self {
            label: label.into(),
            program,
            cull: CullFace::Back,
            color: None,
            depth: None,
            view_slot: None,
            inputs: PassInputs::None,
            viewport: None,
            draws: Vec::new(),
        }
    }

    pub fn with_cull(mut self, cull: CullFace) -> Self {
        self.cull = cull;
        self
    }

    pub fn with_color(mut self, target: ColorTarget, clear: Option<[f64; 4]>) -> Self {
        self.color = Some(ColorAttachment { target, clear });
        self
    }

    pub fn with_depth(mut self, target: BoundTarget, clear: Option<f32>) -> Self {
        self.depth = Some(DepthAttachment { target, clear });
        self
    }

    pub fn with_view_slot(mut self, slot: u32) -> Self {
        self.view_slot = Some(slot);
        self
    }

    pub fn with_inputs(mut self, inputs: PassInputs) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = Some(viewport);
        self
    }

    pub fn draw(mut self, item: DrawItem) -> Self {
        self.draws.push(item);
        self
    }

    pub fn draw_objects(mut self, objects: impl IntoIterator<Item = ObjectId>) -> Self {
        self.draws.extend(objects.into_iter().map(DrawItem::Object));
        self
    }

    pub fn object_draws(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.draws.iter().filter_map(|item| match item {
            DrawItem::Object(id) => Some(*id),
            _ => None,
        })
    }
}

/// Executes stage output on some device
pub trait RenderBackend {
    /// Realises registry targets and uploads per-object state for `scene`
    fn prepare(&mut self, _registry: &ResourceRegistry, _scene: &Scene) -> Result<()> {
        Ok(())
    }

    /// Replaces the contents of a shared buffer
    fn write_buffer(&mut self, buffer: SharedBuffer, bytes: &[u8]);

    /// Records one pass after every previously issued write and pass
    fn execute(&mut self, pass: &PassRecord);

    /// Screen-sized targets listed in `handles` changed extent
    fn targets_resized(&mut self, _registry: &ResourceRegistry, _handles: &[TargetHandle]) {}
}
