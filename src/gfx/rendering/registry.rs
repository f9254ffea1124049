//! Resource registry: render targets and the shared uniform blocks
//!
//! Targets are described here and realised by the backend. Every target is
//! validated the moment it is acquired, and again when it is bound to an
//! attachment point, so an unusable target stops initialization instead of
//! surfacing as a broken frame.

use crate::error::{RenderError, Result};
use crate::gfx::camera::TransformState;
use crate::gfx::rendering::backend::{RenderBackend, SharedBuffer};
use crate::gfx::scene::{LightSet, LightsBlock, MaterialBlock, Scene};

/// Maximum array layers of a layered target
pub const MAX_ARRAY_LAYERS: u32 = 256;

/// Stable handle to a registry target; handles are never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetHandle(u32);

impl TargetHandle {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Texture2d,
    TextureArray { layers: u32 },
    Cubemap,
    /// Attachment-only storage that is never sampled
    RenderBuffer,
}

impl TargetKind {
    pub fn layers(&self) -> u32 {
        match self {
            TargetKind::Texture2d | TargetKind::RenderBuffer => 1,
            TargetKind::TextureArray { layers } => *layers,
            TargetKind::Cubemap => 6,
        }
    }

    pub fn is_sampled(&self) -> bool {
        !matches!(self, TargetKind::RenderBuffer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSize {
    Fixed { width: u32, height: u32 },
    /// Follows the framebuffer; recreated on resize
    Screen,
}

impl TargetSize {
    pub fn square(size: u32) -> Self {
        TargetSize::Fixed {
            width: size,
            height: size,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    Depth32,
    Rgba8,
    Rgba16Float,
    R8,
}

impl TargetFormat {
    pub fn is_depth(&self) -> bool {
        matches!(self, TargetFormat::Depth32)
    }

    pub fn wgpu(&self) -> wgpu::TextureFormat {
        match self {
            TargetFormat::Depth32 => wgpu::TextureFormat::Depth32Float,
            TargetFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
            TargetFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            TargetFormat::R8 => wgpu::TextureFormat::R8Unorm,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentPoint {
    Color(u32),
    Depth,
}

/// A validated (target, attachment point, layer) selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundTarget {
    pub handle: TargetHandle,
    pub attachment: AttachmentPoint,
    pub layer: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetDesc {
    pub label: String,
    pub kind: TargetKind,
    pub size: TargetSize,
    pub format: TargetFormat,
    /// Current width and height in texels
    pub extent: (u32, u32),
}

/// CPU copies of the three shared uniform blocks
#[derive(Debug, Clone)]
pub struct SharedBlocks {
    pub transform: TransformState,
    pub lights: LightsBlock,
    pub materials: Vec<MaterialBlock>,
}

pub struct ResourceRegistry {
    targets: Vec<TargetDesc>,
    screen_size: (u32, u32),
    max_dimension: u32,
    pub shared: SharedBlocks,
}

impl ResourceRegistry {
    pub fn new(screen_size: (u32, u32), max_dimension: u32) -> Self {
        Self {
            targets: Vec::new(),
            screen_size,
            max_dimension,
            shared: SharedBlocks {
                transform: TransformState::default(),
                lights: LightSet::new(0).block(),
                materials: Vec::new(),
            },
        }
    }

    /// Describes a new target and runs its completeness check
    pub fn acquire(
        &mut self,
        label: &str,
        kind: TargetKind,
        size: TargetSize,
        format: TargetFormat,
    ) -> Result<TargetHandle> {
        let extent = match size {
            TargetSize::Fixed { width, height } => (width, height),
            TargetSize::Screen => self.screen_size,
        };
        let desc = TargetDesc {
            label: label.to_string(),
            kind,
            size,
            format,
            extent,
        };
        self.check_complete(&desc)?;

        let handle = TargetHandle(self.targets.len() as u32);
        log::debug!(
            "Acquired target '{}' {:?} {}x{} {:?} as {:?}",
            label,
            kind,
            extent.0,
            extent.1,
            format,
            handle
        );
        self.targets.push(desc);
        Ok(handle)
    }

    fn check_complete(&self, desc: &TargetDesc) -> Result<()> {
        let (width, height) = desc.extent;
        if width == 0 || height == 0 {
            return Err(RenderError::incomplete(
                &desc.label,
                format!("zero-sized extent {}x{}", width, height),
            ));
        }
        if width > self.max_dimension || height > self.max_dimension {
            return Err(RenderError::incomplete(
                &desc.label,
                format!(
                    "extent {}x{} exceeds the device limit of {}",
                    width, height, self.max_dimension
                ),
            ));
        }
        match desc.kind {
            TargetKind::Cubemap if width != height => Err(RenderError::incomplete(
                &desc.label,
                format!("cube faces must be square, got {}x{}", width, height),
            )),
            TargetKind::Cubemap if desc.size == TargetSize::Screen => Err(RenderError::incomplete(
                &desc.label,
                "cubemaps cannot follow the screen size",
            )),
            TargetKind::TextureArray { layers } if layers == 0 || layers > MAX_ARRAY_LAYERS => {
                Err(RenderError::incomplete(
                    &desc.label,
                    format!("array layer count {} outside 1..={}", layers, MAX_ARRAY_LAYERS),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Selects a target layer as an attachment for subsequent passes
    pub fn bind_as_target(
        &self,
        handle: TargetHandle,
        attachment: AttachmentPoint,
        layer: u32,
    ) -> Result<BoundTarget> {
        let desc = self.desc(handle)?;
        match attachment {
            AttachmentPoint::Color(_) if desc.format.is_depth() => {
                return Err(RenderError::incomplete(
                    &desc.label,
                    "depth format cannot be a colour attachment",
                ));
            }
            AttachmentPoint::Depth if !desc.format.is_depth() => {
                return Err(RenderError::incomplete(
                    &desc.label,
                    "colour format cannot be a depth attachment",
                ));
            }
            _ => {}
        }
        if layer >= desc.kind.layers() {
            return Err(RenderError::incomplete(
                &desc.label,
                format!("layer {} out of range ({} layers)", layer, desc.kind.layers()),
            ));
        }
        Ok(BoundTarget {
            handle,
            attachment,
            layer,
        })
    }

    /// Checks that a colour and depth selection can be used together
    pub fn check_attachments(&self, color: &BoundTarget, depth: &BoundTarget) -> Result<()> {
        let color_desc = self.desc(color.handle)?;
        let depth_desc = self.desc(depth.handle)?;
        if color_desc.extent != depth_desc.extent {
            return Err(RenderError::incomplete(
                &color_desc.label,
                format!(
                    "attachment extents differ: {:?} vs '{}' {:?}",
                    color_desc.extent, depth_desc.label, depth_desc.extent
                ),
            ));
        }
        Ok(())
    }

    pub fn desc(&self, handle: TargetHandle) -> Result<&TargetDesc> {
        self.targets
            .get(handle.index())
            .ok_or(RenderError::UnknownTarget(handle.0))
    }

    pub fn extent(&self, handle: TargetHandle) -> Option<(u32, u32)> {
        self.targets.get(handle.index()).map(|desc| desc.extent)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TargetHandle, &TargetDesc)> {
        self.targets
            .iter()
            .enumerate()
            .map(|(i, desc)| (TargetHandle(i as u32), desc))
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn screen_size(&self) -> (u32, u32) {
        self.screen_size
    }

    /// Updates screen-sized targets. Fixed-size targets are untouched.
    /// Returns the handles whose storage must be recreated.
    pub fn resize_screen_targets(&mut self, size: (u32, u32)) -> Vec<TargetHandle> {
        if size.0 == 0 || size.1 == 0 || size == self.screen_size {
            return Vec::new();
        }
        self.screen_size = size;
        let mut resized = Vec::new();
        for (i, desc) in self.targets.iter_mut().enumerate() {
            if desc.size == TargetSize::Screen {
                desc.extent = size;
                resized.push(TargetHandle(i as u32));
            }
        }
        resized
    }

    /// Uploads the lights block
    pub fn upload_lights<B: RenderBackend + ?Sized>(&mut self, lights: &LightSet, backend: &mut B) {
        self.shared.lights = lights.block();
        backend.write_buffer(SharedBuffer::Lights, bytemuck::bytes_of(&self.shared.lights));
    }

    /// Uploads one material block per scene object
    pub fn upload_materials<B: RenderBackend + ?Sized>(&mut self, scene: &Scene, backend: &mut B) {
        self.shared.materials = scene.objects.iter().map(|o| o.material.block()).collect();
        for (id, block) in self.shared.materials.iter().enumerate() {
            backend.write_buffer(SharedBuffer::Material(id), bytemuck::bytes_of(block));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ResourceRegistry {
        ResourceRegistry::new((800, 600), 4096)
    }

    #[test]
    fn test_handles_are_stable_and_distinct() {
        let mut registry = registry();
        let a = registry
            .acquire("a", TargetKind::Texture2d, TargetSize::square(64), TargetFormat::R8)
            .unwrap();
        let b = registry
            .acquire("b", TargetKind::Texture2d, TargetSize::square(64), TargetFormat::R8)
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(registry.desc(a).unwrap().label, "a");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_zero_sized_target_fails_fast() {
        let mut registry = registry();
        let err = registry
            .acquire("empty", TargetKind::Texture2d, TargetSize::square(0), TargetFormat::Rgba8)
            .unwrap_err();
        assert!(matches!(err, RenderError::IncompleteTarget { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cubemap_must_be_square() {
        let mut registry = registry();
        let err = registry
            .acquire(
                "cube",
                TargetKind::Cubemap,
                TargetSize::Fixed {
                    width: 256,
                    height: 128,
                },
                TargetFormat::Rgba8,
            )
            .unwrap_err();
        assert!(err.to_string().contains("square"));
    }

    #[test]
    fn test_oversized_target_is_incomplete() {
        let mut registry = registry();
        assert!(registry
            .acquire("huge", TargetKind::Texture2d, TargetSize::square(8192), TargetFormat::R8)
            .is_err());
    }

    #[test]
    fn test_bind_rejects_mismatched_attachment() {
        let mut registry = registry();
        let depth = registry
            .acquire("depth", TargetKind::RenderBuffer, TargetSize::Screen, TargetFormat::Depth32)
            .unwrap();
        let color = registry
            .acquire("color", TargetKind::Texture2d, TargetSize::Screen, TargetFormat::Rgba8)
            .unwrap();
        assert!(registry
            .bind_as_target(depth, AttachmentPoint::Color(0), 0)
            .is_err());
        assert!(registry
            .bind_as_target(color, AttachmentPoint::Depth, 0)
            .is_err());
        assert!(registry.bind_as_target(depth, AttachmentPoint::Depth, 0).is_ok());
    }

    #[test]
    fn test_bind_checks_layer_range() {
        let mut registry = registry();
        let cube = registry
            .acquire("cube", TargetKind::Cubemap, TargetSize::square(256), TargetFormat::Rgba8)
            .unwrap();
        assert!(registry
            .bind_as_target(cube, AttachmentPoint::Color(0), 5)
            .is_ok());
        assert!(registry
            .bind_as_target(cube, AttachmentPoint::Color(0), 6)
            .is_err());
    }

    #[test]
    fn test_resize_touches_screen_targets_only() {
        let mut registry = registry();
        let fixed = registry
            .acquire("shadow", TargetKind::TextureArray { layers: 2 }, TargetSize::square(1024), TargetFormat::Depth32)
            .unwrap();
        let screen = registry
            .acquire("screen depth", TargetKind::RenderBuffer, TargetSize::Screen, TargetFormat::Depth32)
            .unwrap();

        let resized = registry.resize_screen_targets((1920, 1080));
        assert_eq!(resized, vec![screen]);
        assert_eq!(registry.extent(screen), Some((1920, 1080)));
        assert_eq!(registry.extent(fixed), Some((1024, 1024)));

        assert!(registry.resize_screen_targets((0, 0)).is_empty());
        assert_eq!(registry.extent(screen), Some((1920, 1080)));
    }

    #[test]
    fn test_unknown_handle() {
        let registry = registry();
        assert!(matches!(
            registry.desc(TargetHandle(3)),
            Err(RenderError::UnknownTarget(3))
        ));
    }
}
