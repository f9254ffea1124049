//! Screen-space ambient occlusion with a separable blur
//!
//! The occlusion pass writes the raw term into `occlusion`, the horizontal
//! blur reads it into `occlusion scratch`, and the vertical blur reads the
//! scratch target back into `occlusion`, which is the stage output. The two
//! blur passes only make sense in that order.

use bytemuck::{Pod, Zeroable};
use cgmath::{InnerSpace, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{RendererConfig, MAX_KERNEL_SIZE};
use crate::error::Result;
use crate::gfx::rendering::backend::{
    ColorTarget, CullFace, DrawItem, PassInputs, PassRecord, Program, RenderBackend, SharedBuffer,
};
use crate::gfx::rendering::bindings::{BindingTable, Role};
use crate::gfx::rendering::registry::{
    AttachmentPoint, BoundTarget, ResourceRegistry, TargetFormat, TargetHandle, TargetKind,
    TargetSize,
};

/// Side length of the tiled rotation noise texture
pub const NOISE_SIZE: u32 = 4;

const KERNEL_SEED: u64 = 42;
const NOISE_SEED: u64 = 12345;

/// Unoccluded clear value
const OCCLUSION_CLEAR: [f64; 4] = [1.0, 1.0, 1.0, 1.0];

/// GPU layout of the occlusion parameters
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct OcclusionParams {
    pub kernel: [[f32; 4]; MAX_KERNEL_SIZE],
    /// Target size divided by the noise size
    pub noise_scale: [f32; 2],
    pub radius: f32,
    pub strength: f32,
    pub falloff: f32,
    pub bias: f32,
    pub sample_count: u32,
    pub _padding: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BlurParams {
    pub radius: u32,
    pub _padding: [u32; 3],
}

/// Hemisphere samples around +Z, denser near the origin
pub fn generate_kernel(size: usize) -> Vec<[f32; 4]> {
    let mut rng = StdRng::seed_from_u64(KERNEL_SEED);
    (0..size)
        .map(|i| {
            let direction = Vector3::new(
                rng.random_range(-1.0..1.0f32),
                rng.random_range(-1.0..1.0f32),
                rng.random_range(0.01..1.0f32),
            )
            .normalize();
            let t = i as f32 / size as f32;
            let sample = direction * (0.1 + 0.9 * t * t);
            [sample.x, sample.y, sample.z, 0.0]
        })
        .collect()
}

/// 4x4 RGBA8 rotation vectors in the XY plane, encoded as `v * 0.5 + 0.5`
pub fn generate_noise() -> Vec<[u8; 4]> {
    let mut rng = StdRng::seed_from_u64(NOISE_SEED);
    (0..NOISE_SIZE * NOISE_SIZE)
        .map(|_| {
            let rotation = Vector3::new(
                rng.random_range(-1.0..1.0f32),
                rng.random_range(-1.0..1.0f32),
                0.0,
            )
            .normalize();
            [
                ((rotation.x * 0.5 + 0.5) * 255.0) as u8,
                ((rotation.y * 0.5 + 0.5) * 255.0) as u8,
                0,
                255,
            ]
        })
        .collect()
}

/// CPU reference of the blur the GPU passes apply
///
/// Box filter of width `2 * radius + 1` along one axis, clamping reads to the
/// edge texel.
#[derive(Debug, Clone, PartialEq)]
pub struct OcclusionField {
    pub width: usize,
    pub height: usize,
    pub values: Vec<f32>,
}

impl OcclusionField {
    pub fn filled(width: usize, height: usize, value: f32) -> Self {
        Self {
            width,
            height,
            values: vec![value; width * height],
        }
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.values[y * self.width + x]
    }

    pub fn set(&mut self, x: usize, y: usize, value: f32) {
        self.values[y * self.width + x] = value;
    }

    fn blur_axis(&self, radius: u32, horizontal: bool) -> Self {
        let r = radius as isize;
        let taps = (2 * r + 1) as f32;
        let mut out = Self::filled(self.width, self.height, 0.0);
        for y in 0..self.height {
            for x in 0..self.width {
                let mut sum = 0.0;
                for offset in -r..=r {
                    let (sx, sy) = if horizontal {
                        ((x as isize + offset).clamp(0, self.width as isize - 1) as usize, y)
                    } else {
                        (x, (y as isize + offset).clamp(0, self.height as isize - 1) as usize)
                    };
                    sum += self.get(sx, sy);
                }
                out.set(x, y, sum / taps);
            }
        }
        out
    }

    pub fn blur_horizontal(&self, radius: u32) -> Self {
        self.blur_axis(radius, true)
    }

    pub fn blur_vertical(&self, radius: u32) -> Self {
        self.blur_axis(radius, false)
    }

    /// Horizontal pass followed by the vertical pass
    pub fn blur(&self, radius: u32) -> Self {
        self.blur_horizontal(radius).blur_vertical(radius)
    }

    pub fn total(&self) -> f32 {
        self.values.iter().sum()
    }
}

pub struct OcclusionStage {
    params: OcclusionParams,
    blur: BlurParams,
    depth: TargetHandle,
    normal: TargetHandle,
    raw: BoundTarget,
    scratch: BoundTarget,
}

impl OcclusionStage {
    /// Needs the prepass roles to be assigned already
    pub fn new(
        registry: &mut ResourceRegistry,
        bindings: &mut BindingTable,
        config: &RendererConfig,
    ) -> Result<Self> {
        let depth = bindings.require(Role::PrepassDepth)?;
        let normal = bindings.require(Role::PrepassNormal)?;

        let size = TargetSize::square(config.occlusion_size);
        let raw_handle = registry.acquire("occlusion", TargetKind::Texture2d, size, TargetFormat::R8)?;
        let scratch_handle =
            registry.acquire("occlusion scratch", TargetKind::Texture2d, size, TargetFormat::R8)?;
        let raw = registry.bind_as_target(raw_handle, AttachmentPoint::Color(0), 0)?;
        let scratch = registry.bind_as_target(scratch_handle, AttachmentPoint::Color(0), 0)?;
        bindings.assign(Role::OcclusionRaw, raw_handle);
        bindings.assign(Role::OcclusionScratch, scratch_handle);

        let mut params = OcclusionParams::zeroed();
        for (slot, sample) in params.kernel.iter_mut().zip(generate_kernel(config.kernel_size())) {
            *slot = sample;
        }
        let noise_tiles = config.occlusion_size as f32 / NOISE_SIZE as f32;
        params.noise_scale = [noise_tiles, noise_tiles];
        params.radius = config.occlusion.radius;
        params.strength = config.occlusion.strength;
        params.falloff = config.occlusion.falloff;
        params.bias = config.occlusion.bias;
        params.sample_count = config.sample_count();

        Ok(Self {
            params,
            blur: BlurParams {
                radius: config.occlusion.blur_radius,
                _padding: [0; 3],
            },
            depth,
            normal,
            raw,
            scratch,
        })
    }

    pub fn params(&self) -> &OcclusionParams {
        &self.params
    }

    /// Final, blurred occlusion target
    pub fn output(&self) -> TargetHandle {
        self.raw.handle
    }

    pub fn upload_params<B: RenderBackend + ?Sized>(&self, backend: &mut B) {
        backend.write_buffer(SharedBuffer::OcclusionParams, bytemuck::bytes_of(&self.params));
        backend.write_buffer(SharedBuffer::BlurParams, bytemuck::bytes_of(&self.blur));
    }

    pub fn run<B: RenderBackend + ?Sized>(&self, backend: &mut B) {
        let occlusion = PassRecord::new("occlusion", Program::Occlusion)
            .with_cull(CullFace::None)
            .with_color(ColorTarget::Target(self.raw), Some(OCCLUSION_CLEAR))
            .with_inputs(PassInputs::Occlusion {
                depth: self.depth,
                normal: self.normal,
            })
            .draw(DrawItem::Fullscreen);
        backend.execute(&occlusion);

        let horizontal = PassRecord::new("occlusion blur horizontal", Program::BlurHorizontal)
            .with_cull(CullFace::None)
            .with_color(ColorTarget::Target(self.scratch), None)
            .with_inputs(PassInputs::Blur {
                source: self.raw.handle,
            })
            .draw(DrawItem::Fullscreen);
        backend.execute(&horizontal);

        let vertical = PassRecord::new("occlusion blur vertical", Program::BlurVertical)
            .with_cull(CullFace::None)
            .with_color(ColorTarget::Target(self.raw), None)
            .with_inputs(PassInputs::Blur {
                source: self.scratch.handle,
            })
            .draw(DrawItem::Fullscreen);
        backend.execute(&vertical);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OcclusionConfig;
    use crate::gfx::rendering::depth_prepass::DepthPrepass;
    use crate::gfx::rendering::recording::RecordingBackend;

    fn stage(config: &RendererConfig) -> (OcclusionStage, BindingTable) {
        let mut registry = ResourceRegistry::new((640, 480), 4096);
        let mut bindings = BindingTable::new();
        DepthPrepass::new(&mut registry, &mut bindings, config).unwrap();
        let stage = OcclusionStage::new(&mut registry, &mut bindings, config).unwrap();
        (stage, bindings)
    }

    #[test]
    fn test_params_layout() {
        assert_eq!(std::mem::size_of::<OcclusionParams>(), MAX_KERNEL_SIZE * 16 + 32);
        assert_eq!(std::mem::size_of::<BlurParams>(), 16);
    }

    #[test]
    fn test_kernel_is_deterministic_hemisphere() {
        let kernel = generate_kernel(64);
        assert_eq!(kernel, generate_kernel(64));
        for sample in &kernel {
            let v = Vector3::new(sample[0], sample[1], sample[2]);
            assert!(sample[2] > 0.0);
            assert!(v.magnitude() <= 1.0 + 1e-5);
            assert!(v.magnitude() >= 0.1 - 1e-5);
        }
    }

    #[test]
    fn test_noise_tile_size() {
        let noise = generate_noise();
        assert_eq!(noise.len(), 16);
        assert!(noise.iter().all(|texel| texel[2] == 0 && texel[3] == 255));
    }

    #[test]
    fn test_configured_parameters_reach_the_uniforms() {
        let config = RendererConfig::default().with_occlusion(OcclusionConfig {
            kernel_size: 16,
            sample_count: 12,
            strength: 2.0,
            radius: 0.75,
            ..Default::default()
        });
        let (stage, _) = stage(&config);
        let params = stage.params();
        assert_eq!(params.sample_count, 12);
        assert_eq!(params.strength, 2.0);
        assert_eq!(params.radius, 0.75);
        assert_ne!(params.kernel[15], [0.0; 4]);
        assert_eq!(params.kernel[16], [0.0; 4]);
    }

    #[test]
    fn test_blur_passes_ping_pong_in_order() {
        let config = RendererConfig::default();
        let (stage, bindings) = stage(&config);
        let raw = bindings.get(Role::OcclusionRaw).unwrap();
        let scratch = bindings.get(Role::OcclusionScratch).unwrap();

        let mut backend = RecordingBackend::default();
        stage.run(&mut backend);
        assert_eq!(
            backend.program_sequence(),
            vec![Program::Occlusion, Program::BlurHorizontal, Program::BlurVertical]
        );

        let passes: Vec<_> = backend.passes().collect();
        let target_of = |pass: &PassRecord| match pass.color.map(|c| c.target) {
            Some(ColorTarget::Target(bound)) => Some(bound.handle),
            _ => None,
        };
        assert_eq!(target_of(passes[0]), Some(raw));
        assert_eq!(target_of(passes[1]), Some(scratch));
        assert_eq!(passes[1].inputs, PassInputs::Blur { source: raw });
        assert_eq!(target_of(passes[2]), Some(raw));
        assert_eq!(passes[2].inputs, PassInputs::Blur { source: scratch });
        assert_eq!(stage.output(), raw);
    }

    #[test]
    fn test_constant_field_is_blur_invariant() {
        let field = OcclusionField::filled(9, 7, 0.625);
        let blurred = field.blur(2);
        for value in &blurred.values {
            assert!((value - 0.625).abs() < 1e-6);
        }
    }

    #[test]
    fn test_isolated_pixel_spreads_symmetrically() {
        let mut field = OcclusionField::filled(11, 11, 0.0);
        field.set(5, 5, 1.0);
        let blurred = field.blur(2);

        for d in 1..=2 {
            assert_eq!(blurred.get(5 - d, 5), blurred.get(5 + d, 5));
            assert_eq!(blurred.get(5, 5 - d), blurred.get(5, 5 + d));
            assert_eq!(blurred.get(5 - d, 5), blurred.get(5, 5 - d));
            assert!(blurred.get(5 + d, 5) > 0.0);
        }
        assert_eq!(blurred.get(8, 5), 0.0);
        assert!((blurred.total() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_repeated_blur_widens_the_kernel() {
        let mut field = OcclusionField::filled(15, 15, 0.0);
        field.set(7, 7, 1.0);
        let once = field.blur(1);
        let twice = once.blur(1);
        assert_eq!(once.get(9, 7), 0.0);
        assert!(twice.get(9, 7) > 0.0);
        assert_ne!(once, twice);
    }
}
