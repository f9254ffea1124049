// src/config.rs
//! Renderer configuration
//!
//! All tunables of the pass pipeline live here: fixed target sizes, light
//! capacity, occlusion kernel parameters, shadow filtering and parallax
//! parameters. Values are plain data with builder-style setters.

use cgmath::{Point3, Vector3};
use std::path::PathBuf;

/// Maximum number of lights the shader contract supports
pub const MAX_LIGHTS: usize = 8;

/// Upper bound for the occlusion sample kernel (size of the GPU kernel array)
pub const MAX_KERNEL_SIZE: usize = 64;

/// Intermediate target drawn into the corner of the final frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugView {
    PrepassNormals,
    Occlusion,
    ShadowMap(u32),
}

/// Occlusion (SSAO) parameters
#[derive(Debug, Clone, PartialEq)]
pub struct OcclusionConfig {
    /// Number of hemisphere samples generated at startup
    pub kernel_size: usize,
    /// Number of kernel samples evaluated per pixel
    pub sample_count: u32,
    pub strength: f32,
    /// Weight applied to the range check of every sample
    pub falloff: f32,
    /// View-space search radius
    pub radius: f32,
    /// View-space depth bias against self-occlusion
    pub bias: f32,
    /// Half width of the separable box blur, in texels
    pub blur_radius: u32,
}

impl Default for OcclusionConfig {
    fn default() -> Self {
        Self {
            kernel_size: MAX_KERNEL_SIZE,
            sample_count: 32,
            strength: 1.0,
            falloff: 1.0,
            radius: 0.5,
            bias: 0.025,
            blur_radius: 2,
        }
    }
}

/// Shadow filtering parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowConfig {
    /// Samples per axis of the percentage-closer filter
    pub samples: u32,
    /// Spacing between filter taps, in shadow map texels
    pub distance: f32,
    /// Receiver depth bias
    pub depth_bias: f32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            samples: 3,
            distance: 1.0,
            depth_bias: 0.0005,
        }
    }
}

/// Main camera placement and projection
#[derive(Debug, Clone, PartialEq)]
pub struct CameraConfig {
    pub eye: Point3<f32>,
    pub center: Point3<f32>,
    pub up: Vector3<f32>,
    pub fovy_degrees: f32,
    pub near: f32,
    pub far: f32,
    /// Zoom is rejected unless the eye distance stays strictly inside this range
    pub zoom_limits: (f32, f32),
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            eye: Point3::new(-3.0, 1.5, 1.0),
            center: Point3::new(0.0, 0.0, 0.0),
            up: Vector3::unit_y(),
            fovy_degrees: 60.0,
            near: 0.1,
            far: 100.0,
            zoom_limits: (1.0, 5.0),
        }
    }
}

/// Complete renderer configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    pub shadow_map_size: u32,
    pub occlusion_size: u32,
    pub reflection_size: u32,
    pub max_lights: usize,
    pub max_texture_dimension: u32,
    pub occlusion: OcclusionConfig,
    pub shadow: ShadowConfig,
    pub camera: CameraConfig,
    pub parallax_scale: f32,
    pub parallax_bias: f32,
    pub clear_color: [f64; 4],
    /// Draw the reflective object into its own cubemap capture
    pub include_reflective_self: bool,
    /// Load `<dir>/<name>.wgsl` instead of the embedded shader sources
    pub shader_dir: Option<PathBuf>,
    pub debug_view: Option<DebugView>,
    pub animate_lights: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            shadow_map_size: 1024,
            occlusion_size: 512,
            reflection_size: 256,
            max_lights: MAX_LIGHTS,
            max_texture_dimension: 4096,
            occlusion: OcclusionConfig::default(),
            shadow: ShadowConfig::default(),
            camera: CameraConfig::default(),
            parallax_scale: 0.04,
            parallax_bias: -0.02,
            clear_color: [0.2, 0.3, 0.8, 1.0],
            include_reflective_self: false,
            shader_dir: None,
            debug_view: None,
            animate_lights: true,
        }
    }
}

impl RendererConfig {
    pub fn with_shadow_map_size(mut self, size: u32) -> Self {
        self.shadow_map_size = size;
        self
    }

    pub fn with_occlusion_size(mut self, size: u32) -> Self {
        self.occlusion_size = size;
        self
    }

    pub fn with_reflection_size(mut self, size: u32) -> Self {
        self.reflection_size = size;
        self
    }

    /// Light capacity, clamped to what the shader contract can hold
    pub fn with_max_lights(mut self, max_lights: usize) -> Self {
        if max_lights > MAX_LIGHTS {
            log::warn!(
                "Requested {} lights, clamping to the supported maximum of {}",
                max_lights,
                MAX_LIGHTS
            );
        }
        self.max_lights = max_lights.min(MAX_LIGHTS);
        self
    }

    pub fn with_max_texture_dimension(mut self, dimension: u32) -> Self {
        self.max_texture_dimension = dimension;
        self
    }

    pub fn with_occlusion(mut self, occlusion: OcclusionConfig) -> Self {
        self.occlusion = occlusion;
        self
    }

    pub fn with_shadow(mut self, shadow: ShadowConfig) -> Self {
        self.shadow = shadow;
        self
    }

    pub fn with_camera(mut self, camera: CameraConfig) -> Self {
        self.camera = camera;
        self
    }

    pub fn with_parallax(mut self, scale: f32, bias: f32) -> Self {
        self.parallax_scale = scale;
        self.parallax_bias = bias;
        self
    }

    pub fn with_clear_color(mut self, color: [f64; 4]) -> Self {
        self.clear_color = color;
        self
    }

    pub fn with_reflective_self(mut self, include: bool) -> Self {
        self.include_reflective_self = include;
        self
    }

    pub fn with_shader_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shader_dir = Some(dir.into());
        self
    }

    pub fn with_debug_view(mut self, view: Option<DebugView>) -> Self {
        self.debug_view = view;
        self
    }

    pub fn with_light_animation(mut self, animate: bool) -> Self {
        self.animate_lights = animate;
        self
    }

    /// Kernel size actually generated, never larger than the GPU array
    pub fn kernel_size(&self) -> usize {
        self.occlusion.kernel_size.clamp(1, MAX_KERNEL_SIZE)
    }

    /// Per-pixel sample count, never larger than the generated kernel
    pub fn sample_count(&self) -> u32 {
        self.occlusion
            .sample_count
            .clamp(1, self.kernel_size() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_demo_scene() {
        let config = RendererConfig::default();
        assert_eq!(config.max_lights, 8);
        assert_eq!(config.occlusion_size, 512);
        assert_eq!(config.reflection_size, 256);
        assert!(!config.include_reflective_self);
        assert_eq!(config.camera.eye, Point3::new(-3.0, 1.5, 1.0));
    }

    #[test]
    fn test_builder_clamps_light_capacity() {
        let config = RendererConfig::default().with_max_lights(32);
        assert_eq!(config.max_lights, MAX_LIGHTS);

        let config = RendererConfig::default().with_max_lights(2);
        assert_eq!(config.max_lights, 2);
    }

    #[test]
    fn test_sample_count_bounded_by_kernel() {
        let config = RendererConfig::default().with_occlusion(OcclusionConfig {
            kernel_size: 16,
            sample_count: 40,
            ..Default::default()
        });
        assert_eq!(config.kernel_size(), 16);
        assert_eq!(config.sample_count(), 16);
    }
}
