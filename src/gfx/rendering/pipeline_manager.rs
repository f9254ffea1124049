//! Render pipeline management for wgpu
//!
//! Compiles shader modules inside validation error scopes, keeps one pipeline
//! layout per program and caches pipelines by program, cull mode and colour
//! format.

use std::{collections::HashMap, sync::Arc};
use wgpu::*;

use crate::error::{RenderError, Result};
use crate::gfx::rendering::backend::{CullFace, Program};
use crate::gfx::resources::TextureResource;
use crate::gfx::scene::Vertex3D;

/// Everything that distinguishes two pipelines of the same program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub program: Program,
    pub cull: CullFace,
    /// `None` for depth-only programs
    pub color_format: Option<TextureFormat>,
}

impl PipelineKey {
    pub fn new(program: Program, cull: CullFace, color_format: Option<TextureFormat>) -> Self {
        Self {
            program,
            cull,
            color_format,
        }
    }

    fn label(&self) -> String {
        format!("{:?} {:?} {:?}", self.program, self.cull, self.color_format)
    }
}

/// Depth test state of a program, `None` for image-space programs
fn depth_state(program: Program) -> Option<DepthStencilState> {
    let (write, compare) = match program {
        Program::ShadowDepth | Program::DepthNormal | Program::Lighting => {
            (true, CompareFunction::Less)
        }
        Program::Skybox => (false, CompareFunction::LessEqual),
        _ => return None,
    };
    Some(DepthStencilState {
        format: TextureResource::DEPTH_FORMAT,
        depth_write_enabled: write,
        depth_compare: compare,
        stencil: StencilState::default(),
        bias: DepthBiasState::default(),
    })
}

/// Compiles programs and hands out cached pipelines
pub struct PipelineManager {
    device: Arc<Device>,
    shader_modules: HashMap<&'static str, ShaderModule>,
    layouts: HashMap<Program, PipelineLayout>,
    pipelines: HashMap<PipelineKey, RenderPipeline>,
}

impl PipelineManager {
    pub fn new(device: Arc<Device>) -> Self {
        Self {
            device,
            shader_modules: HashMap::new(),
            layouts: HashMap::new(),
            pipelines: HashMap::new(),
        }
    }

    /// Compiles a WGSL module, reporting validation errors with their diagnostic text
    pub fn load_shader(&mut self, name: &'static str, source: &str) -> Result<()> {
        self.device.push_error_scope(ErrorFilter::Validation);
        let shader_module = self.device.create_shader_module(ShaderModuleDescriptor {
            label: Some(name),
            source: ShaderSource::Wgsl(source.into()),
        });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RenderError::ShaderCompile {
                name: name.to_string(),
                diagnostic: error.to_string(),
            });
        }

        log::info!("Compiled shader '{}'", name);
        self.shader_modules.insert(name, shader_module);
        Ok(())
    }

    pub fn has_shader(&self, name: &str) -> bool {
        self.shader_modules.contains_key(name)
    }

    /// Sets the bind group layouts a program's pipelines are created with
    pub fn set_layout(&mut self, program: Program, bind_group_layouts: &[&BindGroupLayout]) {
        let layout = self.device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some(&format!("{:?} Layout", program)),
            bind_group_layouts,
            push_constant_ranges: &[],
        });
        self.layouts.insert(program, layout);
    }

    /// Creates the pipeline for `key` unless it already exists
    pub fn create_pipeline(&mut self, key: PipelineKey) -> Result<()> {
        if self.pipelines.contains_key(&key) {
            return Ok(());
        }
        let pipeline = self.create_pipeline_from_key(&key)?;
        self.pipelines.insert(key, pipeline);
        Ok(())
    }

    pub fn get_pipeline(&self, key: &PipelineKey) -> Option<&RenderPipeline> {
        self.pipelines.get(key)
    }

    fn create_pipeline_from_key(&self, key: &PipelineKey) -> Result<RenderPipeline> {
        let label = key.label();
        let name = key.program.shader();
        let shader = self
            .shader_modules
            .get(name)
            .ok_or_else(|| RenderError::PipelineLink {
                label: label.clone(),
                diagnostic: format!("shader '{}' not loaded", name),
            })?;
        let layout = self
            .layouts
            .get(&key.program)
            .ok_or_else(|| RenderError::PipelineLink {
                label: label.clone(),
                diagnostic: "no pipeline layout registered".to_string(),
            })?;

        let color_targets: Vec<Option<ColorTargetState>> = key
            .color_format
            .map(|format| ColorTargetState {
                format,
                blend: Some(BlendState::REPLACE),
                write_mask: ColorWrites::ALL,
            })
            .into_iter()
            .map(Some)
            .collect();

        let fragment_state = key.program.fragment_entry().map(|entry| FragmentState {
            module: shader,
            entry_point: Some(entry),
            targets: &color_targets,
            compilation_options: PipelineCompilationOptions::default(),
        });

        // Fullscreen programs generate their triangle from the vertex index
        let vertex_buffers: &[VertexBufferLayout] = if key.program.uses_meshes() {
            &[Vertex3D::desc()]
        } else {
            &[]
        };

        self.device.push_error_scope(ErrorFilter::Validation);
        let pipeline = self.device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some(&label),
            layout: Some(layout),
            vertex: VertexState {
                module: shader,
                entry_point: Some("vs_main"),
                buffers: vertex_buffers,
                compilation_options: PipelineCompilationOptions::default(),
            },
            fragment: fragment_state,
            primitive: PrimitiveState {
                topology: PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: FrontFace::Ccw,
                cull_mode: key.cull.face(),
                polygon_mode: PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: depth_state(key.program),
            multisample: MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RenderError::PipelineLink {
                label,
                diagnostic: error.to_string(),
            });
        }

        log::debug!("Created pipeline {}", label);
        Ok(pipeline)
    }

    pub fn get_stats(&self) -> PipelineStats {
        PipelineStats {
            total_pipelines: self.pipelines.len(),
            loaded_shaders: self.shader_modules.len(),
            layouts: self.layouts.len(),
        }
    }
}

/// Statistics about pipeline manager state
#[derive(Debug)]
pub struct PipelineStats {
    pub total_pipelines: usize,
    pub loaded_shaders: usize,
    pub layouts: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_state_per_program() {
        let lighting = depth_state(Program::Lighting).unwrap();
        assert!(lighting.depth_write_enabled);
        assert_eq!(lighting.depth_compare, CompareFunction::Less);

        let sky = depth_state(Program::Skybox).unwrap();
        assert!(!sky.depth_write_enabled);
        assert_eq!(sky.depth_compare, CompareFunction::LessEqual);

        assert!(depth_state(Program::BlurHorizontal).is_none());
        assert!(depth_state(Program::DebugDepth).is_none());
    }

    #[test]
    fn test_keys_distinguish_cull_and_format() {
        let surface = PipelineKey::new(
            Program::Lighting,
            CullFace::Back,
            Some(TextureFormat::Bgra8Unorm),
        );
        let capture = PipelineKey::new(
            Program::Lighting,
            CullFace::Front,
            Some(TextureFormat::Rgba8Unorm),
        );
        assert_ne!(surface, capture);
        assert_ne!(surface.label(), capture.label());
    }
}
