//! wgpu realisation of the pass records
//!
//! Owns the device, the presentation surface, every pipeline and the GPU
//! storage behind registry targets. Pass records are encoded into one
//! command encoder per frame. A write that changes a shared buffer first
//! submits the passes recorded so far, so every pass sees exactly the writes
//! issued before it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::assets::{self, ImageData};
use crate::config::{RendererConfig, MAX_LIGHTS};
use crate::error::{RenderError, Result};
use crate::gfx::camera::TransformBlock;
use crate::gfx::geometry::GeometryData;
use crate::gfx::rendering::backend::{
    ColorTarget, CullFace, DrawItem, PassInputs, PassRecord, Program, RenderBackend, SharedBuffer,
};
use crate::gfx::rendering::bindings::{
    DIFFUSE_TEXTURE_BINDING, FRAME_GROUP, HEIGHT_TEXTURE_BINDING, LIGHTING_PARAMS_BINDING,
    LIGHTS_BINDING, MATERIAL_BINDING, NORMAL_TEXTURE_BINDING, OBJECT_GROUP,
    OCCLUSION_MAP_BINDING, PASS_FLAGS_BINDING, REFLECTION_MAP_BINDING, SHADOW_MAP_BINDING_BASE,
    SHADOW_SAMPLER_BINDING, SHARED_GROUP, SHARED_SAMPLER_BINDING, SURFACE_FLAGS_BINDING,
    SURFACE_SAMPLER_BINDING, TRANSFORM_BINDING,
};
use crate::gfx::rendering::lighting::{LightingParams, PassFlags};
use crate::gfx::rendering::occlusion::{self, BlurParams, OcclusionParams, NOISE_SIZE};
use crate::gfx::rendering::pipeline_manager::{PipelineKey, PipelineManager, PipelineStats};
use crate::gfx::rendering::registry::{BoundTarget, ResourceRegistry, TargetFormat, TargetHandle};
use crate::gfx::resources::{ColorSpace, GpuAssets, GpuTarget, TextureResource};
use crate::gfx::scene::{
    LightsBlock, MaterialBlock, MeshHandle, Scene, SceneObject, SurfaceFlags, TextureHandle,
};
use crate::wgpu_utils::{
    binding_types, BindGroupBuilder, BindGroupLayoutBuilder, BindGroupLayoutWithDesc,
    BlockBuffer, SlotBuffer, UniformBuffer,
};

type ViewMatrix = [[f32; 4]; 4];

/// Bind group layouts of every program
struct Layouts {
    frame: BindGroupLayoutWithDesc,
    shadow_view: BindGroupLayoutWithDesc,
    object: BindGroupLayoutWithDesc,
    shared: BindGroupLayoutWithDesc,
    occlusion: BindGroupLayoutWithDesc,
    blur: BindGroupLayoutWithDesc,
    skybox: BindGroupLayoutWithDesc,
    debug: BindGroupLayoutWithDesc,
    debug_depth: BindGroupLayoutWithDesc,
}

impl Layouts {
    fn new(device: &wgpu::Device) -> Self {
        let filtering = wgpu::SamplerBindingType::Filtering;
        Self {
            frame: BindGroupLayoutBuilder::new()
                .binding_rendering(TRANSFORM_BINDING, binding_types::uniform())
                .binding_rendering(LIGHTS_BINDING, binding_types::uniform())
                .binding_rendering(LIGHTING_PARAMS_BINDING, binding_types::uniform())
                .create(device, "Frame Layout"),
            shadow_view: BindGroupLayoutBuilder::new()
                .next_binding_vertex(binding_types::uniform_dynamic())
                .create(device, "Shadow View Layout"),
            object: BindGroupLayoutBuilder::new()
                .binding_rendering(MATERIAL_BINDING, binding_types::uniform())
                .binding_fragment(SURFACE_FLAGS_BINDING, binding_types::uniform())
                .binding_fragment(DIFFUSE_TEXTURE_BINDING, binding_types::texture_2d())
                .binding_fragment(NORMAL_TEXTURE_BINDING, binding_types::texture_2d())
                .binding_fragment(HEIGHT_TEXTURE_BINDING, binding_types::texture_2d())
                .binding_fragment(SURFACE_SAMPLER_BINDING, binding_types::sampler(filtering))
                .create(device, "Object Layout"),
            shared: BindGroupLayoutBuilder::new()
                .binding_fragment(SHADOW_MAP_BINDING_BASE, binding_types::texture_depth_2d_array())
                .binding_fragment(
                    SHADOW_SAMPLER_BINDING,
                    binding_types::sampler(wgpu::SamplerBindingType::Comparison),
                )
                .binding_fragment(OCCLUSION_MAP_BINDING, binding_types::texture_2d())
                .binding_fragment(REFLECTION_MAP_BINDING, binding_types::texture_cube())
                .binding_fragment(SHARED_SAMPLER_BINDING, binding_types::sampler(filtering))
                .binding_fragment(PASS_FLAGS_BINDING, binding_types::uniform())
                .create(device, "Shared Inputs Layout"),
            occlusion: BindGroupLayoutBuilder::new()
                .next_binding_fragment(binding_types::texture_depth_2d())
                .next_binding_fragment(binding_types::texture_2d_unfiltered())
                .next_binding_fragment(binding_types::texture_2d_unfiltered())
                .next_binding_fragment(binding_types::uniform())
                .create(device, "Occlusion Inputs Layout"),
            blur: BindGroupLayoutBuilder::new()
                .next_binding_fragment(binding_types::texture_2d_unfiltered())
                .next_binding_fragment(binding_types::uniform())
                .create(device, "Blur Inputs Layout"),
            skybox: BindGroupLayoutBuilder::new()
                .next_binding_fragment(binding_types::texture_cube())
                .next_binding_fragment(binding_types::sampler(filtering))
                .create(device, "Skybox Layout"),
            debug: BindGroupLayoutBuilder::new()
                .next_binding_fragment(binding_types::texture_2d())
                .next_binding_fragment(binding_types::sampler(filtering))
                .create(device, "Debug Surface Layout"),
            debug_depth: BindGroupLayoutBuilder::new()
                .next_binding_fragment(binding_types::texture_depth_2d())
                .create(device, "Debug Depth Layout"),
        }
    }

    fn for_program(&self, program: Program) -> Vec<&wgpu::BindGroupLayout> {
        match program {
            Program::ShadowDepth => vec![&self.shadow_view.layout],
            Program::DepthNormal => vec![&self.frame.layout],
            Program::Occlusion => vec![&self.frame.layout, &self.occlusion.layout],
            Program::BlurHorizontal | Program::BlurVertical => vec![&self.blur.layout],
            Program::Lighting => vec![
                &self.frame.layout,
                &self.object.layout,
                &self.shared.layout,
            ],
            Program::Skybox => vec![&self.frame.layout, &self.skybox.layout],
            Program::DebugSurface => vec![&self.debug.layout],
            Program::DebugDepth => vec![&self.debug_depth.layout],
        }
    }
}

/// Textures bound where an input is absent
struct Fallbacks {
    white: TextureResource,
    flat_normal: TextureResource,
    cube: TextureResource,
}

struct ObjectBindings {
    mesh: MeshHandle,
    material: UniformBuffer<MaterialBlock>,
    _flags: UniformBuffer<SurfaceFlags>,
    bind_group: wgpu::BindGroup,
}

struct SkyboxBindings {
    mesh: MeshHandle,
    bind_group: wgpu::BindGroup,
}

struct Frame {
    texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
}

fn texture_or<'a>(
    assets: &'a GpuAssets,
    handle: Option<TextureHandle>,
    fallback: &'a TextureResource,
) -> Result<&'a TextureResource> {
    match handle {
        Some(handle) => assets
            .texture(handle)
            .ok_or(RenderError::UnknownTexture(handle.0)),
        None => Ok(fallback),
    }
}

pub struct WgpuBackend {
    surface: wgpu::Surface<'static>,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    config: wgpu::SurfaceConfiguration,
    pipelines: PipelineManager,
    layouts: Layouts,

    transform: UniformBuffer<TransformBlock>,
    lights: UniformBuffer<LightsBlock>,
    lighting_params: UniformBuffer<LightingParams>,
    occlusion_params: UniformBuffer<OcclusionParams>,
    blur_params: UniformBuffer<BlurParams>,
    shadow_views: SlotBuffer<ViewMatrix>,
    pass_flags: HashMap<PassFlags, UniformBuffer<PassFlags>>,
    frame_group: wgpu::BindGroup,
    shadow_view_group: wgpu::BindGroup,

    linear_sampler: wgpu::Sampler,
    shadow_sampler: wgpu::Sampler,
    repeat_sampler: wgpu::Sampler,
    noise: TextureResource,
    fallbacks: Fallbacks,

    assets: GpuAssets,
    targets: Vec<GpuTarget>,
    objects: Vec<ObjectBindings>,
    skybox: Option<SkyboxBindings>,
    input_groups: HashMap<PassInputs, wgpu::BindGroup>,

    encoder: Option<wgpu::CommandEncoder>,
    recorded: bool,
    slots_in_flight: HashSet<u32>,
    frame: Option<Frame>,
    verbose: bool,
}

impl WgpuBackend {
    /// Creates the device and surface and compiles every program
    ///
    /// Shader sources come from the embedded assets or from
    /// `config.shader_dir`. Any compile error is returned with the
    /// diagnostic text.
    pub async fn new(
        window: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
        renderer_config: &RendererConfig,
    ) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window)
            .map_err(|err| RenderError::Surface(err.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|err| RenderError::Adapter(err.to_string()))?;
        log::info!("Using adapter {:?}", adapter.get_info());

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("WGPU Device"),
                required_features: wgpu::Features::default(),
                required_limits: wgpu::Limits {
                    max_texture_dimension_2d: renderer_config.max_texture_dimension,
                    ..wgpu::Limits::downlevel_defaults()
                },
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|err| RenderError::Device(err.to_string()))?;
        let device = Arc::new(device);
        let queue = Arc::new(queue);

        let surface_capabilities = surface.get_capabilities(&adapter);
        let format = surface_capabilities
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| surface_capabilities.formats.first().copied())
            .ok_or_else(|| RenderError::Surface("surface reports no formats".to_string()))?;
        let alpha_mode = surface_capabilities
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let mut pipelines = PipelineManager::new(Arc::clone(&device));
        let shader_dir = renderer_config.shader_dir.as_deref();
        for name in assets::SHADER_NAMES {
            let source = assets::load_shader_source(name, shader_dir)?;
            pipelines.load_shader(name, &source)?;
        }

        let layouts = Layouts::new(&device);
        for program in Program::ALL {
            pipelines.set_layout(program, &layouts.for_program(program));
        }

        let transform = UniformBuffer::<TransformBlock>::new(&device);
        let lights = UniformBuffer::<LightsBlock>::new(&device);
        let lighting_params = UniformBuffer::<LightingParams>::new(&device);
        let occlusion_params = UniformBuffer::<OcclusionParams>::new(&device);
        let blur_params = UniformBuffer::<BlurParams>::new(&device);
        let shadow_views = SlotBuffer::<ViewMatrix>::new(&device, MAX_LIGHTS as u32);

        let frame_group = BindGroupBuilder::new(&layouts.frame)
            .buffer(transform.buffer())
            .buffer(lights.buffer())
            .buffer(lighting_params.buffer())
            .create(&device, "Frame Bind Group");
        let shadow_view_group = BindGroupBuilder::new(&layouts.shadow_view)
            .resource(shadow_views.binding_resource())
            .create(&device, "Shadow View Bind Group");

        let linear_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Linear Clamp Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let shadow_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Shadow Comparison Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });
        let repeat_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Surface Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let noise_pixels: Vec<u8> = occlusion::generate_noise().into_iter().flatten().collect();
        let noise = TextureResource::create_from_rgba(
            &device,
            &queue,
            &noise_pixels,
            (NOISE_SIZE, NOISE_SIZE),
            "Occlusion Noise",
            ColorSpace::Linear,
            wgpu::AddressMode::Repeat,
        );
        let white_face = vec![255u8; 4];
        let fallbacks = Fallbacks {
            white: TextureResource::create_solid(&device, &queue, [255; 4], "White", ColorSpace::Linear),
            flat_normal: TextureResource::create_solid(
                &device,
                &queue,
                [128, 128, 255, 255],
                "Flat Normal",
                ColorSpace::Linear,
            ),
            cube: TextureResource::create_cubemap(
                &device,
                &queue,
                &std::array::from_fn(|_| white_face.clone()),
                1,
                "Empty Cube",
            ),
        };

        Ok(Self {
            surface,
            device,
            queue,
            config,
            pipelines,
            layouts,
            transform,
            lights,
            lighting_params,
            occlusion_params,
            blur_params,
            shadow_views,
            pass_flags: HashMap::new(),
            frame_group,
            shadow_view_group,
            linear_sampler,
            shadow_sampler,
            repeat_sampler,
            noise,
            fallbacks,
            assets: GpuAssets::new(),
            targets: Vec::new(),
            objects: Vec::new(),
            skybox: None,
            input_groups: HashMap::new(),
            encoder: None,
            recorded: false,
            slots_in_flight: HashSet::new(),
            frame: None,
            verbose: false,
        })
    }

    /// Logs every target allocation and recorded pass at info level
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn upload_mesh(&mut self, geometry: &GeometryData, label: &str) -> MeshHandle {
        self.assets.add_mesh(&self.device, geometry, label)
    }

    pub fn upload_texture(
        &mut self,
        image: &ImageData,
        label: &str,
        color_space: ColorSpace,
    ) -> TextureHandle {
        let texture = TextureResource::create_from_rgba(
            &self.device,
            &self.queue,
            &image.pixels,
            image.size(),
            label,
            color_space,
            wgpu::AddressMode::Repeat,
        );
        self.assets.add_texture(texture)
    }

    /// Uploads six square faces of equal size as a cube texture
    pub fn upload_cubemap(&mut self, faces: &[ImageData; 6], label: &str) -> Result<TextureHandle> {
        let size = faces[0].width;
        if faces.iter().any(|face| face.size() != (size, size)) || size == 0 {
            return Err(RenderError::ImageDecode {
                path: label.into(),
                message: "cube faces must be square and equally sized".to_string(),
            });
        }
        let pixels: [Vec<u8>; 6] = std::array::from_fn(|i| faces[i].pixels.clone());
        let texture = TextureResource::create_cubemap(&self.device, &self.queue, &pixels, size, label);
        Ok(self.assets.add_texture(texture))
    }

    pub fn assets(&self) -> &GpuAssets {
        &self.assets
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub fn surface_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn pipeline_stats(&self) -> PipelineStats {
        self.pipelines.get_stats()
    }

    /// Reconfigures the presentation surface; zero sizes are ignored
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.frame = None;
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
    }

    /// Submits the frame, lets `overlay` draw on top of the final image and presents
    pub fn finish_frame<F>(&mut self, overlay: F)
    where
        F: FnOnce(&wgpu::Device, &wgpu::Queue, &mut wgpu::CommandEncoder, &wgpu::TextureView),
    {
        let mut encoder = self.take_encoder();
        match self.frame.take() {
            Some(frame) => {
                overlay(&self.device, &self.queue, &mut encoder, &frame.view);
                self.queue.submit(std::iter::once(encoder.finish()));
                frame.texture.present();
            }
            None => {
                self.queue.submit(std::iter::once(encoder.finish()));
            }
        }
        self.recorded = false;
        self.slots_in_flight.clear();
    }

    fn take_encoder(&mut self) -> wgpu::CommandEncoder {
        self.encoder.take().unwrap_or_else(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Frame Encoder"),
                })
        })
    }

    /// Submits the passes recorded so far
    fn flush(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
        self.recorded = false;
        self.slots_in_flight.clear();
    }

    fn acquire_frame(&mut self) -> bool {
        if self.frame.is_some() {
            return true;
        }
        match self.surface.get_current_texture() {
            Ok(texture) => {
                let view = texture
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                self.frame = Some(Frame { texture, view });
                true
            }
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("Surface lost or outdated, reconfiguring");
                self.surface.configure(&self.device, &self.config);
                false
            }
            Err(err) => {
                log::warn!("Skipping frame: {}", err);
                false
            }
        }
    }

    fn uniform_mut(&mut self, buffer: SharedBuffer) -> Option<&mut dyn BlockBuffer> {
        match buffer {
            SharedBuffer::Transform => Some(&mut self.transform),
            SharedBuffer::Lights => Some(&mut self.lights),
            SharedBuffer::Material(id) => self
                .objects
                .get_mut(id)
                .map(|object| &mut object.material as &mut dyn BlockBuffer),
            SharedBuffer::LightingParams => Some(&mut self.lighting_params),
            SharedBuffer::OcclusionParams => Some(&mut self.occlusion_params),
            SharedBuffer::BlurParams => Some(&mut self.blur_params),
            SharedBuffer::ShadowView(_) => None,
        }
    }

    fn target(&self, handle: TargetHandle) -> Result<&GpuTarget> {
        self.targets
            .get(handle.index())
            .ok_or(RenderError::UnknownTarget(handle.index() as u32))
    }

    fn sample_view(&self, handle: TargetHandle) -> Result<&wgpu::TextureView> {
        self.target(handle)?
            .sample_view
            .as_ref()
            .ok_or(RenderError::UnknownTarget(handle.index() as u32))
    }

    fn attachment_view(&self, bound: BoundTarget) -> Option<&wgpu::TextureView> {
        self.targets.get(bound.handle.index())?.layer(bound.layer)
    }

    fn object_bindings(&self, object: &SceneObject) -> Result<ObjectBindings> {
        if self.assets.mesh(object.mesh).is_none() {
            return Err(RenderError::UnknownMesh(object.mesh.0));
        }
        let diffuse = texture_or(&self.assets, object.diffuse_texture, &self.fallbacks.white)?;
        let normal = texture_or(&self.assets, object.normal_texture, &self.fallbacks.flat_normal)?;
        let height = texture_or(&self.assets, object.height_texture, &self.fallbacks.white)?;

        let material = UniformBuffer::new_with_data(&self.device, &object.material.block());
        let flags = UniformBuffer::new_with_data(&self.device, &object.surface_flags());
        let bind_group = BindGroupBuilder::new(&self.layouts.object)
            .buffer(material.buffer())
            .buffer(flags.buffer())
            .texture(&diffuse.view)
            .texture(&normal.view)
            .texture(&height.view)
            .sampler(&self.repeat_sampler)
            .create(&self.device, &format!("{} Bind Group", object.name));

        Ok(ObjectBindings {
            mesh: object.mesh,
            material,
            _flags: flags,
            bind_group,
        })
    }

    /// Pipelines of every pass the stages record, created up front so
    /// compile and link errors surface during setup
    fn create_pipelines(&mut self) -> Result<()> {
        let surface = Some(self.config.format);
        let capture = Some(TargetFormat::Rgba8.wgpu());
        let keys = [
            PipelineKey::new(Program::ShadowDepth, CullFace::Front, None),
            PipelineKey::new(
                Program::DepthNormal,
                CullFace::Back,
                Some(TargetFormat::Rgba16Float.wgpu()),
            ),
            PipelineKey::new(Program::Occlusion, CullFace::None, Some(TargetFormat::R8.wgpu())),
            PipelineKey::new(Program::BlurHorizontal, CullFace::None, Some(TargetFormat::R8.wgpu())),
            PipelineKey::new(Program::BlurVertical, CullFace::None, Some(TargetFormat::R8.wgpu())),
            PipelineKey::new(Program::Lighting, CullFace::Back, surface),
            PipelineKey::new(Program::Lighting, CullFace::Front, capture),
            PipelineKey::new(Program::Skybox, CullFace::None, surface),
            PipelineKey::new(Program::Skybox, CullFace::None, capture),
            PipelineKey::new(Program::DebugSurface, CullFace::None, surface),
            PipelineKey::new(Program::DebugDepth, CullFace::None, surface),
        ];
        for key in keys {
            self.pipelines.create_pipeline(key)?;
        }
        Ok(())
    }

    fn ensure_inputs(&mut self, inputs: &PassInputs) -> Result<()> {
        if matches!(inputs, PassInputs::None) || self.input_groups.contains_key(inputs) {
            return Ok(());
        }

        if let PassInputs::Lighting {
            occlusion,
            reflection,
            ..
        } = *inputs
        {
            let flags = PassFlags::new(occlusion.is_some(), reflection.is_some());
            if !self.pass_flags.contains_key(&flags) {
                self.pass_flags
                    .insert(flags, UniformBuffer::new_with_data(&self.device, &flags));
            }
        }

        let group = match *inputs {
            PassInputs::None => return Ok(()),
            PassInputs::Occlusion { depth, normal } => BindGroupBuilder::new(&self.layouts.occlusion)
                .texture(self.sample_view(depth)?)
                .texture(self.sample_view(normal)?)
                .texture(&self.noise.view)
                .buffer(self.occlusion_params.buffer())
                .create(&self.device, "Occlusion Inputs"),
            PassInputs::Blur { source } => BindGroupBuilder::new(&self.layouts.blur)
                .texture(self.sample_view(source)?)
                .buffer(self.blur_params.buffer())
                .create(&self.device, "Blur Inputs"),
            PassInputs::Lighting {
                shadow_maps,
                occlusion,
                reflection,
            } => {
                let flags = PassFlags::new(occlusion.is_some(), reflection.is_some());
                let occlusion_view = match occlusion {
                    Some(handle) => self.sample_view(handle)?,
                    None => &self.fallbacks.white.view,
                };
                let reflection_view = match reflection {
                    Some(handle) => self.sample_view(handle)?,
                    None => &self.fallbacks.cube.view,
                };
                let flags_buffer = self.pass_flags[&flags].buffer();
                BindGroupBuilder::new(&self.layouts.shared)
                    .texture(self.sample_view(shadow_maps)?)
                    .sampler(&self.shadow_sampler)
                    .texture(occlusion_view)
                    .texture(reflection_view)
                    .sampler(&self.linear_sampler)
                    .buffer(flags_buffer)
                    .create(&self.device, "Shared Inputs")
            }
            PassInputs::Debug { source, layer } => {
                let target = self.target(source)?;
                if target.format.is_depth_stencil_format() {
                    let view = target
                        .layer(layer)
                        .ok_or(RenderError::UnknownTarget(source.index() as u32))?;
                    BindGroupBuilder::new(&self.layouts.debug_depth)
                        .texture(view)
                        .create(&self.device, "Debug Depth Inputs")
                } else {
                    BindGroupBuilder::new(&self.layouts.debug)
                        .texture(self.sample_view(source)?)
                        .sampler(&self.linear_sampler)
                        .create(&self.device, "Debug Surface Inputs")
                }
            }
        };
        self.input_groups.insert(*inputs, group);
        Ok(())
    }

    fn bind_program_groups(&self, render_pass: &mut wgpu::RenderPass<'_>, pass: &PassRecord) {
        let inputs = self.input_groups.get(&pass.inputs);
        match pass.program {
            Program::ShadowDepth => {
                let offset = self.shadow_views.offset(pass.view_slot.unwrap_or(0));
                render_pass.set_bind_group(0, &self.shadow_view_group, &[offset]);
            }
            Program::DepthNormal => {
                render_pass.set_bind_group(FRAME_GROUP, &self.frame_group, &[]);
            }
            Program::Occlusion => {
                render_pass.set_bind_group(FRAME_GROUP, &self.frame_group, &[]);
                render_pass.set_bind_group(1, inputs, &[]);
            }
            Program::BlurHorizontal
            | Program::BlurVertical
            | Program::DebugSurface
            | Program::DebugDepth => {
                render_pass.set_bind_group(0, inputs, &[]);
            }
            Program::Lighting => {
                render_pass.set_bind_group(FRAME_GROUP, &self.frame_group, &[]);
                render_pass.set_bind_group(SHARED_GROUP, inputs, &[]);
            }
            Program::Skybox => {
                render_pass.set_bind_group(FRAME_GROUP, &self.frame_group, &[]);
                if let Some(skybox) = &self.skybox {
                    render_pass.set_bind_group(1, &skybox.bind_group, &[]);
                }
            }
        }
    }

    fn record_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pass: &PassRecord,
        key: &PipelineKey,
        sky_key: &PipelineKey,
    ) {
        let Some(pipeline) = self.pipelines.get_pipeline(key) else {
            return;
        };

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = pass
            .color
            .and_then(|attachment| {
                let view = match attachment.target {
                    ColorTarget::Surface => self.frame.as_ref().map(|frame| &frame.view),
                    ColorTarget::Target(bound) => self.attachment_view(bound),
                }?;
                let load = match attachment.clear {
                    Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                    None => wgpu::LoadOp::Load,
                };
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .into_iter()
            .map(Some)
            .collect();

        let depth_stencil_attachment = pass.depth.and_then(|attachment| {
            self.attachment_view(attachment.target)
                .map(|view| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: attachment.clear.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                })
        });

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&pass.label),
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        if let Some(viewport) = pass.viewport {
            render_pass.set_viewport(
                viewport.x,
                viewport.y,
                viewport.width,
                viewport.height,
                0.0,
                1.0,
            );
        }
        render_pass.set_pipeline(pipeline);
        self.bind_program_groups(&mut render_pass, pass);

        for item in &pass.draws {
            match item {
                DrawItem::Fullscreen => render_pass.draw(0..3, 0..1),
                DrawItem::Object(id) => {
                    let Some(object) = self.objects.get(*id) else {
                        continue;
                    };
                    if pass.program == Program::Lighting {
                        render_pass.set_bind_group(OBJECT_GROUP, &object.bind_group, &[]);
                    }
                    if let Some(mesh) = self.assets.mesh(object.mesh) {
                        mesh.draw(&mut render_pass);
                    }
                }
                DrawItem::Skybox => {
                    let (Some(skybox), Some(sky_pipeline)) =
                        (&self.skybox, self.pipelines.get_pipeline(sky_key))
                    else {
                        continue;
                    };
                    let Some(mesh) = self.assets.mesh(skybox.mesh) else {
                        continue;
                    };
                    render_pass.set_pipeline(sky_pipeline);
                    render_pass.set_bind_group(FRAME_GROUP, &self.frame_group, &[]);
                    render_pass.set_bind_group(1, &skybox.bind_group, &[]);
                    mesh.draw(&mut render_pass);
                    // Back to the pass program for any draws that follow
                    render_pass.set_pipeline(pipeline);
                    self.bind_program_groups(&mut render_pass, pass);
                }
            }
        }
    }
}

impl RenderBackend for WgpuBackend {
    fn prepare(&mut self, registry: &ResourceRegistry, scene: &Scene) -> Result<()> {
        self.targets = registry
            .iter()
            .map(|(handle, desc)| {
                if self.verbose {
                    log::info!(
                        "Allocating {:?} '{}' {:?} {}x{} {:?}",
                        handle,
                        desc.label,
                        desc.kind,
                        desc.extent.0,
                        desc.extent.1,
                        desc.format
                    );
                }
                GpuTarget::create(&self.device, desc)
            })
            .collect();

        let objects = scene
            .objects
            .iter()
            .map(|object| self.object_bindings(object))
            .collect::<Result<Vec<_>>>()?;
        self.objects = objects;

        self.skybox = match scene.skybox {
            Some(skybox) => {
                if self.assets.mesh(skybox.mesh).is_none() {
                    return Err(RenderError::UnknownMesh(skybox.mesh.0));
                }
                let cube = self
                    .assets
                    .texture(skybox.cubemap)
                    .ok_or(RenderError::UnknownTexture(skybox.cubemap.0))?;
                let bind_group = BindGroupBuilder::new(&self.layouts.skybox)
                    .texture(&cube.view)
                    .sampler(&cube.sampler)
                    .create(&self.device, "Skybox Bind Group");
                Some(SkyboxBindings {
                    mesh: skybox.mesh,
                    bind_group,
                })
            }
            None => None,
        };

        self.input_groups.clear();
        self.create_pipelines()?;
        log::info!(
            "Backend prepared: {} targets, {} objects, {:?}",
            self.targets.len(),
            self.objects.len(),
            self.pipelines.get_stats()
        );
        Ok(())
    }

    fn write_buffer(&mut self, buffer: SharedBuffer, bytes: &[u8]) {
        if let SharedBuffer::ShadowView(slot) = buffer {
            if self.slots_in_flight.contains(&slot) {
                self.flush();
            }
            self.shadow_views.write_slot(&self.queue, slot, bytes);
            self.slots_in_flight.insert(slot);
            return;
        }

        let changed = match self.uniform_mut(buffer) {
            Some(uniform) if uniform.block_size() == bytes.len() => uniform.differs(bytes),
            Some(uniform) => {
                log::warn!(
                    "Write of {} bytes to {:?} ignored, block is {} bytes",
                    bytes.len(),
                    buffer,
                    uniform.block_size()
                );
                return;
            }
            None => {
                log::warn!("Write to unknown buffer {:?} ignored", buffer);
                return;
            }
        };
        if !changed {
            return;
        }
        if self.recorded {
            self.flush();
        }
        let queue = Arc::clone(&self.queue);
        if let Some(uniform) = self.uniform_mut(buffer) {
            uniform.update_bytes(&queue, bytes);
        }
    }

    fn execute(&mut self, pass: &PassRecord) {
        let color_format = match pass.color.map(|attachment| attachment.target) {
            None => None,
            Some(ColorTarget::Surface) => {
                if !self.acquire_frame() {
                    return;
                }
                Some(self.config.format)
            }
            Some(ColorTarget::Target(bound)) => match self.target(bound.handle) {
                Ok(target) => Some(target.format),
                Err(err) => {
                    log::error!("Skipping pass '{}': {}", pass.label, err);
                    return;
                }
            },
        };

        let key = PipelineKey::new(pass.program, pass.cull, color_format);
        let sky_key = PipelineKey::new(Program::Skybox, CullFace::None, color_format);
        let prepared = self
            .pipelines
            .create_pipeline(key)
            .and_then(|_| {
                if pass.draws.contains(&DrawItem::Skybox) {
                    self.pipelines.create_pipeline(sky_key)
                } else {
                    Ok(())
                }
            })
            .and_then(|_| self.ensure_inputs(&pass.inputs));
        if let Err(err) = prepared {
            log::error!("Skipping pass '{}': {}", pass.label, err);
            return;
        }

        if self.verbose {
            log::info!("Recording pass '{}' ({} draws)", pass.label, pass.draws.len());
        }
        let mut encoder = self.take_encoder();
        self.record_pass(&mut encoder, pass, &key, &sky_key);
        self.encoder = Some(encoder);
        self.recorded = true;
    }

    fn targets_resized(&mut self, registry: &ResourceRegistry, handles: &[TargetHandle]) {
        for handle in handles {
            let Ok(desc) = registry.desc(*handle) else {
                continue;
            };
            if let Some(target) = self.targets.get_mut(handle.index()) {
                *target = GpuTarget::create(&self.device, desc);
            }
        }
        self.input_groups.clear();
        log::debug!("Recreated {} screen-sized target(s)", handles.len());
    }
}
