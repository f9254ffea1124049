//! Host application
//!
//! Owns the winit event loop and maps window events onto the renderer
//! callbacks: context creation, resize, update and render. Mouse input
//! orbits and zooms the camera unless the overlay wants it.

use anyhow::Context as _;
use cgmath::Point3;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    dpi::{LogicalSize, PhysicalSize},
    event::{DeviceEvent, DeviceId, ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowAttributes, WindowId},
};

use crate::assets::textures;
use crate::config::RendererConfig;
use crate::error::Result;
use crate::gfx::{
    camera::CameraController,
    geometry::{generate_quad, generate_skybox, generate_sphere},
    rendering::{FrameOrchestrator, WgpuBackend},
    resources::ColorSpace,
    scene::{Light, Material, MeshHandle, Scene, SceneObject, Skybox, TextureHandle},
};
use crate::ui::{stats_panel, UiManager};

/// Meshes of the demo scene once uploaded
#[derive(Debug, Clone, Copy)]
pub struct DemoMeshes {
    pub sphere: MeshHandle,
    pub floor: MeshHandle,
    pub skybox: MeshHandle,
}

/// Textures of the demo scene once uploaded
#[derive(Debug, Clone, Copy)]
pub struct DemoTextures {
    pub checker: TextureHandle,
    pub floor_normal: TextureHandle,
    pub floor_height: TextureHandle,
    pub sky: TextureHandle,
}

/// Reflective sphere above a bump-mapped floor, two lights and a sky
pub fn demo_scene(meshes: DemoMeshes, textures: DemoTextures, config: &RendererConfig) -> Result<Scene> {
    let mut scene = Scene::new(config.max_lights);

    let sphere = scene.add_object(
        SceneObject::new(
            "sphere",
            meshes.sphere,
            Material::new([0.8, 0.8, 0.8, 1.0], [1.0; 4], 100.0, 0.6),
        )
        .with_center(Point3::new(0.0, 0.0, 0.0)),
    );
    scene.add_object(
        SceneObject::new(
            "floor",
            meshes.floor,
            Material::new([0.9, 0.9, 0.9, 1.0], [0.3, 0.3, 0.3, 1.0], 16.0, 0.0),
        )
        .with_diffuse_texture(textures.checker)
        .with_normal_texture(textures.floor_normal)
        .with_height_texture(textures.floor_height)
        .with_center(Point3::new(0.0, -1.0, 0.0)),
    );
    scene.set_reflective(sphere)?;
    scene.set_skybox(Skybox {
        mesh: meshes.skybox,
        cubemap: textures.sky,
    });

    scene.add_light(Light::new([-1.0, 1.5, 3.0], [0.7; 3]))?;
    scene.add_light(Light::new([3.0, 3.0, -2.0], [0.7; 3]))?;
    Ok(scene)
}

/// Generates and uploads the demo assets, then assembles the scene
fn upload_demo_scene(backend: &mut WgpuBackend, config: &RendererConfig) -> Result<Scene> {
    let meshes = DemoMeshes {
        sphere: backend.upload_mesh(&generate_sphere(1.0, 32, 48), "sphere"),
        floor: backend.upload_mesh(
            &generate_quad(
                [
                    [-4.0, -1.0, 4.0],
                    [4.0, -1.0, 4.0],
                    [4.0, -1.0, -4.0],
                    [-4.0, -1.0, -4.0],
                ],
                4.0,
            ),
            "floor",
        ),
        skybox: backend.upload_mesh(&generate_skybox(), "skybox"),
    };

    let checker = textures::checker(256, 8, [230, 230, 230, 255], [90, 90, 110, 255]);
    let (normal, height) = textures::bump_maps(256, 4, 0.15);
    let textures = DemoTextures {
        checker: backend.upload_texture(&checker, "checker", ColorSpace::Srgb),
        floor_normal: backend.upload_texture(&normal, "floor normal", ColorSpace::Linear),
        floor_height: backend.upload_texture(&height, "floor height", ColorSpace::Linear),
        sky: backend.upload_cubemap(&textures::sky_faces(256), "sky")?,
    };

    demo_scene(meshes, textures, config)
}

pub struct LightpassApp {
    event_loop: Option<EventLoop<()>>,
    app_state: AppState,
}

struct AppState {
    config: RendererConfig,
    verbose: bool,
    window: Option<Arc<Window>>,
    backend: Option<WgpuBackend>,
    orchestrator: Option<FrameOrchestrator>,
    ui_manager: Option<UiManager>,
    controller: CameraController,
    start: Instant,
    last_frame: Instant,
    error: Option<anyhow::Error>,
}

impl LightpassApp {
    pub fn new(config: RendererConfig) -> anyhow::Result<Self> {
        let event_loop = EventLoop::new().context("failed to create event loop")?;
        let now = Instant::now();
        Ok(Self {
            event_loop: Some(event_loop),
            app_state: AppState {
                config,
                verbose: false,
                window: None,
                backend: None,
                orchestrator: None,
                ui_manager: None,
                controller: CameraController::default(),
                start: now,
                last_frame: now,
                error: None,
            },
        })
    }

    /// Logs every target allocation and recorded pass
    pub fn with_verbose_targets(mut self, verbose: bool) -> Self {
        self.app_state.verbose = verbose;
        self
    }

    /// Runs until the window closes; setup errors end the loop and are returned
    pub fn run(mut self) -> anyhow::Result<()> {
        let event_loop = self
            .event_loop
            .take()
            .context("event loop already consumed")?;
        event_loop.set_control_flow(ControlFlow::Poll);
        event_loop
            .run_app(&mut self.app_state)
            .context("event loop terminated abnormally")?;

        match self.app_state.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn window_size(window: &Window, size: PhysicalSize<u32>) -> (u32, u32) {
    let logical: LogicalSize<u32> = size.to_logical(window.scale_factor());
    (logical.width, logical.height)
}

impl AppState {
    fn init(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let window = event_loop
            .create_window(
                WindowAttributes::default()
                    .with_title("lightpass")
                    .with_inner_size(LogicalSize::new(1200, 800)),
            )
            .context("failed to create window")?;
        let window = Arc::new(window);
        let size = window.inner_size();

        let mut backend = pollster::block_on(WgpuBackend::new(
            window.clone(),
            size.width,
            size.height,
            &self.config,
        ))
        .context("failed to create the GPU context")?;
        backend.set_verbose(self.verbose);

        let scene = upload_demo_scene(&mut backend, &self.config)
            .context("failed to build the demo scene")?;

        let framebuffer_size = (size.width.max(1), size.height.max(1));
        let window_size = window_size(&window, size);
        let mut orchestrator = FrameOrchestrator::on_context_ready(
            self.config.clone(),
            scene,
            framebuffer_size,
            window_size,
            &mut backend,
        )
        .context("failed to set up the render pipeline")?;
        let pipelines = backend.pipeline_stats();
        log::info!(
            "Pipelines: {} created, {} shader modules, {} layouts",
            pipelines.total_pipelines,
            pipelines.loaded_shaders,
            pipelines.layouts
        );
        orchestrator.on_resize(framebuffer_size, window_size, &mut backend);

        let mut ui_manager = UiManager::new(
            backend.device(),
            backend.queue(),
            backend.surface_format(),
            &window,
        );
        ui_manager.update_display_size(framebuffer_size.0, framebuffer_size.1);

        self.start = Instant::now();
        self.last_frame = self.start;
        self.window = Some(window);
        self.backend = Some(backend);
        self.orchestrator = Some(orchestrator);
        self.ui_manager = Some(ui_manager);
        Ok(())
    }

    fn redraw(&mut self) {
        let (Some(window), Some(backend), Some(orchestrator)) = (
            self.window.as_ref(),
            self.backend.as_mut(),
            self.orchestrator.as_mut(),
        ) else {
            return;
        };

        let now = Instant::now();
        let elapsed = now - self.last_frame;
        self.last_frame = now;
        orchestrator.on_update((now - self.start).as_secs_f32(), elapsed, backend);
        orchestrator.on_render(backend);

        let stats = orchestrator.stats();
        match self.ui_manager.as_mut() {
            Some(ui_manager) => backend.finish_frame(|device, queue, encoder, view| {
                ui_manager.draw(device, queue, encoder, window, view, |ui| {
                    stats_panel(ui, &stats);
                });
            }),
            None => backend.finish_frame(|_, _, _, _| {}),
        }
    }
}

impl ApplicationHandler for AppState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        if let Err(err) = self.init(event_loop) {
            log::error!("{:#}", err);
            self.error = Some(err);
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.clone() else {
            return;
        };

        if let Some(ui_manager) = self.ui_manager.as_mut() {
            if ui_manager.handle_input(&window, window_id, &event) {
                window.request_redraw();
                return;
            }
        }

        match event {
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            }
            | WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let (Some(backend), Some(orchestrator)) =
                    (self.backend.as_mut(), self.orchestrator.as_mut())
                {
                    backend.resize(size.width, size.height);
                    orchestrator.on_resize(
                        (size.width, size.height),
                        window_size(&window, size),
                        backend,
                    );
                }
                if let Some(ui_manager) = self.ui_manager.as_mut() {
                    ui_manager.update_display_size(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(),
            _ => (),
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: DeviceId,
        event: DeviceEvent,
    ) {
        let Some(orchestrator) = self.orchestrator.as_mut() else {
            return;
        };

        if self
            .ui_manager
            .as_ref()
            .is_some_and(|ui_manager| ui_manager.wants_input())
        {
            self.controller.release();
            return;
        }

        let controller = &mut self.controller;
        orchestrator.move_camera(|camera| controller.process_events(&event, camera));
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handles() -> (DemoMeshes, DemoTextures) {
        (
            DemoMeshes {
                sphere: MeshHandle(0),
                floor: MeshHandle(1),
                skybox: MeshHandle(2),
            },
            DemoTextures {
                checker: TextureHandle(0),
                floor_normal: TextureHandle(1),
                floor_height: TextureHandle(2),
                sky: TextureHandle(3),
            },
        )
    }

    #[test]
    fn test_demo_scene_layout() {
        let (meshes, textures) = handles();
        let scene = demo_scene(meshes, textures, &RendererConfig::default()).unwrap();

        assert_eq!(scene.objects.len(), 2);
        assert_eq!(scene.lights.len(), 2);
        assert_eq!(scene.reflective, Some(0));
        assert!(scene.skybox.is_some());

        let floor = &scene.objects[1];
        assert_eq!(floor.height_texture, Some(TextureHandle(2)));
        let flags = floor.surface_flags();
        assert_eq!(
            (flags.diffuse_textured, flags.normal_textured, flags.height_textured),
            (1, 1, 1)
        );
    }

    #[test]
    fn test_demo_scene_initial_lights() {
        let (meshes, textures) = handles();
        let scene = demo_scene(meshes, textures, &RendererConfig::default()).unwrap();

        let first = scene.lights.get(0).unwrap();
        assert_eq!(first.point(), Point3::new(-1.0, 1.5, 3.0));
        let second = scene.lights.get(1).unwrap();
        assert_eq!(second.point(), Point3::new(3.0, 3.0, -2.0));
    }

    #[test]
    fn test_demo_scene_respects_light_capacity() {
        let (meshes, textures) = handles();
        let config = RendererConfig::default().with_max_lights(1);
        assert!(demo_scene(meshes, textures, &config).is_err());
    }
}
