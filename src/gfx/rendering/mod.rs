// src/gfx/rendering/mod.rs
//! Multi-pass rendering
//!
//! Stages describe their passes against the [`RenderBackend`] seam. The
//! [`FrameOrchestrator`] sequences them every frame and [`WgpuBackend`]
//! turns the pass records into GPU work.

pub mod backend;
pub mod bindings;
pub mod debug_surface;
pub mod depth_prepass;
pub mod lighting;
pub mod occlusion;
pub mod orchestrator;
pub mod pipeline_manager;
pub mod recording;
pub mod reflection;
pub mod registry;
pub mod shadow_stage;
pub mod wgpu_backend;

// Re-export main types
pub use backend::{PassRecord, Program, RenderBackend, SharedBuffer};
pub use bindings::{BindingTable, Role};
pub use orchestrator::{FrameOrchestrator, FrameStats};
pub use pipeline_manager::{PipelineKey, PipelineManager, PipelineStats};
pub use recording::RecordingBackend;
pub use registry::{ResourceRegistry, TargetHandle};
pub use shadow_stage::ShadowState;
pub use wgpu_backend::WgpuBackend;
