// src/lib.rs
//! Lightpass
//!
//! A multi-pass wgpu renderer: shadow maps for several lights, a depth
//! prepass feeding screen-space ambient occlusion with a separable blur,
//! dynamic cubemap reflections and a compositing lighting pass.

pub mod app;
pub mod assets;
pub mod config;
pub mod error;
pub mod gfx;
pub mod ui;
pub mod wgpu_utils;

// Re-export main types for convenience
pub use app::LightpassApp;
pub use config::RendererConfig;
pub use error::{RenderError, Result};
