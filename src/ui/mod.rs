//! # Overlay
//!
//! Dear ImGui overlay drawn on top of the finished frame.
//!
//! - [`UiManager`] - ImGui integration with winit and wgpu, input capture
//! - [`stats_panel`] - read-only frame statistics
//!
//! The overlay only reads a [`FrameStats`] snapshot and the viewport size.
//! While it wants the mouse or keyboard, the host keeps input away from the
//! camera.
//!
//! [`FrameStats`]: crate::gfx::rendering::FrameStats

pub mod manager;
pub mod panel;

// Re-export main types
pub use manager::UiManager;
pub use panel::stats_panel;
