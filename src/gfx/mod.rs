//! # Graphics Module
//!
//! Camera, scene description, geometry and the multi-pass renderer.
//!
//! - **Camera System** ([`camera`]) - orbit camera and the shared transform block
//! - **Scene** ([`scene`]) - objects, materials and point lights
//! - **Geometry** ([`geometry`]) - procedural primitives and OBJ loading
//! - **Rendering** ([`rendering`]) - shadow maps, occlusion, reflections and lighting
//! - **Resources** ([`resources`]) - GPU meshes, textures and render target storage

pub mod camera;
pub mod geometry;
pub mod rendering;
pub mod resources;
pub mod scene;

// Re-export commonly used types
pub use camera::orbit_camera::OrbitCamera;
pub use rendering::{FrameOrchestrator, WgpuBackend};
