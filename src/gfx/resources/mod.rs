//! GPU resource management
//!
//! Textures, render target storage and immutable meshes.

pub mod mesh;
pub mod texture_resource;

// Re-export main types
pub use mesh::{GpuAssets, GpuMesh};
pub use texture_resource::{ColorSpace, GpuTarget, TextureResource};
