//! # Scene Module
//!
//! Static scene description consumed by the pass pipeline: objects with
//! their mesh, material and optional textures, the bounded light set, the
//! reflective object and an optional skybox.
//!
//! ## Key Components
//!
//! - [`Scene`] - Objects, lights and scene-wide settings
//! - [`SceneObject`] - Mesh handle, material and up to three texture handles
//! - [`LightSet`] - Ordered lights with a fixed capacity; order is shadow slot order
//! - [`Vertex3D`] - GPU vertex format

pub mod light;
pub mod material;
pub mod scene;
pub mod vertex;

// Re-export main types
pub use light::{Light, LightAnimator, LightSet, LightsBlock};
pub use material::{Material, MaterialBlock, SurfaceFlags};
pub use scene::{MeshHandle, ObjectId, Scene, SceneObject, Skybox, TextureHandle};
pub use vertex::Vertex3D;
