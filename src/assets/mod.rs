//! Resource loader: shader sources and texture data
//!
//! Shaders are embedded in the binary unless an override directory is
//! configured. Textures are decoded from PNG/JPEG files or generated
//! procedurally so the demo runs without any asset files.

pub mod shaders;
pub mod textures;

pub use shaders::{load_shader_source, SHADER_NAMES};
pub use textures::{load_image, ImageData};
