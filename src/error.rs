// src/error.rs
//! Error types for renderer setup
//!
//! Every failure the renderer can report happens during initialization:
//! missing assets, shader compilation, render target completeness and
//! capacity checks. Per-frame operations never fail once setup succeeded.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building the renderer and its resources
#[derive(Error, Debug)]
pub enum RenderError {
    /// An asset file could not be read
    #[error("failed to read asset '{path}': {source}")]
    Asset {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A texture file was read but could not be decoded
    #[error("failed to decode image '{path}': {message}")]
    ImageDecode { path: PathBuf, message: String },

    /// A model file could not be loaded
    #[error("failed to load model '{path}': {message}")]
    ModelLoad { path: PathBuf, message: String },

    /// Shader module creation produced a validation error
    #[error("shader '{name}' failed to compile:\n{diagnostic}")]
    ShaderCompile { name: String, diagnostic: String },

    /// Render pipeline creation produced a validation error
    #[error("pipeline '{label}' failed to link:\n{diagnostic}")]
    PipelineLink { label: String, diagnostic: String },

    /// A render target failed its completeness check
    #[error("render target '{label}' is incomplete: {reason}")]
    IncompleteTarget { label: String, reason: String },

    /// More lights were added than the configured capacity allows
    #[error("light capacity exceeded: at most {capacity} lights are supported")]
    LightCapacity { capacity: usize },

    #[error("unknown render target handle {0}")]
    UnknownTarget(u32),

    #[error("unknown scene object {0}")]
    UnknownObject(usize),

    #[error("unknown mesh handle {0}")]
    UnknownMesh(u32),

    #[error("unknown texture handle {0}")]
    UnknownTexture(u32),

    #[error("no suitable graphics adapter: {0}")]
    Adapter(String),

    #[error("failed to create graphics device: {0}")]
    Device(String),

    #[error("failed to create presentation surface: {0}")]
    Surface(String),
}

pub type Result<T> = std::result::Result<T, RenderError>;

impl RenderError {
    pub(crate) fn incomplete(label: &str, reason: impl Into<String>) -> Self {
        RenderError::IncompleteTarget {
            label: label.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_error_reports_path() {
        let err = RenderError::Asset {
            path: PathBuf::from("textures/missing.png"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert!(err.to_string().contains("textures/missing.png"));
    }

    #[test]
    fn test_shader_error_carries_diagnostic() {
        let err = RenderError::ShaderCompile {
            name: "lighting".to_string(),
            diagnostic: "error: expected ';'".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("lighting"));
        assert!(text.contains("expected ';'"));
    }
}
