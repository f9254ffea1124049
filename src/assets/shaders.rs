use std::borrow::Cow;
use std::path::Path;

use crate::error::{RenderError, Result};

/// Every shader asset a program can be built from
pub const SHADER_NAMES: [&str; 8] = [
    "shadow_depth",
    "depth_normal",
    "occlusion",
    "blur",
    "lighting",
    "skybox",
    "debug",
    "debug_depth",
];

fn embedded(name: &str) -> Option<&'static str> {
    let source = match name {
        "shadow_depth" => include_str!("../gfx/rendering/shaders/shadow_depth.wgsl"),
        "depth_normal" => include_str!("../gfx/rendering/shaders/depth_normal.wgsl"),
        "occlusion" => include_str!("../gfx/rendering/shaders/occlusion.wgsl"),
        "blur" => include_str!("../gfx/rendering/shaders/blur.wgsl"),
        "lighting" => include_str!("../gfx/rendering/shaders/lighting.wgsl"),
        "skybox" => include_str!("../gfx/rendering/shaders/skybox.wgsl"),
        "debug" => include_str!("../gfx/rendering/shaders/debug.wgsl"),
        "debug_depth" => include_str!("../gfx/rendering/shaders/debug_depth.wgsl"),
        _ => return None,
    };
    Some(source)
}

/// WGSL source of a named shader
///
/// With `dir` set, `<dir>/<name>.wgsl` is read from disk and a missing file
/// is an error reported with its path.
pub fn load_shader_source(name: &str, dir: Option<&Path>) -> Result<Cow<'static, str>> {
    if let Some(dir) = dir {
        let path = dir.join(format!("{}.wgsl", name));
        let source = std::fs::read_to_string(&path)
            .map_err(|source| RenderError::Asset { path: path.clone(), source })?;
        log::info!("Loaded shader '{}' from {}", name, path.display());
        return Ok(Cow::Owned(source));
    }

    embedded(name).map(Cow::Borrowed).ok_or_else(|| RenderError::Asset {
        path: format!("<embedded>/{}.wgsl", name).into(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "no embedded shader"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::rendering::backend::Program;

    #[test]
    fn test_every_program_has_an_embedded_shader() {
        for program in Program::ALL {
            assert!(SHADER_NAMES.contains(&program.shader()));
            let source = load_shader_source(program.shader(), None).unwrap();
            assert!(source.contains("fn vs_main"));
            if let Some(entry) = program.fragment_entry() {
                assert!(source.contains(&format!("fn {}", entry)), "{:?}", program);
            }
        }
    }

    #[test]
    fn test_binding_numbers_match_the_lighting_shader() {
        use crate::gfx::rendering::bindings::*;
        let source = load_shader_source("lighting", None).unwrap();
        for (group, binding) in [
            (FRAME_GROUP, TRANSFORM_BINDING),
            (FRAME_GROUP, LIGHTS_BINDING),
            (FRAME_GROUP, LIGHTING_PARAMS_BINDING),
            (OBJECT_GROUP, MATERIAL_BINDING),
            (OBJECT_GROUP, SURFACE_FLAGS_BINDING),
            (OBJECT_GROUP, SURFACE_SAMPLER_BINDING),
            (SHARED_GROUP, SHADOW_MAP_BINDING_BASE),
            (SHARED_GROUP, PASS_FLAGS_BINDING),
        ] {
            let needle = format!("@group({}) @binding({})", group, binding);
            assert!(source.contains(&needle), "missing {}", needle);
        }
    }

    #[test]
    fn test_missing_override_reports_path() {
        let dir = std::env::temp_dir().join("lightpass-no-such-shader-dir");
        let err = load_shader_source("lighting", Some(&dir)).unwrap_err();
        assert!(err.to_string().contains("lighting.wgsl"));
    }

    #[test]
    fn test_unknown_embedded_shader() {
        assert!(load_shader_source("pbr", None).is_err());
    }
}
