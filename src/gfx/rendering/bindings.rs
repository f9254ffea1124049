//! Fixed binding contract between stages and shaders, and the role table
//!
//! The numbers below are mirrored by the WGSL sources and must not change
//! independently of them.

use std::collections::HashMap;

use crate::error::{RenderError, Result};
use crate::gfx::rendering::registry::TargetHandle;

pub const TRANSFORM_BINDING: u32 = 1;
pub const LIGHTS_BINDING: u32 = 2;
pub const MATERIAL_BINDING: u32 = 3;

/// Frame group (0): lighting parameters next to transform and lights
pub const LIGHTING_PARAMS_BINDING: u32 = 4;

/// Object group (1)
pub const SURFACE_FLAGS_BINDING: u32 = 4;
pub const DIFFUSE_TEXTURE_BINDING: u32 = 5;
pub const NORMAL_TEXTURE_BINDING: u32 = 6;
pub const HEIGHT_TEXTURE_BINDING: u32 = 7;
pub const SURFACE_SAMPLER_BINDING: u32 = 8;

/// Shared group (2): shadow map array first, then the other shared inputs
pub const SHADOW_MAP_BINDING_BASE: u32 = 10;
pub const SHADOW_SAMPLER_BINDING: u32 = SHADOW_MAP_BINDING_BASE + 1;
pub const OCCLUSION_MAP_BINDING: u32 = SHADOW_MAP_BINDING_BASE + 2;
pub const REFLECTION_MAP_BINDING: u32 = SHADOW_MAP_BINDING_BASE + 3;
pub const SHARED_SAMPLER_BINDING: u32 = SHADOW_MAP_BINDING_BASE + 4;
pub const PASS_FLAGS_BINDING: u32 = SHADOW_MAP_BINDING_BASE + 5;

pub const FRAME_GROUP: u32 = 0;
pub const OBJECT_GROUP: u32 = 1;
pub const SHARED_GROUP: u32 = 2;

/// Logical role of a render target in the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    ShadowMaps,
    PrepassDepth,
    PrepassNormal,
    OcclusionRaw,
    OcclusionScratch,
    ReflectionCube,
    ReflectionDepth,
    ScreenDepth,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::ShadowMaps => "shadow maps",
            Role::PrepassDepth => "prepass depth",
            Role::PrepassNormal => "prepass normal",
            Role::OcclusionRaw => "occlusion",
            Role::OcclusionScratch => "occlusion scratch",
            Role::ReflectionCube => "reflection cube",
            Role::ReflectionDepth => "reflection depth",
            Role::ScreenDepth => "screen depth",
        }
    }
}

/// Maps roles to the registry targets that fill them
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    entries: HashMap<Role, TargetHandle>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, role: Role, handle: TargetHandle) {
        if let Some(previous) = self.entries.insert(role, handle) {
            log::warn!(
                "Role '{}' reassigned from {:?} to {:?}",
                role.label(),
                previous,
                handle
            );
        }
    }

    pub fn get(&self, role: Role) -> Option<TargetHandle> {
        self.entries.get(&role).copied()
    }

    /// Looks up a role that must have been assigned during setup
    pub fn require(&self, role: Role) -> Result<TargetHandle> {
        self.get(role)
            .ok_or_else(|| RenderError::incomplete(role.label(), "no target assigned to this role"))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::rendering::registry::{ResourceRegistry, TargetFormat, TargetKind, TargetSize};

    #[test]
    fn test_contract_binding_points() {
        assert_eq!(TRANSFORM_BINDING, 1);
        assert_eq!(LIGHTS_BINDING, 2);
        assert_eq!(MATERIAL_BINDING, 3);
        assert!(PASS_FLAGS_BINDING > SHADOW_MAP_BINDING_BASE);
    }

    #[test]
    fn test_require_reports_missing_role() {
        let mut registry = ResourceRegistry::new((64, 64), 4096);
        let handle = registry
            .acquire("occlusion", TargetKind::Texture2d, TargetSize::square(64), TargetFormat::R8)
            .unwrap();
        let mut table = BindingTable::new();
        table.assign(Role::OcclusionRaw, handle);

        assert_eq!(table.require(Role::OcclusionRaw).unwrap(), handle);
        let err = table.require(Role::OcclusionScratch).unwrap_err();
        assert!(err.to_string().contains("occlusion scratch"));
    }
}
