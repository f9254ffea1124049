//! Dynamic cubemap capture around the reflective object
//!
//! Six lit renders from the object's center, one per cube face, using the
//! lighting program. The main camera transform is checkpointed through a
//! [`TransformScope`] and is current again once [`ReflectionStage::run`]
//! returns.

use cgmath::{Point3, Vector3};

use crate::config::RendererConfig;
use crate::error::Result;
use crate::gfx::camera::camera_utils::{self, MIRROR_Y_MATRIX};
use crate::gfx::camera::{TransformScope, TransformState};
use crate::gfx::rendering::backend::{
    ColorTarget, CullFace, DrawItem, PassInputs, PassRecord, Program, RenderBackend,
};
use crate::gfx::rendering::bindings::{BindingTable, Role};
use crate::gfx::rendering::registry::{
    AttachmentPoint, BoundTarget, ResourceRegistry, TargetFormat, TargetHandle, TargetKind,
    TargetSize,
};
use crate::gfx::scene::{ObjectId, Scene};

const CAPTURE_FOVY_DEGREES: f32 = 90.0;
const CAPTURE_NEAR: f32 = 0.1;
const CAPTURE_FAR: f32 = 50.0;

/// Cube face basis: layer order, view direction and up vector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubeFace {
    pub label: &'static str,
    pub direction: Vector3<f32>,
    pub up: Vector3<f32>,
}

pub const CUBE_FACES: [CubeFace; 6] = [
    CubeFace {
        label: "+x",
        direction: Vector3::new(1.0, 0.0, 0.0),
        up: Vector3::new(0.0, -1.0, 0.0),
    },
    CubeFace {
        label: "-x",
        direction: Vector3::new(-1.0, 0.0, 0.0),
        up: Vector3::new(0.0, -1.0, 0.0),
    },
    CubeFace {
        label: "+y",
        direction: Vector3::new(0.0, 1.0, 0.0),
        up: Vector3::new(0.0, 0.0, 1.0),
    },
    CubeFace {
        label: "-y",
        direction: Vector3::new(0.0, -1.0, 0.0),
        up: Vector3::new(0.0, 0.0, -1.0),
    },
    CubeFace {
        label: "+z",
        direction: Vector3::new(0.0, 0.0, 1.0),
        up: Vector3::new(0.0, -1.0, 0.0),
    },
    CubeFace {
        label: "-z",
        direction: Vector3::new(0.0, 0.0, -1.0),
        up: Vector3::new(0.0, -1.0, 0.0),
    },
];

pub struct ReflectionStage {
    faces: Vec<BoundTarget>,
    depth: BoundTarget,
    shadow_maps: TargetHandle,
    clear_color: [f64; 4],
    include_self: bool,
}

impl ReflectionStage {
    pub fn new(
        registry: &mut ResourceRegistry,
        bindings: &mut BindingTable,
        config: &RendererConfig,
    ) -> Result<Self> {
        let shadow_maps = bindings.require(Role::ShadowMaps)?;
        let size = TargetSize::square(config.reflection_size);
        let cube = registry.acquire("reflection cube", TargetKind::Cubemap, size, TargetFormat::Rgba8)?;
        let depth = registry.acquire(
            "reflection depth",
            TargetKind::RenderBuffer,
            size,
            TargetFormat::Depth32,
        )?;

        let depth = registry.bind_as_target(depth, AttachmentPoint::Depth, 0)?;
        let faces = (0..CUBE_FACES.len() as u32)
            .map(|layer| registry.bind_as_target(cube, AttachmentPoint::Color(0), layer))
            .collect::<Result<Vec<_>>>()?;
        for face in &faces {
            registry.check_attachments(face, &depth)?;
        }
        bindings.assign(Role::ReflectionCube, cube);
        bindings.assign(Role::ReflectionDepth, depth.handle);

        Ok(Self {
            faces,
            depth,
            shadow_maps,
            clear_color: config.clear_color,
            include_self: config.include_reflective_self,
        })
    }

    pub fn cubemap(&self) -> TargetHandle {
        self.faces[0].handle
    }

    /// Objects drawn into the capture
    pub fn capture_list(&self, scene: &Scene) -> Vec<ObjectId> {
        scene
            .object_ids()
            .filter(|id| self.include_self || Some(*id) != scene.reflective)
            .collect()
    }

    /// Renders all six faces. Returns false if the scene has no reflective object.
    pub fn run<B: RenderBackend + ?Sized>(
        &self,
        scene: &Scene,
        transform: &mut TransformState,
        backend: &mut B,
    ) -> bool {
        let Some(center) = scene
            .reflective
            .and_then(|id| scene.object(id))
            .map(|object| object.center)
        else {
            return false;
        };
        let objects = self.capture_list(scene);

        let mut scope = TransformScope::new(transform, backend);
        scope.transform().set_projection(
            MIRROR_Y_MATRIX
                * camera_utils::perspective(CAPTURE_FOVY_DEGREES, 1.0, CAPTURE_NEAR, CAPTURE_FAR),
        );

        for (face, target) in CUBE_FACES.iter().zip(&self.faces) {
            scope
                .transform()
                .look_at(center, Self::face_target(center, face), face.up);
            scope.upload();

            let mut pass = PassRecord::new(format!("reflection {}", face.label), Program::Lighting)
                .with_cull(CullFace::Front)
                .with_color(ColorTarget::Target(*target), Some(self.clear_color))
                .with_depth(self.depth, Some(1.0))
                .with_inputs(PassInputs::Lighting {
                    shadow_maps: self.shadow_maps,
                    occlusion: None,
                    reflection: None,
                })
                .draw_objects(objects.iter().copied());
            if scene.skybox.is_some() {
                pass = pass.draw(DrawItem::Skybox);
            }
            scope.backend().execute(&pass);
        }
        true
    }

    fn face_target(center: Point3<f32>, face: &CubeFace) -> Point3<f32> {
        center + face.direction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::rendering::recording::RecordingBackend;
    use crate::gfx::rendering::shadow_stage::ShadowStage;
    use crate::gfx::scene::{Material, MeshHandle, SceneObject};
    use cgmath::InnerSpace;

    fn setup(config: &RendererConfig) -> (ReflectionStage, Scene) {
        let mut registry = ResourceRegistry::new((640, 480), 4096);
        let mut bindings = BindingTable::new();
        ShadowStage::new(&mut registry, &mut bindings, config).unwrap();
        let stage = ReflectionStage::new(&mut registry, &mut bindings, config).unwrap();

        let mut scene = Scene::new(8);
        let ball = scene.add_object(SceneObject::new("ball", MeshHandle(0), Material::default()));
        scene.add_object(SceneObject::new("plane", MeshHandle(1), Material::default()));
        scene.set_reflective(ball).unwrap();
        (stage, scene)
    }

    fn main_camera() -> TransformState {
        let mut transform = TransformState::default();
        transform.look_at(Point3::new(-3.0, 1.5, 1.0), Point3::new(0.0, 0.0, 0.0), Vector3::unit_y());
        transform.perspective(60.0, 4.0 / 3.0, 0.1, 100.0);
        transform.update_depth_bias();
        transform
    }

    #[test]
    fn test_face_basis_is_orthonormal() {
        for face in &CUBE_FACES {
            assert!((face.direction.magnitude() - 1.0).abs() < 1e-6);
            assert!(face.direction.dot(face.up).abs() < 1e-6);
        }
    }

    #[test]
    fn test_capture_restores_transform() {
        let (stage, scene) = setup(&RendererConfig::default());
        let mut transform = main_camera();
        let before = transform;
        let mut backend = RecordingBackend::default();

        assert!(stage.run(&scene, &mut transform, &mut backend));
        assert_eq!(transform, before);

        let writes = backend.transform_writes();
        assert_eq!(writes.len(), 7);
        assert_eq!(writes[6], bytemuck::bytes_of(&before.block()).to_vec());
        assert_eq!(backend.pass_count(Program::Lighting), 6);
    }

    #[test]
    fn test_capture_excludes_reflective_object_by_default() {
        let (stage, scene) = setup(&RendererConfig::default());
        let mut backend = RecordingBackend::default();
        stage.run(&scene, &mut main_camera(), &mut backend);
        for pass in backend.passes() {
            assert_eq!(pass.object_draws().collect::<Vec<_>>(), vec![1]);
            assert_eq!(pass.cull, CullFace::Front);
        }
    }

    #[test]
    fn test_capture_can_include_reflective_object() {
        let config = RendererConfig::default().with_reflective_self(true);
        let (stage, scene) = setup(&config);
        assert_eq!(stage.capture_list(&scene), vec![0, 1]);
    }

    #[test]
    fn test_faces_write_distinct_layers() {
        let (stage, scene) = setup(&RendererConfig::default());
        let mut backend = RecordingBackend::default();
        stage.run(&scene, &mut main_camera(), &mut backend);
        let layers: Vec<u32> = backend
            .passes()
            .filter_map(|pass| match pass.color.map(|c| c.target) {
                Some(ColorTarget::Target(bound)) => Some(bound.layer),
                _ => None,
            })
            .collect();
        assert_eq!(layers, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_no_reflective_object_skips_capture() {
        let (stage, mut scene) = setup(&RendererConfig::default());
        scene.reflective = None;
        let mut backend = RecordingBackend::default();
        assert!(!stage.run(&scene, &mut main_camera(), &mut backend));
        assert!(backend.commands().is_empty());
    }
}
