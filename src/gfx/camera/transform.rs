// src/gfx/camera/transform.rs
//! Shared transform block and the camera state it is derived from
//!
//! The block is rewritten whenever the camera or projection changes. The
//! reflection capture temporarily repurposes it through [`TransformScope`],
//! which restores and re-uploads the previous contents when dropped.

use bytemuck::{Pod, Zeroable};
use cgmath::{EuclideanSpace, Matrix4, Point3, SquareMatrix, Vector3};

use super::camera_utils::{self, convert_matrix4_to_array};
use crate::gfx::rendering::backend::{RenderBackend, SharedBuffer};

/// GPU layout of the transform block (`@binding(1)`)
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct TransformBlock {
    pub depth_bias: [[f32; 4]; 4],
    pub model_view: [[f32; 4]; 4],
    pub model_view_projection: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 4],
    /// World-space camera position, w = 1
    pub camera_position: [f32; 4],
}

/// Camera matrices kept in sync with each other
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TransformState {
    pub model: Matrix4<f32>,
    pub view: Matrix4<f32>,
    pub eye: Point3<f32>,
    pub depth_bias: Matrix4<f32>,
    pub model_view: Matrix4<f32>,
    pub model_view_projection: Matrix4<f32>,
    pub projection: Matrix4<f32>,
    pub normal: Matrix4<f32>,
}

impl Default for TransformState {
    fn default() -> Self {
        Self {
            model: Matrix4::identity(),
            view: Matrix4::identity(),
            eye: Point3::origin(),
            depth_bias: Matrix4::identity(),
            model_view: Matrix4::identity(),
            model_view_projection: Matrix4::identity(),
            projection: Matrix4::identity(),
            normal: Matrix4::identity(),
        }
    }
}

impl TransformState {
    /// Sets the view matrix and recomputes model-view, normal and MVP
    pub fn look_at(&mut self, eye: Point3<f32>, center: Point3<f32>, up: Vector3<f32>) {
        self.eye = eye;
        self.view = camera_utils::look_at(eye, center, up);
        self.model_view = self.view * self.model;
        self.normal = camera_utils::normal_matrix(self.model_view);
        self.model_view_projection = self.projection * self.model_view;
    }

    /// Sets the projection matrix and recomputes the MVP
    pub fn perspective(&mut self, fovy_degrees: f32, aspect: f32, near: f32, far: f32) {
        self.set_projection(camera_utils::perspective(fovy_degrees, aspect, near, far));
    }

    pub fn set_projection(&mut self, projection: Matrix4<f32>) {
        self.projection = projection;
        self.model_view_projection = self.projection * self.model_view;
    }

    /// Projects lookups in the current view into texture space
    pub fn update_depth_bias(&mut self) {
        self.depth_bias = camera_utils::DEPTH_BIAS_MATRIX * self.model_view_projection;
    }

    pub fn block(&self) -> TransformBlock {
        TransformBlock {
            depth_bias: convert_matrix4_to_array(self.depth_bias),
            model_view: convert_matrix4_to_array(self.model_view),
            model_view_projection: convert_matrix4_to_array(self.model_view_projection),
            projection: convert_matrix4_to_array(self.projection),
            normal: convert_matrix4_to_array(self.normal),
            camera_position: [self.eye.x, self.eye.y, self.eye.z, 1.0],
        }
    }

    /// Uploads the block to the shared transform buffer
    pub fn upload<B: RenderBackend + ?Sized>(&self, backend: &mut B) {
        backend.write_buffer(SharedBuffer::Transform, bytemuck::bytes_of(&self.block()));
    }
}

/// Checkpoint of the transform state that is reinstated on drop
///
/// Every exit path restores the saved matrices and re-uploads them, so the
/// main camera's block is current again before the next stage reads it.
pub struct TransformScope<'a, B: RenderBackend + ?Sized> {
    transform: &'a mut TransformState,
    backend: &'a mut B,
    saved: TransformState,
}

impl<'a, B: RenderBackend + ?Sized> TransformScope<'a, B> {
    pub fn new(transform: &'a mut TransformState, backend: &'a mut B) -> Self {
        let saved = *transform;
        Self {
            transform,
            backend,
            saved,
        }
    }

    pub fn transform(&mut self) -> &mut TransformState {
        &mut *self.transform
    }

    pub fn backend(&mut self) -> &mut B {
        &mut *self.backend
    }

    /// Uploads the temporary transform
    pub fn upload(&mut self) {
        self.transform.upload(&mut *self.backend);
    }

    pub fn saved(&self) -> &TransformState {
        &self.saved
    }
}

impl<B: RenderBackend + ?Sized> Drop for TransformScope<'_, B> {
    fn drop(&mut self) {
        *self.transform = self.saved;
        self.transform.upload(&mut *self.backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::rendering::recording::RecordingBackend;

    fn main_camera(aspect: f32) -> TransformState {
        let mut transform = TransformState::default();
        transform.look_at(
            Point3::new(-3.0, 1.5, 1.0),
            Point3::new(0.0, 0.0, 0.0),
            Vector3::unit_y(),
        );
        transform.perspective(60.0, aspect, 0.1, 100.0);
        transform
    }

    #[test]
    fn test_block_is_deterministic() {
        let a = main_camera(1.5).block();
        let b = main_camera(1.5).block();
        assert_eq!(bytemuck::bytes_of(&a), bytemuck::bytes_of(&b));
    }

    #[test]
    fn test_block_layout_is_std140_sized() {
        assert_eq!(std::mem::size_of::<TransformBlock>(), 5 * 64 + 16);
    }

    #[test]
    fn test_mvp_is_projection_times_view() {
        let transform = main_camera(4.0 / 3.0);
        let expected = camera_utils::perspective(60.0, 4.0 / 3.0, 0.1, 100.0)
            * camera_utils::look_at(
                Point3::new(-3.0, 1.5, 1.0),
                Point3::new(0.0, 0.0, 0.0),
                Vector3::unit_y(),
            );
        assert_eq!(transform.model_view_projection, expected);
    }

    #[test]
    fn test_scope_restores_and_uploads_on_drop() {
        let mut transform = main_camera(1.5);
        let before = transform.block();
        let mut backend = RecordingBackend::default();
        {
            let mut scope = TransformScope::new(&mut transform, &mut backend);
            scope.transform().perspective(90.0, 1.0, 0.1, 50.0);
            scope.transform().look_at(
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Vector3::new(0.0, -1.0, 0.0),
            );
            scope.upload();
        }
        assert_eq!(transform.block(), before);
        let writes = backend.transform_writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[1], bytemuck::bytes_of(&before).to_vec());
    }
}
