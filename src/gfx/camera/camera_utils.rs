// src/gfx/camera/camera_utils.rs
//! Matrix helpers shared by the main camera, light views and cube captures

use cgmath::{Deg, Matrix, Matrix4, Point3, SquareMatrix, Vector3};

/// Converts OpenGL clip space (z in -1..1) to wgpu clip space (z in 0..1)
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Maps wgpu clip space to texture space: x to 0..1, y to 1..0, depth kept
#[rustfmt::skip]
pub const DEPTH_BIAS_MATRIX: Matrix4<f32> = Matrix4::new(
    0.5,  0.0, 0.0, 0.0,
    0.0, -0.5, 0.0, 0.0,
    0.0,  0.0, 1.0, 0.0,
    0.5,  0.5, 0.0, 1.0,
);

/// Flips clip-space Y; cube faces are written top row first
#[rustfmt::skip]
pub const MIRROR_Y_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0,  0.0, 0.0, 0.0,
    0.0, -1.0, 0.0, 0.0,
    0.0,  0.0, 1.0, 0.0,
    0.0,  0.0, 0.0, 1.0,
);

/// Right-handed view matrix
pub fn look_at(eye: Point3<f32>, center: Point3<f32>, up: Vector3<f32>) -> Matrix4<f32> {
    Matrix4::look_at_rh(eye, center, up)
}

/// Perspective projection in wgpu clip space
pub fn perspective(fovy_degrees: f32, aspect: f32, near: f32, far: f32) -> Matrix4<f32> {
    OPENGL_TO_WGPU_MATRIX * cgmath::perspective(Deg(fovy_degrees), aspect, near, far)
}

/// Inverse transpose of the model-view matrix
pub fn normal_matrix(model_view: Matrix4<f32>) -> Matrix4<f32> {
    model_view
        .invert()
        .unwrap_or_else(Matrix4::identity)
        .transpose()
}

pub fn convert_matrix4_to_array(matrix4: Matrix4<f32>) -> [[f32; 4]; 4] {
    matrix4.into()
}
