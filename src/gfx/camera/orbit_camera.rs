// src/gfx/camera/orbit_camera.rs
use cgmath::{Deg, InnerSpace, Matrix3, Point3, Vector3};

use crate::config::CameraConfig;

/// Camera orbiting a fixed center
///
/// The eye is stored relative to the center and rotated in place by mouse
/// drags; zooming scales the offset and is rejected when it would leave the
/// configured distance range.
#[derive(Debug, Clone, Copy)]
pub struct OrbitCamera {
    pub eye: Vector3<f32>,
    pub center: Point3<f32>,
    pub up: Vector3<f32>,
    pub zoom_limits: (f32, f32),
}

impl OrbitCamera {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            eye: config.eye - config.center,
            center: config.center,
            up: config.up,
            zoom_limits: config.zoom_limits,
        }
    }

    pub fn eye_position(&self) -> Point3<f32> {
        self.center + self.eye
    }

    /// Rotates the eye around the up axis
    pub fn camera_left(&mut self, degrees: f32) {
        self.eye = Matrix3::from_axis_angle(self.up.normalize(), Deg(-degrees)) * self.eye;
    }

    /// Rotates the eye around the horizontal axis orthogonal to the view
    pub fn camera_up(&mut self, degrees: f32) {
        let ortho = self.eye.cross(self.up);
        if ortho.magnitude2() <= f32::EPSILON {
            return;
        }
        let rotated = Matrix3::from_axis_angle(ortho.normalize(), Deg(-degrees)) * self.eye;
        // Keep the eye off the up axis, where the view basis degenerates
        if rotated.normalize().dot(self.up.normalize()).abs() < 0.999 {
            self.eye = rotated;
        }
    }

    /// Scales the eye offset by `1 - 0.1 * scroll`. Returns false when the
    /// resulting distance would leave the zoom range.
    pub fn zoom(&mut self, scroll: f32) -> bool {
        let eye = self.eye * (1.0 - 0.1 * scroll);
        let distance = eye.magnitude();
        let (min, max) = self.zoom_limits;
        if !(min < distance && distance < max) {
            return false;
        }
        self.eye = eye;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> OrbitCamera {
        OrbitCamera::new(&CameraConfig::default())
    }

    #[test]
    fn test_rotation_preserves_distance() {
        let mut camera = camera();
        let before = camera.eye.magnitude();
        camera.camera_left(37.0);
        camera.camera_up(-12.0);
        assert!((camera.eye.magnitude() - before).abs() < 1e-4);
    }

    #[test]
    fn test_camera_left_keeps_height() {
        let mut camera = camera();
        let height = camera.eye.y;
        camera.camera_left(90.0);
        assert!((camera.eye.y - height).abs() < 1e-5);
    }

    #[test]
    fn test_zoom_respects_limits() {
        let mut camera = camera();
        let start = camera.eye;
        // |eye| is 3.5; scrolling out by 5 would scale it to 5.25
        assert!(!camera.zoom(-5.0));
        assert_eq!(camera.eye, start);

        assert!(camera.zoom(1.0));
        assert!((camera.eye.magnitude() - start.magnitude() * 0.9).abs() < 1e-4);
    }
}
