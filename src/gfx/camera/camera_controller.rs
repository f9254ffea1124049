// src/gfx/camera/camera_controller.rs
use winit::{
    dpi::PhysicalPosition,
    event::{DeviceEvent, ElementState, MouseScrollDelta},
};

use super::orbit_camera::OrbitCamera;

/// Maps raw mouse input onto orbit camera moves
pub struct CameraController {
    /// Degrees of rotation per pixel of mouse motion
    pub rotate_speed: f32,
    /// Scroll lines per pixel of touchpad scroll
    pub pixel_scroll_scale: f32,
    is_mouse_pressed: bool,
}

impl CameraController {
    pub fn new(rotate_speed: f32) -> Self {
        Self {
            rotate_speed,
            pixel_scroll_scale: 0.02,
            is_mouse_pressed: false,
        }
    }

    /// Applies the event to the camera. Returns true if the eye moved.
    pub fn process_events(&mut self, event: &DeviceEvent, camera: &mut OrbitCamera) -> bool {
        match event {
            DeviceEvent::Button {
                button: 0, // Left Mouse Button
                state,
            } => {
                self.is_mouse_pressed = *state == ElementState::Pressed;
                false
            }
            DeviceEvent::MouseWheel { delta } => {
                let scroll = match delta {
                    MouseScrollDelta::LineDelta(_, scroll) => *scroll,
                    MouseScrollDelta::PixelDelta(PhysicalPosition { y, .. }) => {
                        *y as f32 * self.pixel_scroll_scale
                    }
                };
                camera.zoom(scroll)
            }
            DeviceEvent::MouseMotion { delta } if self.is_mouse_pressed => {
                camera.camera_left(delta.0 as f32 * self.rotate_speed);
                camera.camera_up(-delta.1 as f32 * self.rotate_speed);
                true
            }
            _ => false,
        }
    }

    /// Drops any drag in progress, used when the overlay grabs the mouse
    pub fn release(&mut self) {
        self.is_mouse_pressed = false;
    }
}

impl Default for CameraController {
    fn default() -> Self {
        Self::new(0.5)
    }
}
