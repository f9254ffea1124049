pub mod camera_controller;
pub mod camera_utils;
pub mod orbit_camera;
pub mod transform;

// Re-export main types
pub use camera_controller::CameraController;
pub use orbit_camera::OrbitCamera;
pub use transform::{TransformBlock, TransformScope, TransformState};
