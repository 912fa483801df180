//! Headset camera model used to place targets and project them to the viewport.
//!
//! Conventions follow the game engine the headset runs: camera space is
//! left-handed with +Z forward and +Y up, and viewport coordinates run from
//! (0, 0) at the bottom-left to (1, 1) at the top-right.

use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};

/// Camera pose and projection parameters, as stored in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// World position of the camera
    pub position: [f32; 3],
    /// Roll, pitch, yaw in degrees
    pub rotation_deg: [f32; 3],
    /// Vertical field of view in degrees
    pub vertical_fov_deg: f32,
    /// Viewport width / height
    pub aspect: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 0.0],
            rotation_deg: [0.0, 0.0, 0.0],
            vertical_fov_deg: 60.0,
            aspect: 16.0 / 9.0,
        }
    }
}

/// Pinhole camera with a rigid pose in world space.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraModel {
    pose: Isometry3<f32>,
    tan_half_fov: f32,
    aspect: f32,
}

impl CameraModel {
    pub fn new(pose: Isometry3<f32>, vertical_fov_deg: f32, aspect: f32) -> Self {
        Self {
            pose,
            tan_half_fov: (vertical_fov_deg.to_radians() / 2.0).tan(),
            aspect,
        }
    }

    pub fn from_config(config: &CameraConfig) -> Self {
        let [x, y, z] = config.position;
        let [roll, pitch, yaw] = config.rotation_deg.map(f32::to_radians);
        let pose = Isometry3::from_parts(
            Translation3::new(x, y, z),
            UnitQuaternion::from_euler_angles(roll, pitch, yaw),
        );
        Self::new(pose, config.vertical_fov_deg, config.aspect)
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn pose(&self) -> &Isometry3<f32> {
        &self.pose
    }

    /// Camera-local point to world space
    pub fn local_to_world(&self, local: &Point3<f32>) -> Point3<f32> {
        self.pose.transform_point(local)
    }

    /// Project a world point into viewport space.
    ///
    /// `x` and `y` are normalized viewport coordinates, `z` is the depth in
    /// front of the camera. Points at zero depth project to non-finite
    /// coordinates; points behind the camera are mirrored.
    pub fn world_to_viewport(&self, world: &Point3<f32>) -> Point3<f32> {
        let view = self.pose.inverse_transform_point(world);
        let half_height = view.z * self.tan_half_fov;
        let ndc_x = view.x / (half_height * self.aspect);
        let ndc_y = view.y / half_height;
        Point3::new(0.5 + 0.5 * ndc_x, 0.5 + 0.5 * ndc_y, view.z)
    }
}

impl Default for CameraModel {
    fn default() -> Self {
        Self::from_config(&CameraConfig::default())
    }
}
