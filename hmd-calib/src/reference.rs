//! Reference positions sent to the engine for each calibration sample.

use hmd_wire::{ReferencePoint, UNIT_SCALE};
use nalgebra::Point3;

use crate::camera::CameraModel;
use crate::settings::CalibrationMode;

/// Compute the reference position of a target for the given mode.
///
/// * `TwoD` - the target is placed in the world through the camera pose and
///   projected to normalized viewport coordinates; only x and y are kept.
/// * `ThreeD` - the camera-local position with its Y axis divided by the
///   camera aspect ratio, scaled to protocol units (millimetres).
pub fn reference_position(
    mode: CalibrationMode,
    camera: &CameraModel,
    local: &Point3<f32>,
) -> ReferencePoint {
    match mode {
        CalibrationMode::TwoD => {
            let viewport = camera.world_to_viewport(&camera.local_to_world(local));
            ReferencePoint::Planar([viewport.x, viewport.y])
        }
        CalibrationMode::ThreeD => ReferencePoint::Spatial([
            local.x * UNIT_SCALE,
            local.y / camera.aspect() * UNIT_SCALE,
            local.z * UNIT_SCALE,
        ]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraConfig;
    use approx::assert_relative_eq;
    use nalgebra::Isometry3;

    #[test]
    fn test_three_d_scales_and_corrects_y() {
        let camera = CameraModel::new(Isometry3::identity(), 60.0, 2.0);
        let point = reference_position(
            CalibrationMode::ThreeD,
            &camera,
            &Point3::new(0.1, 0.2, 1.5),
        );
        let ReferencePoint::Spatial([x, y, z]) = point else {
            panic!("Expected spatial reference point");
        };
        assert_relative_eq!(x, 100.0, epsilon = 1e-3);
        assert_relative_eq!(y, 100.0, epsilon = 1e-3);
        assert_relative_eq!(z, 1500.0, epsilon = 1e-3);
    }

    #[test]
    fn test_three_d_ignores_camera_pose() {
        let moved = CameraModel::from_config(&CameraConfig {
            position: [3.0, 1.0, 2.0],
            rotation_deg: [0.0, 45.0, 0.0],
            aspect: 1.0,
            ..CameraConfig::default()
        });
        let point = reference_position(
            CalibrationMode::ThreeD,
            &moved,
            &Point3::new(0.0, 0.0, 2.0),
        );
        assert_eq!(point, ReferencePoint::Spatial([0.0, 0.0, 2000.0]));
    }

    #[test]
    fn test_two_d_center_target() {
        let camera = CameraModel::from_config(&CameraConfig {
            position: [0.5, 1.7, -1.0],
            rotation_deg: [0.0, 20.0, 0.0],
            ..CameraConfig::default()
        });
        let point = reference_position(
            CalibrationMode::TwoD,
            &camera,
            &Point3::new(0.0, 0.0, 2.0),
        );
        let ReferencePoint::Planar([x, y]) = point else {
            panic!("Expected planar reference point");
        };
        assert_relative_eq!(x, 0.5, epsilon = 1e-5);
        assert_relative_eq!(y, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn test_two_d_offset_target() {
        // 90 degree fov, square viewport: x = depth lands on the right edge
        let camera = CameraModel::new(Isometry3::identity(), 90.0, 1.0);
        let point = reference_position(
            CalibrationMode::TwoD,
            &camera,
            &Point3::new(1.0, -0.5, 1.0),
        );
        let ReferencePoint::Planar([x, y]) = point else {
            panic!("Expected planar reference point");
        };
        assert_relative_eq!(x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(y, 0.25, epsilon = 1e-6);
    }
}
