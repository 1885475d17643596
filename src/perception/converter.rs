//! Conversion between local AR coordinates and GPS coordinates
//!
//! Anchored to the fused pose of the last successful localization. Local
//! positions are rotated by the heading difference between the AR frame and
//! compass north, then scaled into degrees using the Earth's meridian and
//! equatorial circumferences.

use crate::common::rotation::{to_radians, yaw_of};
use crate::pose::render::render_rotation;
use crate::pose::{FusedPose, GpsPose, NodePose};

const TWO_PI_DEGREES: f64 = 360.0;

/// Meters per degree of latitude
pub const MERIDIAN_ONE_DEGREE_DISTANCE: f64 = 40008.548 * 1000.0 / TWO_PI_DEGREES;

/// Meters per degree of longitude on the equator
pub const EQUATOR_ONE_DEGREE_DISTANCE: f64 = 40075.0 * 1000.0 / TWO_PI_DEGREES;

/// Meters per degree of longitude at the given latitude
pub fn longitude_degree_distance(latitude: f64) -> f64 {
    to_radians(latitude).cos() * EQUATOR_ONE_DEGREE_DISTANCE
}

/// Rotate a planar (x, z) point by `angle` degrees.
///
/// `x' = x cos + z sin`, `z' = x sin - z cos`. The map also mirrors the z
/// axis, so it is its own inverse.
pub fn rotated_coordinate(angle: f64, x: f64, z: f64) -> (f64, f64) {
    let rad = to_radians(angle);
    let (sin, cos) = rad.sin_cos();
    (x * cos + z * sin, x * sin - z * cos)
}

/// Wrap a heading into [0, 360) with a single correction step.
///
/// Values below -360 or at/above 720 stay out of range.
pub fn wrap_heading_once(heading: f64) -> f64 {
    if heading < 0.0 {
        heading + TWO_PI_DEGREES
    } else if heading >= TWO_PI_DEGREES {
        heading - TWO_PI_DEGREES
    } else {
        heading
    }
}

/// Global/local coordinate converter
#[derive(Debug, Clone)]
pub struct CoordinateConverter {
    fused_pose: FusedPose,
    angle_difference: f64,
}

impl Default for CoordinateConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl CoordinateConverter {
    /// Create a new converter with no fix
    pub fn new() -> Self {
        CoordinateConverter {
            fused_pose: FusedPose::EMPTY,
            angle_difference: 0.0,
        }
    }

    /// Anchor conversions to a new fused pose
    pub fn update_pose_model(&mut self, pose: FusedPose) {
        self.angle_difference = if pose.is_empty() {
            0.0
        } else {
            -(pose.gps_pose().heading - heading_of(pose.node_pose()))
        };
        self.fused_pose = pose;
        log::debug!(
            "fused pose updated, angle difference {:.3}",
            self.angle_difference
        );
    }

    /// Drop the fix, conversions return empty sentinels afterwards
    pub fn clear(&mut self) {
        self.update_pose_model(FusedPose::EMPTY);
    }

    pub fn fused_pose(&self) -> &FusedPose {
        &self.fused_pose
    }

    /// Rotation aligning the local frame with compass north, in degrees
    pub fn angle_difference(&self) -> f64 {
        self.angle_difference
    }

    /// Global pose of a local pose, `GpsPose::EMPTY` before the first fix
    pub fn convert_to_global_coordinate(&self, node_pose: &NodePose) -> GpsPose {
        if self.fused_pose.is_empty() {
            return GpsPose::EMPTY;
        }
        let fused_node = self.fused_pose.node_pose();
        let fused_gps = self.fused_pose.gps_pose();

        let angle = self.angle_difference;
        let (prev_x, prev_z) = rotated_coordinate(angle, fused_node.x, fused_node.z);
        let (cur_x, cur_z) = rotated_coordinate(angle, node_pose.x, node_pose.z);
        let dx = cur_x - prev_x;
        let dz = cur_z - prev_z;

        let latitude = fused_gps.latitude - dz / MERIDIAN_ONE_DEGREE_DISTANCE;
        let longitude = fused_gps.longitude + dx / longitude_degree_distance(fused_gps.latitude);
        let heading = wrap_heading_once(heading_of(node_pose) - self.angle_difference);

        GpsPose::new(fused_gps.altitude, latitude, longitude, heading)
    }

    /// Local pose of a global pose, `NodePose::EMPTY` before the first fix.
    ///
    /// Height is taken from the fix, the result only carries yaw.
    pub fn convert_to_local_coordinate(&self, gps_pose: &GpsPose) -> NodePose {
        if self.fused_pose.is_empty() {
            return NodePose::EMPTY;
        }
        let fused_node = self.fused_pose.node_pose();
        let fused_gps = self.fused_pose.gps_pose();

        let dx = (gps_pose.longitude - fused_gps.longitude)
            * longitude_degree_distance(fused_gps.latitude);
        let dz = (gps_pose.latitude - fused_gps.latitude) * MERIDIAN_ONE_DEGREE_DISTANCE;

        let (rx, rz) = rotated_coordinate(-self.angle_difference, dx, dz);
        let yaw = -gps_pose.heading - self.angle_difference;

        // undo the mirrored z axis of rotated_coordinate
        NodePose::new(fused_node.x + rx, fused_node.y, fused_node.z - rz, 0.0, 0.0, yaw)
    }
}

/// Heading-frame yaw of a local pose, taken from its renderable rotation
fn heading_of(pose: &NodePose) -> f64 {
    yaw_of(&render_rotation(pose))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moscow_fix(node_yaw: f64, heading: f64) -> CoordinateConverter {
        let mut converter = CoordinateConverter::new();
        converter.update_pose_model(FusedPose::new(
            NodePose::new(0.0, 0.0, 0.0, 0.0, 0.0, node_yaw),
            GpsPose::new(0.0, 55.0, 37.0, heading),
        ));
        converter
    }

    #[test]
    fn conversions_are_empty_without_fix() {
        let converter = CoordinateConverter::new();
        assert!(converter
            .convert_to_global_coordinate(&NodePose::new(1.0, 2.0, 3.0, 0.0, 0.0, 0.0))
            .is_empty());
        assert!(converter
            .convert_to_local_coordinate(&GpsPose::new(0.0, 55.0, 37.0, 10.0))
            .is_empty());
    }

    #[test]
    fn conversions_are_populated_after_fix() {
        let converter = moscow_fix(0.0, 90.0);
        assert!(!converter.convert_to_global_coordinate(&NodePose::DEFAULT).is_empty());
        assert!(!converter
            .convert_to_local_coordinate(&GpsPose::new(0.0, 55.0, 37.0, 0.0))
            .is_empty());
    }

    #[test]
    fn global_pose_reports_fused_altitude() {
        let mut converter = CoordinateConverter::new();
        converter.update_pose_model(FusedPose::new(
            NodePose::new(0.0, 0.0, 0.0, 0.0, 0.0, -90.0),
            GpsPose::new(152.5, 55.0, 37.0, 90.0),
        ));

        let pose = NodePose::new(3.0, 7.0, -2.0, 0.0, 0.0, 0.0);
        let gps = converter.convert_to_global_coordinate(&pose);
        assert_eq!(gps.altitude, 152.5);
    }

    #[test]
    fn clearing_restores_sentinels() {
        let mut converter = moscow_fix(0.0, 90.0);
        converter.clear();
        assert!(converter.convert_to_global_coordinate(&NodePose::DEFAULT).is_empty());
    }

    #[test]
    fn angle_difference_uses_renderable_yaw() {
        // renderable rotation inverts the pose, so a local yaw of -90 faces heading 90
        let converter = moscow_fix(-90.0, 90.0);
        assert!(converter.angle_difference().abs() < 1e-9);

        let converter = moscow_fix(0.0, 90.0);
        assert!((converter.angle_difference() + 90.0).abs() < 1e-9);
    }

    #[test]
    fn aligned_fix_moves_east_along_x() {
        let converter = moscow_fix(-90.0, 90.0);
        let pose = NodePose::new(10.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        let gps = converter.convert_to_global_coordinate(&pose);

        let equator_degree = 40075000.0 / 360.0;
        let expected_lon = 37.0 + 10.0 / (equator_degree * (55.0_f64).to_radians().cos());
        assert!((gps.longitude - expected_lon).abs() < 1e-12);
        assert!((gps.latitude - 55.0).abs() < 1e-12);
        assert!(gps.heading.abs() < 1e-9);
    }

    #[test]
    fn heading_offset_fix_turns_local_motion() {
        let converter = moscow_fix(0.0, 90.0);
        let pose = NodePose::new(10.0, 0.0, 0.0, 0.0, 0.0, 90.0);
        let gps = converter.convert_to_global_coordinate(&pose);

        // with a -90 degree difference the step lands on the meridian
        assert!((gps.longitude - 37.0).abs() < 1e-12);
        assert!((gps.latitude - (55.0 + 10.0 / MERIDIAN_ONE_DEGREE_DISTANCE)).abs() < 1e-12);
        assert!(gps.heading.abs() < 1e-9);
    }

    #[test]
    fn heading_wrap_is_single_step() {
        assert_eq!(wrap_heading_once(-10.0), 350.0);
        assert_eq!(wrap_heading_once(360.0), 0.0);
        assert_eq!(wrap_heading_once(400.0), 40.0);
        assert_eq!(wrap_heading_once(123.0), 123.0);

        for tenth in -3600..7200 {
            let wrapped = wrap_heading_once(tenth as f64 / 10.0);
            assert!((0.0..360.0).contains(&wrapped), "{} -> {}", tenth, wrapped);
        }

        // inputs further out keep their offset
        assert_eq!(wrap_heading_once(-400.0), -40.0);
        assert_eq!(wrap_heading_once(800.0), 440.0);
    }

    #[test]
    fn rotation_is_its_own_inverse() {
        let (x, z) = rotated_coordinate(37.0, 3.0, -8.0);
        let (bx, bz) = rotated_coordinate(37.0, x, z);
        assert!((bx - 3.0).abs() < 1e-12 && (bz + 8.0).abs() < 1e-12);
    }

    #[test]
    fn local_global_round_trip() {
        let mut converter = CoordinateConverter::new();
        converter.update_pose_model(FusedPose::new(
            NodePose::new(12.0, 1.4, -7.0, 0.0, 0.0, 33.0),
            GpsPose::new(140.0, 59.93, 30.31, 212.0),
        ));

        let samples = [
            (0.0, 0.0, 0.0),
            (15.0, -40.0, 45.0),
            (-250.0, 600.0, -120.0),
            (999.0, -999.0, 170.0),
            (-731.5, 12.25, -5.0),
        ];
        for (x, z, yaw) in samples {
            let local = NodePose::new(x, 1.4, z, 0.0, 0.0, yaw);
            let gps = converter.convert_to_global_coordinate(&local);
            let back = converter.convert_to_local_coordinate(&gps);

            assert!((back.x - x).abs() < 1e-3, "x {} -> {}", x, back.x);
            assert!((back.z - z).abs() < 1e-3, "z {} -> {}", z, back.z);
            assert_eq!(back.y, 1.4);

            let yaw_error = (back.yaw - yaw).rem_euclid(360.0);
            assert!(yaw_error < 1e-6 || yaw_error > 360.0 - 1e-6, "yaw {} -> {}", yaw, back.yaw);
        }
    }
}
