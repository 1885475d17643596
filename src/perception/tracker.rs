//! Local delta tracking between localization attempts
//!
//! At every fix the tracker remembers the server's local pose together with
//! the camera model matrix at capture time. Later it expresses the camera's
//! movement since then in a frame rotated about the vertical axis, and adds
//! it to the remembered pose to form the hint of an incremental request.

use crate::common::matrix;
use crate::common::rotation::{
    euler_from_rotation, euler_to_rotation, rotation_about_vertical, yaw_of,
};
use crate::common::types::{ModelMatrix, Position, Rotation};
use crate::pose::NodePose;

#[derive(Debug, Clone, Copy)]
struct Reference {
    local_pose: NodePose,
    camera_position: Position,
}

/// Tracks device motion relative to the last fix
#[derive(Debug, Clone, Default)]
pub struct LocalDeltaTracker {
    reference: Option<Reference>,
    rotation_angle: f64,
}

impl LocalDeltaTracker {
    /// Create a new tracker without a reference
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a new fix and recompute the reference rotation angle.
    ///
    /// The angle is the yaw of the fix orientation plus the yaw obtained by
    /// reading the capture translation as Euler angles.
    pub fn record_fix(&mut self, local_pose: NodePose, camera_transform: &ModelMatrix) {
        let camera_position = matrix::translation(camera_transform);

        let pose_yaw = yaw_of(&local_pose.orientation());
        let camera_yaw = yaw_of(&euler_to_rotation(&camera_position));
        self.rotation_angle = pose_yaw + camera_yaw;

        self.reference = Some(Reference {
            local_pose,
            camera_position,
        });
        log::debug!("tracker reference updated, rotation angle {:.3}", self.rotation_angle);
    }

    /// Forget the reference, e.g. when the session stops
    pub fn clear(&mut self) {
        self.reference = None;
        self.rotation_angle = 0.0;
    }

    pub fn has_reference(&self) -> bool {
        self.reference.is_some()
    }

    /// Cached yaw of the reference frame in degrees
    pub fn rotation_angle(&self) -> f64 {
        self.rotation_angle
    }

    /// Local pose of the device now, or `None` before the first fix.
    ///
    /// Both camera positions are rotated by the reference angle before
    /// differencing. The orientation is the current camera rotation under the
    /// same rotation, mapped back as roll = x, pitch = z, yaw = y.
    pub fn local_pose_hint(
        &self,
        camera_position: &Position,
        camera_rotation: &Rotation,
    ) -> Option<NodePose> {
        let reference = self.reference?;
        let frame = rotation_about_vertical(self.rotation_angle);

        let last = frame * reference.camera_position;
        let current = frame * camera_position;
        let delta = current - last;

        let angles = euler_from_rotation(&(frame * camera_rotation));
        let base = reference.local_pose;

        Some(NodePose::new(
            base.x + delta.x,
            base.y + delta.y,
            base.z + delta.z,
            angles.x,
            angles.z,
            angles.y,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::matrix::model_matrix;
    use nalgebra::Vector3;

    const EPS: f64 = 1e-9;

    fn camera_at(position: Position) -> ModelMatrix {
        model_matrix(&position, &Rotation::identity())
    }

    #[test]
    fn no_hint_before_first_fix() {
        let tracker = LocalDeltaTracker::new();
        assert!(!tracker.has_reference());
        assert!(tracker
            .local_pose_hint(&Position::zeros(), &Rotation::identity())
            .is_none());
    }

    #[test]
    fn unrotated_frame_adds_plain_delta() {
        let mut tracker = LocalDeltaTracker::new();
        let fix = NodePose::new(10.0, 1.0, -4.0, 0.0, 0.0, 0.0);
        tracker.record_fix(fix, &camera_at(Position::zeros()));
        assert_eq!(tracker.rotation_angle(), 0.0);

        let hint = tracker
            .local_pose_hint(&Position::new(0.5, 0.0, 2.0), &Rotation::identity())
            .unwrap();
        assert!((hint.x - 10.5).abs() < EPS);
        assert!((hint.y - 1.0).abs() < EPS);
        assert!((hint.z + 2.0).abs() < EPS);
        assert!(hint.roll.abs() < EPS && hint.pitch.abs() < EPS && hint.yaw.abs() < EPS);
    }

    #[test]
    fn delta_is_rotated_by_fix_yaw() {
        let mut tracker = LocalDeltaTracker::new();
        let fix = NodePose::new(0.0, 0.0, 0.0, 0.0, 0.0, 90.0);
        tracker.record_fix(fix, &camera_at(Position::zeros()));
        assert!((tracker.rotation_angle() - 90.0).abs() < EPS);

        // moving along +z becomes +x under a 90 degree yaw
        let hint = tracker
            .local_pose_hint(&Position::new(0.0, 0.0, 1.0), &Rotation::identity())
            .unwrap();
        assert!((hint.x - 1.0).abs() < EPS);
        assert!(hint.z.abs() < EPS);
        assert!((hint.yaw - 90.0).abs() < EPS);
    }

    #[test]
    fn camera_tilt_maps_to_roll_and_pitch() {
        let tilted = euler_to_rotation(&Vector3::new(10.0, 0.0, 20.0));

        let mut tracker = LocalDeltaTracker::new();
        tracker.record_fix(NodePose::DEFAULT, &camera_at(Position::zeros()));
        let hint = tracker.local_pose_hint(&Position::zeros(), &tilted).unwrap();
        assert!((hint.roll - 10.0).abs() < EPS);
        assert!((hint.pitch - 20.0).abs() < EPS);
        assert!(hint.yaw.abs() < EPS);

        // the reference yaw is added without disturbing the tilt
        let fix = NodePose::new(0.0, 0.0, 0.0, 0.0, 0.0, 90.0);
        tracker.record_fix(fix, &camera_at(Position::zeros()));
        let hint = tracker.local_pose_hint(&Position::zeros(), &tilted).unwrap();
        assert!((hint.roll - 10.0).abs() < EPS);
        assert!((hint.pitch - 20.0).abs() < EPS);
        assert!((hint.yaw - 90.0).abs() < EPS);
    }

    #[test]
    fn capture_translation_contributes_to_angle() {
        let mut tracker = LocalDeltaTracker::new();
        tracker.record_fix(NodePose::DEFAULT, &camera_at(Position::new(0.0, 30.0, 0.0)));
        assert!((tracker.rotation_angle() - 30.0).abs() < EPS);

        // no movement since capture means no delta, whatever the angle
        let hint = tracker
            .local_pose_hint(&Position::new(0.0, 30.0, 0.0), &Rotation::identity())
            .unwrap();
        assert!(hint.x.abs() < EPS && hint.y.abs() < EPS && hint.z.abs() < EPS);
    }

    #[test]
    fn clear_drops_reference() {
        let mut tracker = LocalDeltaTracker::new();
        tracker.record_fix(NodePose::DEFAULT, &camera_at(Position::zeros()));
        tracker.clear();
        assert!(!tracker.has_reference());
    }
}
