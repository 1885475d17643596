//! Smoothing of anchor transforms between localization fixes

use crate::common::rotation::FORWARD;
use crate::common::types::{Position, Rotation, Transform};
use nalgebra::Translation3;
use std::time::Duration;

/// Largest position jump in meters that is interpolated instead of snapped
pub const DISTANCE_LIMIT: f64 = 2.0;

/// Largest change of the forward direction in degrees that is interpolated
/// instead of snapped
pub const ANGLE_LIMIT: f64 = 10.0;

/// Moves the anchored world towards the latest fix over a fixed duration.
///
/// Small corrections are blended linearly (position) and spherically
/// (rotation); large ones snap at once so content never sweeps across the
/// scene.
#[derive(Debug, Clone)]
pub struct PoseInterpolator {
    start: Transform,
    target: Transform,
    current: Transform,
    duration: Duration,
    elapsed: Duration,
    blend_position: bool,
    blend_rotation: bool,
}

impl Default for PoseInterpolator {
    fn default() -> Self {
        Self::new()
    }
}

impl PoseInterpolator {
    /// Create a new interpolator resting at the identity
    pub fn new() -> Self {
        PoseInterpolator {
            start: Transform::identity(),
            target: Transform::identity(),
            current: Transform::identity(),
            duration: Duration::ZERO,
            elapsed: Duration::ZERO,
            blend_position: false,
            blend_rotation: false,
        }
    }

    /// Start moving towards `target`, reaching it after `duration`.
    ///
    /// The blend always starts from the current transform, so the first
    /// target after a reset is approached from the identity under the same
    /// limits.
    pub fn retarget(&mut self, target: Transform, duration: Duration) {
        self.start = self.current;
        self.target = target;
        self.duration = duration;
        self.elapsed = Duration::ZERO;

        let distance = (target.translation.vector - self.start.translation.vector).norm();
        let angle = (self.start.rotation * FORWARD)
            .angle(&(target.rotation * FORWARD))
            .to_degrees();
        self.blend_position = distance < DISTANCE_LIMIT;
        self.blend_rotation = angle < ANGLE_LIMIT;
        log::trace!(
            "anchor retarget: {:.3} m, {:.3} deg, blend position {}, blend rotation {}",
            distance,
            angle,
            self.blend_position,
            self.blend_rotation
        );

        if !self.blend_position || !self.blend_rotation {
            self.current = self.sample();
        }
    }

    /// Advance the blend by `dt` and return the transform to render
    pub fn advance(&mut self, dt: Duration) -> Transform {
        self.elapsed = (self.elapsed + dt).min(self.duration);
        self.current = self.sample();
        self.current
    }

    /// Transform as of the last update
    pub fn current(&self) -> Transform {
        self.current
    }

    /// Whether the latest target has been reached
    pub fn is_settled(&self) -> bool {
        self.elapsed >= self.duration
    }

    /// Forget all targets and rest at the identity again
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn progress(&self) -> f64 {
        if self.duration.is_zero() {
            1.0
        } else {
            (self.elapsed.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0)
        }
    }

    fn sample(&self) -> Transform {
        let t = self.progress();

        let position: Position = if self.blend_position {
            self.start
                .translation
                .vector
                .lerp(&self.target.translation.vector, t)
        } else {
            self.target.translation.vector
        };

        let rotation: Rotation = if self.blend_rotation {
            self.start
                .rotation
                .try_slerp(&self.target.rotation, t, 1e-9)
                .unwrap_or(self.target.rotation)
        } else {
            self.target.rotation
        };

        Transform::from_parts(Translation3::from(position), rotation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::rotation::{rotation_about_vertical, same_orientation};

    const EPS: f64 = 1e-9;
    const STEP: Duration = Duration::from_millis(500);

    fn at(x: f64, yaw: f64) -> Transform {
        Transform::from_parts(
            Translation3::new(x, 0.0, 0.0),
            rotation_about_vertical(yaw),
        )
    }

    #[test]
    fn distant_first_target_snaps() {
        let mut interpolator = PoseInterpolator::new();
        interpolator.retarget(at(5.0, 30.0), STEP);
        let current = interpolator.current();
        assert!((current.translation.vector.x - 5.0).abs() < EPS);
        assert!(same_orientation(&current.rotation, &rotation_about_vertical(30.0), EPS));
    }

    #[test]
    fn near_first_target_blends_from_identity() {
        let mut interpolator = PoseInterpolator::new();
        interpolator.retarget(at(1.0, 5.0), STEP);
        assert!(interpolator.current().translation.vector.norm() < EPS);

        let halfway = interpolator.advance(Duration::from_millis(250));
        assert!((halfway.translation.vector.x - 0.5).abs() < EPS);
        assert!(same_orientation(&halfway.rotation, &rotation_about_vertical(2.5), 1e-9));

        let end = interpolator.advance(STEP);
        assert!((end.translation.vector.x - 1.0).abs() < EPS);
        assert!(interpolator.is_settled());
    }

    #[test]
    fn small_corrections_are_blended() {
        let mut interpolator = PoseInterpolator::new();
        interpolator.retarget(at(0.0, 0.0), STEP);
        interpolator.retarget(at(1.0, 8.0), STEP);

        let halfway = interpolator.advance(Duration::from_millis(250));
        assert!((halfway.translation.vector.x - 0.5).abs() < EPS);
        assert!(same_orientation(&halfway.rotation, &rotation_about_vertical(4.0), 1e-9));
        assert!(!interpolator.is_settled());

        let end = interpolator.advance(Duration::from_millis(400));
        assert!((end.translation.vector.x - 1.0).abs() < EPS);
        assert!(interpolator.is_settled());
    }

    #[test]
    fn large_jumps_snap() {
        let mut interpolator = PoseInterpolator::new();
        interpolator.retarget(at(0.0, 0.0), STEP);
        interpolator.retarget(at(3.0, 45.0), STEP);

        let current = interpolator.current();
        assert!((current.translation.vector.x - 3.0).abs() < EPS);
        assert!(same_orientation(&current.rotation, &rotation_about_vertical(45.0), EPS));
    }

    #[test]
    fn position_and_rotation_snap_independently() {
        let mut interpolator = PoseInterpolator::new();
        interpolator.retarget(at(0.0, 0.0), STEP);
        interpolator.retarget(at(1.0, 90.0), STEP);

        // rotation snapped, position still blending
        let current = interpolator.advance(Duration::from_millis(250));
        assert!((current.translation.vector.x - 0.5).abs() < EPS);
        assert!(same_orientation(&current.rotation, &rotation_about_vertical(90.0), EPS));
    }

    #[test]
    fn zero_duration_jumps_to_target() {
        let mut interpolator = PoseInterpolator::new();
        interpolator.retarget(at(0.0, 0.0), STEP);
        interpolator.retarget(at(0.5, 0.0), Duration::ZERO);
        let current = interpolator.advance(Duration::ZERO);
        assert!((current.translation.vector.x - 0.5).abs() < EPS);
    }

    #[test]
    fn reset_returns_to_identity() {
        let mut interpolator = PoseInterpolator::new();
        interpolator.retarget(at(4.0, 0.0), STEP);
        interpolator.reset();
        assert!(interpolator.current().translation.vector.norm() < EPS);
    }
}
