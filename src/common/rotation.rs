//! Angle and rotation helpers
//!
//! Euler angles follow the axis convention used throughout the crate:
//! `x` carries roll, `y` carries yaw (rotation about the vertical axis) and
//! `z` carries pitch. A rotation is composed as `Ry(y) * Rz(z) * Rx(x)`,
//! which is the order [`euler_from_rotation`] decomposes.

use super::types::{EulerAngles, Position, Rotation};
use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use std::f64::consts::{FRAC_PI_2, PI};

/// Singularity threshold on `x*y + z*w`.
///
/// Calibrated value carried over from the server-side tooling; at 0.5 the
/// attitude reaches exactly ±90°.
pub const GIMBAL_LOCK_THRESHOLD: f64 = 0.499;

/// Camera forward axis in the AR frame
pub const FORWARD: Vector3<f64> = Vector3::new(0.0, 0.0, 1.0);

const DEG_2_RAD: f64 = PI / 180.0;
const RAD_2_DEG: f64 = 180.0 / PI;

/// Convert degrees to radians
pub fn to_radians(degrees: f64) -> f64 {
    degrees * DEG_2_RAD
}

/// Convert radians to degrees
pub fn to_degrees(radians: f64) -> f64 {
    radians * RAD_2_DEG
}

/// Decompose a rotation into Euler angles in degrees.
///
/// Near the poles (`x*y + z*w` beyond ±0.499) the decomposition collapses to
/// two angles: roll is forced to zero, pitch to ±90° and yaw is taken from
/// `2 * atan2(x, w)`.
pub fn euler_from_rotation(rotation: &Rotation) -> EulerAngles {
    let q = rotation.quaternion();
    let (x, y, z, w) = (q.i, q.j, q.k, q.w);

    let test = x * y + z * w;
    if test > GIMBAL_LOCK_THRESHOLD {
        // north pole
        let yaw = 2.0 * x.atan2(w);
        return Vector3::new(0.0, to_degrees(yaw), to_degrees(FRAC_PI_2));
    }
    if test < -GIMBAL_LOCK_THRESHOLD {
        // south pole
        let yaw = -2.0 * x.atan2(w);
        return Vector3::new(0.0, to_degrees(yaw), to_degrees(-FRAC_PI_2));
    }

    let sqx = x * x;
    let sqy = y * y;
    let sqz = z * z;
    let yaw = (2.0 * y * w - 2.0 * x * z).atan2(1.0 - 2.0 * sqy - 2.0 * sqz);
    let pitch = (2.0 * test).asin();
    let roll = (2.0 * x * w - 2.0 * y * z).atan2(1.0 - 2.0 * sqx - 2.0 * sqz);

    Vector3::new(to_degrees(roll), to_degrees(yaw), to_degrees(pitch))
}

/// Build a rotation from Euler angles in degrees, inverse of [`euler_from_rotation`].
pub fn euler_to_rotation(angles: &EulerAngles) -> Rotation {
    let ry = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), to_radians(angles.y));
    let rz = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), to_radians(angles.z));
    let rx = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), to_radians(angles.x));
    ry * rz * rx
}

/// Yaw component of a rotation, in degrees
pub fn yaw_of(rotation: &Rotation) -> f64 {
    euler_from_rotation(rotation).y
}

/// Rotation about the vertical axis only
pub fn rotation_about_vertical(yaw_degrees: f64) -> Rotation {
    euler_to_rotation(&Vector3::new(0.0, yaw_degrees, 0.0))
}

/// Rotation encoding only the yaw reported by the server.
///
/// Positive yaw is mirrored to `180 - yaw` before inverting. The server's
/// relative yaw uses this sign convention, so the branch must stay as is.
pub fn rotation_from_yaw_only(yaw: f64) -> Rotation {
    let angle = if yaw > 0.0 { 180.0 - yaw } else { yaw };
    rotation_about_vertical(angle).inverse()
}

/// Rotation that maps [`FORWARD`] onto the horizontal projection of the
/// rotated forward vector, dropping pitch and roll.
pub fn flatten_forward_to_horizontal(rotation: &Rotation) -> Rotation {
    let mut direction: Position = rotation * FORWARD;
    direction.y = 0.0;

    // rotation_between yields None only for antiparallel vectors
    UnitQuaternion::rotation_between(&FORWARD, &direction)
        .unwrap_or_else(|| UnitQuaternion::from_axis_angle(&Vector3::y_axis(), PI))
}

/// Whether two rotations describe the same orientation, up to quaternion sign.
pub fn same_orientation(a: &Rotation, b: &Rotation, tolerance: f64) -> bool {
    let qa: &Quaternion<f64> = a.quaternion();
    let qb: &Quaternion<f64> = b.quaternion();
    (qa.coords.dot(&qb.coords).abs() - 1.0).abs() <= tolerance
}
