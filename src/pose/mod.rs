//! Pose value types exchanged between the AR session and the VPS backend
pub mod render;

use crate::common::rotation::euler_to_rotation;
use crate::common::types::{EulerAngles, Position, Rotation};

/// A 6-DoF pose in the local AR reference frame.
///
/// Position in meters, angles in degrees. `EMPTY` (all NaN) marks an unset
/// pose; test for it with [`NodePose::is_empty`], never with `==`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodePose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl NodePose {
    pub const DEFAULT: NodePose = NodePose::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
    pub const EMPTY: NodePose =
        NodePose::new(f64::NAN, f64::NAN, f64::NAN, f64::NAN, f64::NAN, f64::NAN);

    /// Create a new node pose
    pub const fn new(x: f64, y: f64, z: f64, roll: f64, pitch: f64, yaw: f64) -> Self {
        NodePose {
            x,
            y,
            z,
            roll,
            pitch,
            yaw,
        }
    }

    /// Whether this pose is unset (any component NaN)
    pub fn is_empty(&self) -> bool {
        [self.x, self.y, self.z, self.roll, self.pitch, self.yaw]
            .iter()
            .any(|v| v.is_nan())
    }

    /// Position as stored, without any axis flip
    pub fn position(&self) -> Position {
        Position::new(self.x, self.y, self.z)
    }

    /// Euler angles in the crate's axis order: roll on x, yaw on y, pitch on z
    pub fn euler_angles(&self) -> EulerAngles {
        EulerAngles::new(self.roll, self.yaw, self.pitch)
    }

    /// Orientation as stored, without inversion
    pub fn orientation(&self) -> Rotation {
        euler_to_rotation(&self.euler_angles())
    }
}

impl Default for NodePose {
    fn default() -> Self {
        NodePose::DEFAULT
    }
}

/// A global pose: WGS84 position plus compass heading in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsPose {
    pub altitude: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub heading: f64,
}

impl GpsPose {
    pub const ZERO: GpsPose = GpsPose::new(0.0, 0.0, 0.0, 0.0);
    pub const EMPTY: GpsPose = GpsPose::new(f64::NAN, f64::NAN, f64::NAN, f64::NAN);

    /// Create a new GPS pose
    pub const fn new(altitude: f64, latitude: f64, longitude: f64, heading: f64) -> Self {
        GpsPose {
            altitude,
            latitude,
            longitude,
            heading,
        }
    }

    /// Whether this pose is unset (any component NaN)
    pub fn is_empty(&self) -> bool {
        [self.altitude, self.latitude, self.longitude, self.heading]
            .iter()
            .any(|v| v.is_nan())
    }
}

impl Default for GpsPose {
    fn default() -> Self {
        GpsPose::ZERO
    }
}

/// Correspondence between the local and global frames at the last fix.
///
/// Either both halves are populated or the pose is `EMPTY`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusedPose {
    node_pose: NodePose,
    gps_pose: GpsPose,
}

impl FusedPose {
    pub const EMPTY: FusedPose = FusedPose {
        node_pose: NodePose::EMPTY,
        gps_pose: GpsPose::EMPTY,
    };

    /// Pair a local and a global pose. Collapses to `EMPTY` if either half is unset.
    pub fn new(node_pose: NodePose, gps_pose: GpsPose) -> Self {
        if node_pose.is_empty() || gps_pose.is_empty() {
            return FusedPose::EMPTY;
        }
        FusedPose {
            node_pose,
            gps_pose,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.node_pose.is_empty()
    }

    pub fn node_pose(&self) -> &NodePose {
        &self.node_pose
    }

    pub fn gps_pose(&self) -> &GpsPose {
        &self.gps_pose
    }
}

impl Default for FusedPose {
    fn default() -> Self {
        FusedPose::EMPTY
    }
}

/// A raw sample from the device location provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsLocation {
    pub accuracy: f64,
    pub altitude: f64,
    pub latitude: f64,
    pub longitude: f64,
    /// Monotonic sample time in nanoseconds
    pub timestamp_nanos: u64,
}

impl GpsLocation {
    /// Global pose of this sample with the given compass heading
    pub fn to_gps_pose(&self, heading: f64) -> GpsPose {
        GpsPose::new(self.altitude, self.latitude, self.longitude, heading)
    }
}
