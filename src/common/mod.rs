//! Common utilities and types shared across the VPS core
pub mod matrix;
pub mod rotation;

/// Common types used across the codebase
pub mod types {
    use nalgebra::{Isometry3, Matrix4, UnitQuaternion, Vector3};

    /// A position or direction in the AR world frame (meters)
    pub type Position = Vector3<f64>;

    /// A rotation in the AR world frame
    pub type Rotation = UnitQuaternion<f64>;

    /// Column-major 4x4 model matrix as reported by the AR camera
    pub type ModelMatrix = Matrix4<f64>;

    /// A rigid transform in the AR world frame
    pub type Transform = Isometry3<f64>;

    /// Euler angles in degrees, stored as (x, y, z)
    pub type EulerAngles = Vector3<f64>;
}
