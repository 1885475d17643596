//! Conversions from poses to the transforms handed to the rendering layer

use super::NodePose;
use crate::common::rotation::{flatten_forward_to_horizontal, rotation_from_yaw_only};
use crate::common::types::{Position, Rotation, Transform};
use nalgebra::Translation3;

/// Renderable position of a pose: all axes negated.
pub fn render_position(pose: &NodePose) -> Position {
    Position::new(-pose.x, -pose.y, -pose.z)
}

/// Renderable rotation of a pose: the inverse of its Euler orientation.
pub fn render_rotation(pose: &NodePose) -> Rotation {
    pose.orientation().inverse()
}

/// Rotation applied to the anchored content for a server pose.
///
/// Only the yaw survives, using the server's mirrored sign convention.
pub fn anchor_rotation(pose: &NodePose) -> Rotation {
    rotation_from_yaw_only(pose.yaw)
}

/// World transform of content anchored by a localization fix.
///
/// Composes the chain camera start → server rotation → server position:
/// the camera pose saved when the frame was captured is flattened to a
/// yaw-only orientation, then the server's relative pose is applied.
pub fn anchor_transform(
    camera_position: &Position,
    camera_rotation: &Rotation,
    pose: &NodePose,
) -> Transform {
    let camera_start = Transform::from_parts(
        Translation3::from(*camera_position),
        flatten_forward_to_horizontal(camera_rotation),
    );
    let rotation_node = Transform::from_parts(Translation3::identity(), anchor_rotation(pose));
    let position_node = Transform::from_parts(
        Translation3::from(render_position(pose)),
        Rotation::identity(),
    );

    camera_start * rotation_node * position_node
}
