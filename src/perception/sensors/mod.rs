//! Device-side collaborators consumed by the fusion engine
//!
//! The AR session, the camera and the location provider live outside this
//! crate. They are reached through these traits and shared as
//! `Arc<dyn Trait>` between the service and its driver task.

use crate::common::matrix;
use crate::common::types::{ModelMatrix, Position, Rotation};
use crate::error::Result;
use crate::pose::GpsLocation;

/// Pinhole intrinsics of the image a frame was taken from, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    /// Sent when the session cannot report intrinsics
    pub const EMPTY: CameraIntrinsics = CameraIntrinsics::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        CameraIntrinsics { fx, fy, cx, cy }
    }
}

/// World pose of the AR camera
pub trait CameraPoseProvider: Send + Sync {
    fn world_position(&self) -> Position;

    fn world_rotation(&self) -> Rotation;

    /// Intrinsics of the current camera image, `EMPTY` when unknown
    fn intrinsics(&self) -> CameraIntrinsics {
        CameraIntrinsics::EMPTY
    }

    /// 4x4 model matrix of the camera, composed from position and rotation
    /// unless the session provides its own
    fn world_model_matrix(&self) -> ModelMatrix {
        matrix::model_matrix(&self.world_position(), &self.world_rotation())
    }
}

/// Source of encoded camera frames
pub trait FrameSource: Send + Sync {
    /// Grab the latest frame.
    ///
    /// Returns [`VpsError::ImageNotYetAvailable`](crate::error::VpsError::ImageNotYetAvailable)
    /// while the camera has nothing to hand out; callers retry.
    fn acquire_frame(&self) -> Result<Vec<u8>>;
}

/// On-device feature extractor turning a frame into an embedding
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, frame: &[u8]) -> Result<Vec<u8>>;
}

/// Device location provider
pub trait GpsSource: Send + Sync {
    /// Latest sample, if any arrived yet
    fn last_location(&self) -> Option<GpsLocation>;
}

/// Camera state saved at the moment a frame was captured
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraCapture {
    pub position: Position,
    pub rotation: Rotation,
    pub model_matrix: ModelMatrix,
    pub intrinsics: CameraIntrinsics,
}

impl CameraCapture {
    /// Snapshot the provider's current pose and intrinsics
    pub fn from_provider(provider: &dyn CameraPoseProvider) -> Self {
        CameraCapture {
            position: provider.world_position(),
            rotation: provider.world_rotation(),
            model_matrix: provider.world_model_matrix(),
            intrinsics: provider.intrinsics(),
        }
    }

    /// A capture whose matrix is derived from position and rotation, without
    /// intrinsics
    pub fn new(position: Position, rotation: Rotation) -> Self {
        CameraCapture {
            position,
            rotation,
            model_matrix: matrix::model_matrix(&position, &rotation),
            intrinsics: CameraIntrinsics::EMPTY,
        }
    }
}
