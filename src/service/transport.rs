//! Wire-level view of the localization backend
//!
//! The HTTP client, the multipart encoding and the JSON schema belong to the
//! embedding application. This module fixes what the driver hands to it and
//! what it must hand back.

use crate::error::Result;
use crate::perception::localization::LocalizationMode;
use crate::perception::sensors::CameraIntrinsics;
use crate::pose::{GpsLocation, GpsPose, NodePose};
use async_trait::async_trait;

/// Status string of a successful localization
pub const STATUS_DONE: &str = "done";

/// Payload of one frame, raw or already turned into features
#[derive(Debug, Clone, PartialEq)]
pub enum FramePayload {
    Image(Vec<u8>),
    Embedding(Vec<u8>),
}

impl FramePayload {
    pub fn bytes(&self) -> &[u8] {
        match self {
            FramePayload::Image(data) | FramePayload::Embedding(data) => data,
        }
    }
}

/// One frame of a request with the intrinsics it was captured under
#[derive(Debug, Clone, PartialEq)]
pub struct RequestFrame {
    pub payload: FramePayload,
    pub intrinsics: CameraIntrinsics,
}

/// One localization request
#[derive(Debug, Clone, PartialEq)]
pub struct LocalizationRequest {
    pub location_id: String,
    /// Localize from the images alone, ignoring `local_pos`
    pub force: bool,
    /// Local pose hint since the last fix, absent on forced requests
    pub local_pos: Option<NodePose>,
    pub gps: Option<GpsLocation>,
    /// Frames in capture order; the response refers to them by index
    pub frames: Vec<RequestFrame>,
}

impl LocalizationRequest {
    pub fn mode(&self) -> LocalizationMode {
        if self.force {
            LocalizationMode::Forced
        } else {
            LocalizationMode::Incremental
        }
    }
}

/// Decoded backend answer
#[derive(Debug, Clone, PartialEq)]
pub struct LocalizationResponse {
    pub status: String,
    /// Pose of the camera at capture time in the backend's frame
    pub relative_pose: Option<NodePose>,
    /// Global fix, heading taken from the compass block
    pub gps: Option<GpsPose>,
    /// Frame the fix belongs to when several were sent
    pub image_index: Option<usize>,
}

impl LocalizationResponse {
    /// A "done" response with only a relative pose
    pub fn done(relative_pose: NodePose) -> Self {
        LocalizationResponse {
            status: STATUS_DONE.to_string(),
            relative_pose: Some(relative_pose),
            gps: None,
            image_index: None,
        }
    }

    /// A response that did not localize
    pub fn with_status(status: impl Into<String>) -> Self {
        LocalizationResponse {
            status: status.into(),
            relative_pose: None,
            gps: None,
            image_index: None,
        }
    }

    pub fn with_gps(mut self, gps: GpsPose) -> Self {
        self.gps = Some(gps);
        self
    }

    pub fn with_image_index(mut self, index: usize) -> Self {
        self.image_index = Some(index);
        self
    }

    pub fn is_done(&self) -> bool {
        self.status == STATUS_DONE
    }
}

/// Client of the localization backend.
///
/// Any `Err` returned here ends the session: network faults and
/// undecodable payloads alike. A non-"done" status is not an error.
#[async_trait]
pub trait LocalizationTransport: Send + Sync {
    async fn localize(&self, request: LocalizationRequest) -> Result<LocalizationResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_done_status_counts_as_success() {
        assert!(LocalizationResponse::done(NodePose::DEFAULT).is_done());
        assert!(!LocalizationResponse::with_status("fail").is_done());
        assert!(!LocalizationResponse::with_status("DONE").is_done());
    }

    #[test]
    fn request_mode_follows_force_flag() {
        let mut request = LocalizationRequest {
            location_id: "office".to_string(),
            force: true,
            local_pos: None,
            gps: None,
            frames: vec![RequestFrame {
                payload: FramePayload::Image(vec![1, 2, 3]),
                intrinsics: CameraIntrinsics::EMPTY,
            }],
        };
        assert_eq!(request.mode(), LocalizationMode::Forced);
        request.force = false;
        assert_eq!(request.mode(), LocalizationMode::Incremental);
        assert_eq!(request.frames[0].payload.bytes(), &[1, 2, 3]);
    }
}
