//! Pose fusion for the VPS client
//!
//! [`FusionEngine`] owns every piece of state a localization attempt reads
//! or writes: the request policy, the delta tracker, the GPS converter and
//! the anchor interpolation. The service keeps it behind one mutex so a
//! request is always built from a consistent snapshot.
pub mod converter;
pub mod filters;
pub mod localization;
pub mod sensors;
pub mod tracker;

use self::converter::CoordinateConverter;
use self::filters::PoseInterpolator;
use self::localization::{LocalizationMode, LocalizationStateMachine};
use self::sensors::{CameraCapture, CameraIntrinsics};
use self::tracker::LocalDeltaTracker;
use crate::common::types::Transform;
use crate::error::{Result, VpsError};
use crate::pose::render::anchor_transform;
use crate::pose::{FusedPose, GpsLocation, GpsPose, NodePose};
use crate::service::transport::{
    FramePayload, LocalizationRequest, LocalizationResponse, RequestFrame,
};
use std::time::Duration;

/// What one attempt will send, decided before any frame is captured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptPlan {
    /// Generation the attempt belongs to; a stop invalidates it
    pub generation: u64,
    pub mode: LocalizationMode,
    /// Frames to capture for this attempt
    pub frame_count: usize,
}

/// A successful localization as applied to the engine
#[derive(Debug, Clone, PartialEq)]
pub struct LocalizationUpdate {
    /// Server pose of the camera at capture time
    pub pose: NodePose,
    /// Fused pose after the update, `EMPTY` if no GPS fix was ever received
    pub fused_pose: FusedPose,
    /// Target world transform of the anchored content
    pub anchor: Transform,
    pub image_index: usize,
}

/// Result of one localization attempt
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Localized(LocalizationUpdate),
    /// Backend answered without a fix
    Failed { failure_count: u32 },
    /// No frame could be captured, nothing was sent
    Skipped,
    /// Result of an attempt that was cancelled by a stop
    Discarded,
}

/// Single owner of the pose-fusion state
#[derive(Debug, Clone)]
pub struct FusionEngine {
    machine: LocalizationStateMachine,
    tracker: LocalDeltaTracker,
    converter: CoordinateConverter,
    interpolator: PoseInterpolator,
    generation: u64,
}

impl FusionEngine {
    /// Create a new engine with no fix
    pub fn new(only_force: bool, escalation_threshold: u32) -> Self {
        FusionEngine {
            machine: LocalizationStateMachine::new(only_force)
                .with_escalation_threshold(escalation_threshold),
            tracker: LocalDeltaTracker::new(),
            converter: CoordinateConverter::new(),
            interpolator: PoseInterpolator::new(),
            generation: 0,
        }
    }

    /// Decide the mode and frame count of the next attempt.
    ///
    /// Several frames are captured only for the first localization.
    pub fn plan_attempt(&mut self, count_images: usize) -> AttemptPlan {
        let mut mode = self.machine.request_mode();
        if mode == LocalizationMode::Incremental && !self.tracker.has_reference() {
            mode = LocalizationMode::Forced;
        }
        let frame_count = if self.machine.first_localization_done() {
            1
        } else {
            count_images.max(1)
        };
        AttemptPlan {
            generation: self.generation,
            mode,
            frame_count,
        }
    }

    /// Assemble the request for a planned attempt.
    ///
    /// Each frame is paired with the intrinsics of its capture. Incremental
    /// requests carry the pose hint for the camera pose of the last captured
    /// frame.
    pub fn build_request(
        &self,
        plan: &AttemptPlan,
        location_id: &str,
        frames: Vec<FramePayload>,
        captures: &[CameraCapture],
        gps: Option<GpsLocation>,
    ) -> LocalizationRequest {
        let local_pos = match (plan.mode, captures.last()) {
            (LocalizationMode::Incremental, Some(capture)) => self
                .tracker
                .local_pose_hint(&capture.position, &capture.rotation),
            _ => None,
        };
        let force = local_pos.is_none();

        log::debug!(
            "building localization request: force {}, failures {}, frames {}",
            force,
            self.machine.failure_count(),
            frames.len()
        );

        let frames = frames
            .into_iter()
            .enumerate()
            .map(|(index, payload)| RequestFrame {
                payload,
                intrinsics: captures
                    .get(index)
                    .map(|capture| capture.intrinsics)
                    .unwrap_or(CameraIntrinsics::EMPTY),
            })
            .collect();

        LocalizationRequest {
            location_id: location_id.to_string(),
            force,
            local_pos,
            gps,
            frames,
        }
    }

    /// Fold a backend response into the engine.
    ///
    /// Responses from an older generation are dropped without touching any
    /// state. A "done" response missing its pose, or pointing at a frame that
    /// was never captured, is a protocol error.
    pub fn apply_response(
        &mut self,
        generation: u64,
        response: &LocalizationResponse,
        captures: &[CameraCapture],
        blend: Duration,
    ) -> Result<AttemptOutcome> {
        if generation != self.generation {
            log::debug!(
                "discarding response of generation {} (current {})",
                generation,
                self.generation
            );
            return Ok(AttemptOutcome::Discarded);
        }

        if !response.is_done() {
            let failure_count = self.machine.on_failure();
            log::debug!(
                "localization failed with status {:?}, failures {}",
                response.status,
                failure_count
            );
            return Ok(AttemptOutcome::Failed { failure_count });
        }

        let pose = response
            .relative_pose
            .filter(|pose| !pose.is_empty())
            .ok_or_else(|| {
                VpsError::MalformedResponse("done status without relative pose".to_string())
            })?;
        let image_index = response.image_index.unwrap_or(0);
        let capture = captures
            .get(image_index)
            .ok_or(VpsError::UnknownImageIndex(image_index))?;

        self.machine.on_success();
        self.tracker.record_fix(pose, &capture.model_matrix);
        if let Some(gps) = response.gps {
            let fused = FusedPose::new(pose, gps);
            if fused.is_empty() {
                log::warn!(
                    "ignoring incomplete gps fix {:?}, keeping the previous fused pose",
                    gps
                );
            } else {
                self.converter.update_pose_model(fused);
            }
        }

        let anchor = anchor_transform(&capture.position, &capture.rotation, &pose);
        self.interpolator.retarget(anchor, blend);

        Ok(AttemptOutcome::Localized(LocalizationUpdate {
            pose,
            fused_pose: *self.converter.fused_pose(),
            anchor,
            image_index,
        }))
    }

    /// Invalidate in-flight attempts and return the policy to its initial state.
    ///
    /// The fused pose survives so conversions keep working while stopped.
    pub fn stop(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.machine.reset();
        self.tracker.clear();
    }

    /// Drop everything including the fused pose and the anchor
    pub fn reset(&mut self) {
        self.stop();
        self.converter.clear();
        self.interpolator.reset();
    }

    /// Replace the request policy with a fresh one, as when a session starts
    pub fn set_policy(&mut self, only_force: bool, escalation_threshold: u32) {
        self.machine = LocalizationStateMachine::new(only_force)
            .with_escalation_threshold(escalation_threshold);
    }

    pub fn enable_force_localization(&mut self, enabled: bool) {
        self.machine.enable_force_localization(enabled);
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn mode(&self) -> LocalizationMode {
        self.machine.mode()
    }

    pub fn failure_count(&self) -> u32 {
        self.machine.failure_count()
    }

    pub fn is_localized(&self) -> bool {
        self.machine.first_localization_done()
    }

    pub fn fused_pose(&self) -> FusedPose {
        *self.converter.fused_pose()
    }

    pub fn convert_to_global_coordinate(&self, node_pose: &NodePose) -> GpsPose {
        self.converter.convert_to_global_coordinate(node_pose)
    }

    pub fn convert_to_local_coordinate(&self, gps_pose: &GpsPose) -> NodePose {
        self.converter.convert_to_local_coordinate(gps_pose)
    }

    /// Step the anchor blend and return the transform to render
    pub fn advance_anchor(&mut self, dt: Duration) -> Transform {
        self.interpolator.advance(dt)
    }

    pub fn anchor(&self) -> Transform {
        self.interpolator.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{Position, Rotation};

    const BLEND: Duration = Duration::from_millis(500);

    fn capture_at(x: f64, z: f64) -> CameraCapture {
        CameraCapture::new(Position::new(x, 0.0, z), Rotation::identity())
    }

    fn frame() -> Vec<FramePayload> {
        vec![FramePayload::Image(vec![0u8; 4])]
    }

    fn localize(
        engine: &mut FusionEngine,
        pose: NodePose,
        capture: CameraCapture,
    ) -> AttemptOutcome {
        let plan = engine.plan_attempt(1);
        engine
            .apply_response(plan.generation, &LocalizationResponse::done(pose), &[capture], BLEND)
            .unwrap()
    }

    #[test]
    fn first_request_is_forced_without_hint() {
        let mut engine = FusionEngine::new(false, 2);
        let plan = engine.plan_attempt(1);
        assert_eq!(plan.mode, LocalizationMode::Forced);

        let captures = [capture_at(0.0, 0.0)];
        let request = engine.build_request(&plan, "office", frame(), &captures, None);
        assert!(request.force);
        assert!(request.local_pos.is_none());
        assert_eq!(request.location_id, "office");
    }

    #[test]
    fn frames_carry_capture_intrinsics() {
        let mut engine = FusionEngine::new(false, 2);
        let plan = engine.plan_attempt(2);
        let mut capture = capture_at(0.0, 0.0);
        capture.intrinsics = CameraIntrinsics::new(500.0, 500.0, 320.0, 240.0);
        let frames = vec![
            FramePayload::Image(vec![1]),
            FramePayload::Embedding(vec![2]),
        ];

        let request = engine.build_request(&plan, "office", frames, &[capture], None);
        assert_eq!(request.frames.len(), 2);
        assert_eq!(request.frames[0].intrinsics, capture.intrinsics);
        assert_eq!(request.frames[0].payload, FramePayload::Image(vec![1]));
        // no capture recorded for the second frame
        assert_eq!(request.frames[1].intrinsics, CameraIntrinsics::EMPTY);
    }

    #[test]
    fn success_enables_incremental_requests_with_hint() {
        let mut engine = FusionEngine::new(false, 2);
        let pose = NodePose::new(5.0, 0.0, 5.0, 0.0, 0.0, 0.0);
        let outcome = localize(&mut engine, pose, capture_at(0.0, 0.0));
        assert!(matches!(outcome, AttemptOutcome::Localized(_)));

        let plan = engine.plan_attempt(1);
        assert_eq!(plan.mode, LocalizationMode::Incremental);
        let captures = [capture_at(1.0, 0.0)];
        let request = engine.build_request(&plan, "office", frame(), &captures, None);
        assert!(!request.force);
        let hint = request.local_pos.unwrap();
        assert!((hint.x - 6.0).abs() < 1e-9);
        assert!((hint.z - 5.0).abs() < 1e-9);
    }

    #[test]
    fn failures_count_and_escalate() {
        let mut engine = FusionEngine::new(false, 2);
        localize(&mut engine, NodePose::DEFAULT, capture_at(0.0, 0.0));

        for expected in 1..=2 {
            let plan = engine.plan_attempt(1);
            let fail = LocalizationResponse::with_status("fail");
            let outcome = engine
                .apply_response(plan.generation, &fail, &[], BLEND)
                .unwrap();
            assert_eq!(outcome, AttemptOutcome::Failed { failure_count: expected });
        }
        assert_eq!(engine.plan_attempt(1).mode, LocalizationMode::Forced);
    }

    #[test]
    fn stale_generation_is_discarded() {
        let mut engine = FusionEngine::new(false, 2);
        let plan = engine.plan_attempt(1);
        engine.stop();

        let outcome = engine
            .apply_response(
                plan.generation,
                &LocalizationResponse::done(NodePose::DEFAULT),
                &[capture_at(0.0, 0.0)],
                BLEND,
            )
            .unwrap();
        assert_eq!(outcome, AttemptOutcome::Discarded);
        assert!(!engine.is_localized());
        assert_eq!(engine.failure_count(), 0);
    }

    #[test]
    fn done_without_pose_is_malformed() {
        let mut engine = FusionEngine::new(false, 2);
        let plan = engine.plan_attempt(1);
        let mut response = LocalizationResponse::done(NodePose::DEFAULT);
        response.relative_pose = None;

        let captures = [capture_at(0.0, 0.0)];
        let result = engine.apply_response(plan.generation, &response, &captures, BLEND);
        assert!(matches!(result, Err(VpsError::MalformedResponse(_))));
        assert!(!engine.is_localized());
    }

    #[test]
    fn serial_images_pick_capture_by_index() {
        let mut engine = FusionEngine::new(false, 2);
        let plan = engine.plan_attempt(3);
        assert_eq!(plan.frame_count, 3);

        let captures = [capture_at(0.0, 0.0), capture_at(2.0, 0.0), capture_at(4.0, 0.0)];
        let response = LocalizationResponse::done(NodePose::DEFAULT).with_image_index(2);
        let outcome = engine
            .apply_response(plan.generation, &response, &captures, BLEND)
            .unwrap();

        match outcome {
            AttemptOutcome::Localized(update) => {
                assert_eq!(update.image_index, 2);
                assert!((update.anchor.translation.vector.x - 4.0).abs() < 1e-9);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        // after the first fix a single frame is enough
        assert_eq!(engine.plan_attempt(3).frame_count, 1);
    }

    #[test]
    fn unknown_image_index_is_an_error() {
        let mut engine = FusionEngine::new(false, 2);
        let plan = engine.plan_attempt(2);
        let response = LocalizationResponse::done(NodePose::DEFAULT).with_image_index(5);
        let captures = [capture_at(0.0, 0.0)];
        let result = engine.apply_response(plan.generation, &response, &captures, BLEND);
        assert!(matches!(result, Err(VpsError::UnknownImageIndex(5))));
    }

    #[test]
    fn gps_fix_updates_converter() {
        let mut engine = FusionEngine::new(true, 2);
        assert!(engine.convert_to_global_coordinate(&NodePose::DEFAULT).is_empty());

        let plan = engine.plan_attempt(1);
        let response = LocalizationResponse::done(NodePose::new(0.0, 0.0, 0.0, 0.0, 0.0, -90.0))
            .with_gps(GpsPose::new(0.0, 55.0, 37.0, 90.0));
        engine
            .apply_response(plan.generation, &response, &[capture_at(0.0, 0.0)], BLEND)
            .unwrap();

        let gps = engine.convert_to_global_coordinate(&NodePose::DEFAULT);
        assert!((gps.latitude - 55.0).abs() < 1e-12);
        assert!((gps.longitude - 37.0).abs() < 1e-12);

        // a fix whose gps block is incomplete keeps the previous fused pose
        let plan = engine.plan_attempt(1);
        let response = LocalizationResponse::done(NodePose::DEFAULT)
            .with_gps(GpsPose::new(0.0, 55.0, 37.0, f64::NAN));
        let outcome = engine
            .apply_response(plan.generation, &response, &[capture_at(0.0, 0.0)], BLEND)
            .unwrap();
        assert!(matches!(outcome, AttemptOutcome::Localized(_)));
        assert!(!engine.fused_pose().is_empty());
        assert_eq!(engine.fused_pose().gps_pose().heading, 90.0);
        assert!(!engine.convert_to_global_coordinate(&NodePose::DEFAULT).is_empty());

        // a stop keeps the fused pose, a reset drops it
        engine.stop();
        assert!(!engine.fused_pose().is_empty());
        engine.reset();
        assert!(engine.fused_pose().is_empty());
    }
}
