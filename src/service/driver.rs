//! Periodic localization loop
//!
//! One attempt at a time: capture, send, apply, notify, sleep. The loop is
//! a single tokio task and every await point also watches the stop signal.

use super::{ServiceState, SharedState, VpsCallback, VpsCollaborators};
use crate::error::{Result, VpsError};
use crate::perception::sensors::CameraCapture;
use crate::perception::{AttemptOutcome, FusionEngine};
use crate::service::config::VpsConfig;
use crate::service::transport::FramePayload;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::time::sleep;

/// Everything the driver task needs, cloned out of the service at start
pub(crate) struct DriverContext {
    pub config: VpsConfig,
    pub engine: Arc<Mutex<FusionEngine>>,
    pub collaborators: VpsCollaborators,
    pub state: SharedState,
}

/// Lock the engine, recovering the data if a panicking holder poisoned it
pub(crate) fn lock_engine(engine: &Mutex<FusionEngine>) -> MutexGuard<'_, FusionEngine> {
    engine.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resolve once the stop flag is raised or its sender is gone
async fn cancelled(signal: &mut watch::Receiver<bool>) {
    loop {
        if *signal.borrow_and_update() {
            return;
        }
        if signal.changed().await.is_err() {
            return;
        }
    }
}

/// Run attempts until stopped or a fatal error occurs
pub(crate) async fn run(ctx: DriverContext, mut stop: watch::Receiver<bool>) {
    log::info!(
        "localization loop started for location {}, interval {:?}",
        ctx.config.location_id,
        ctx.config.interval_localization
    );

    loop {
        let outcome = tokio::select! {
            biased;
            _ = cancelled(&mut stop) => break,
            outcome = run_attempt(&ctx) => outcome,
        };

        match outcome {
            Ok(AttemptOutcome::Discarded) => break,
            Ok(outcome) => notify(ctx.collaborators.callback.as_deref(), &outcome),
            Err(error) => {
                if *stop.borrow() {
                    break;
                }
                fail_session(&ctx, &error);
                return;
            }
        }

        tokio::select! {
            biased;
            _ = cancelled(&mut stop) => break,
            _ = sleep(ctx.config.interval_localization) => {}
        }
    }

    log::info!("localization loop stopped");
}

/// Report the outcome of an attempt to the callback
pub(crate) fn notify(callback: Option<&dyn VpsCallback>, outcome: &AttemptOutcome) {
    match outcome {
        AttemptOutcome::Localized(update) => {
            log::info!(
                "localized: x {:.3} y {:.3} z {:.3} yaw {:.3}",
                update.pose.x,
                update.pose.y,
                update.pose.z,
                update.pose.yaw
            );
            if let Some(callback) = callback {
                callback.on_success(update);
            }
        }
        AttemptOutcome::Failed { failure_count } => {
            if let Some(callback) = callback {
                callback.on_fail(*failure_count);
            }
        }
        AttemptOutcome::Skipped | AttemptOutcome::Discarded => {}
    }
}

fn fail_session(ctx: &DriverContext, error: &VpsError) {
    log::error!("localization loop aborted: {}", error);
    lock_engine(&ctx.engine).stop();
    ctx.state.set(ServiceState::Failed);

    if let Some(callback) = ctx.collaborators.callback.as_deref() {
        callback.on_error(error);
        callback.on_state_change(ServiceState::Failed);
    }
}

async fn run_attempt(ctx: &DriverContext) -> Result<AttemptOutcome> {
    let plan = lock_engine(&ctx.engine).plan_attempt(ctx.config.count_images);

    let mut frames = Vec::with_capacity(plan.frame_count);
    let mut captures = Vec::with_capacity(plan.frame_count);
    for index in 0..plan.frame_count {
        if index > 0 {
            sleep(ctx.config.interval_images).await;
        }
        let data = match acquire_frame(ctx).await? {
            Some(data) => data,
            None => {
                log::warn!(
                    "no camera image after {} retries, skipping attempt",
                    ctx.config.image_retry_limit
                );
                return Ok(AttemptOutcome::Skipped);
            }
        };
        captures.push(CameraCapture::from_provider(ctx.collaborators.camera.as_ref()));
        frames.push(encode_frame(ctx, data).await?);
    }

    let gps = if ctx.config.use_gps {
        ctx.collaborators
            .gps
            .as_ref()
            .and_then(|source| source.last_location())
    } else {
        None
    };

    let request = lock_engine(&ctx.engine).build_request(
        &plan,
        &ctx.config.location_id,
        frames,
        &captures,
        gps,
    );
    let response = ctx.collaborators.transport.localize(request).await?;

    lock_engine(&ctx.engine).apply_response(
        plan.generation,
        &response,
        &captures,
        ctx.config.anchor_blend_duration(),
    )
}

/// Poll the frame source until it yields, `None` once the retry limit is spent
async fn acquire_frame(ctx: &DriverContext) -> Result<Option<Vec<u8>>> {
    let mut retries = 0;
    loop {
        match ctx.collaborators.frames.acquire_frame() {
            Ok(data) => return Ok(Some(data)),
            Err(error) if error.is_recoverable() => {
                if retries >= ctx.config.image_retry_limit {
                    return Ok(None);
                }
                retries += 1;
                sleep(ctx.config.image_retry_delay).await;
            }
            Err(error) => return Err(error),
        }
    }
}

async fn encode_frame(ctx: &DriverContext, data: Vec<u8>) -> Result<FramePayload> {
    let extractor = match (&ctx.collaborators.extractor, ctx.config.use_neuro) {
        (Some(extractor), true) => Arc::clone(extractor),
        _ => return Ok(FramePayload::Image(data)),
    };

    let embedding = tokio::task::spawn_blocking(move || extractor.extract(&data))
        .await
        .map_err(|e| VpsError::FeatureExtraction(e.to_string()))??;
    Ok(FramePayload::Embedding(embedding))
}
