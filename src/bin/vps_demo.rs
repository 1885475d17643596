use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use vps_core::common::rotation::rotation_about_vertical;
use vps_core::common::types::{Position, Rotation};
use vps_core::perception::sensors::{CameraIntrinsics, CameraPoseProvider, FrameSource, GpsSource};
use vps_core::perception::LocalizationUpdate;
use vps_core::service::transport::{
    LocalizationRequest, LocalizationResponse, LocalizationTransport,
};
use vps_core::service::ServiceState;
use vps_core::{
    GpsLocation, GpsPose, NodePose, VpsCallback, VpsCollaborators, VpsConfig, VpsCore, VpsError,
    VpsService,
};

/// Camera walking slowly along +x while turning
struct SimulatedCamera {
    pose: Mutex<(Position, f64)>,
}

impl SimulatedCamera {
    fn step(&self, dt: f64) {
        let mut pose = self.pose.lock().unwrap_or_else(|e| e.into_inner());
        pose.0.x += 0.5 * dt;
        pose.1 += 2.0 * dt;
    }
}

impl CameraPoseProvider for SimulatedCamera {
    fn world_position(&self) -> Position {
        self.pose.lock().unwrap_or_else(|e| e.into_inner()).0
    }

    fn world_rotation(&self) -> Rotation {
        rotation_about_vertical(self.pose.lock().unwrap_or_else(|e| e.into_inner()).1)
    }

    fn intrinsics(&self) -> CameraIntrinsics {
        CameraIntrinsics::new(525.0, 525.0, 320.0, 240.0)
    }
}

/// Camera that needs a couple of polls before the first image
struct WarmingUpFrames {
    polls: AtomicU32,
}

impl FrameSource for WarmingUpFrames {
    fn acquire_frame(&self) -> vps_core::Result<Vec<u8>> {
        if self.polls.fetch_add(1, Ordering::SeqCst) < 2 {
            return Err(VpsError::ImageNotYetAvailable);
        }
        Ok(vec![0u8; 640 * 480])
    }
}

struct FixedGps;

impl GpsSource for FixedGps {
    fn last_location(&self) -> Option<GpsLocation> {
        Some(GpsLocation {
            accuracy: 8.0,
            altitude: 150.0,
            latitude: 55.7539,
            longitude: 37.6208,
            timestamp_nanos: 0,
        })
    }
}

/// Backend that answers every third request with a failure
struct SimulatedBackend {
    camera: Arc<SimulatedCamera>,
    requests: AtomicU32,
}

#[async_trait]
impl LocalizationTransport for SimulatedBackend {
    async fn localize(
        &self,
        request: LocalizationRequest,
    ) -> vps_core::Result<LocalizationResponse> {
        tokio::time::sleep(Duration::from_millis(150)).await;
        if request.frames.iter().any(|frame| frame.intrinsics == CameraIntrinsics::EMPTY) {
            return Ok(LocalizationResponse::with_status("fail"));
        }
        let count = self.requests.fetch_add(1, Ordering::SeqCst) + 1;
        if count % 3 == 0 {
            return Ok(LocalizationResponse::with_status("fail"));
        }

        let camera = self.camera.world_position();
        let pose = NodePose::new(10.0 + camera.x, 0.0, 5.0 + camera.z, 0.0, 0.0, -90.0);
        let gps = request
            .gps
            .map(|location| location.to_gps_pose(90.0))
            .unwrap_or(GpsPose::new(150.0, 55.7539, 37.6208, 90.0));
        Ok(LocalizationResponse::done(pose).with_gps(gps))
    }
}

struct LoggingCallback;

impl VpsCallback for LoggingCallback {
    fn on_success(&self, update: &LocalizationUpdate) {
        let anchor = update.anchor.translation.vector;
        log::info!(
            "fix on frame {}: anchor at ({:.2}, {:.2}, {:.2})",
            update.image_index,
            anchor.x,
            anchor.y,
            anchor.z
        );
    }

    fn on_fail(&self, failure_count: u32) {
        log::warn!("localization failed ({} in a row)", failure_count);
    }

    fn on_error(&self, error: &VpsError) {
        log::error!("session aborted: {}", error);
    }

    fn on_state_change(&self, state: ServiceState) {
        log::info!("service state: {:?}", state);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let camera = Arc::new(SimulatedCamera {
        pose: Mutex::new((Position::new(0.0, 1.5, 0.0), 0.0)),
    });
    let collaborators = VpsCollaborators::new(
        camera.clone(),
        Arc::new(WarmingUpFrames {
            polls: AtomicU32::new(0),
        }),
        Arc::new(SimulatedBackend {
            camera: camera.clone(),
            requests: AtomicU32::new(0),
        }),
    )
    .with_gps(Arc::new(FixedGps))
    .with_callback(Arc::new(LoggingCallback));

    let config = VpsConfig::new("https://vps.invalid", "demo-location");
    let mut service = VpsService::new(config, collaborators);

    let mut params = HashMap::new();
    params.insert("only_force".to_string(), 0.0);
    params.insert("use_gps".to_string(), 1.0);
    params.insert("interval_localization_ms".to_string(), 700.0);
    params.insert("count_images".to_string(), 2.0);
    params.insert("interval_images_ms".to_string(), 100.0);
    service
        .configure(&params)
        .context("failed to configure the vps service")?;

    let mut core = VpsCore::new();
    core.register(service);
    core.init().context("failed to start the vps service")?;

    let frame = Duration::from_millis(100);
    for _ in 0..50 {
        tokio::time::sleep(frame).await;
        camera.step(frame.as_secs_f64());
        if let Some(service) = core.service_mut() {
            service.advance_anchor(frame);
        }
    }

    if let Some(service) = core.service_mut() {
        let mark = NodePose::new(12.0, 0.0, 5.0, 0.0, 0.0, -90.0);
        let here = service.convert_to_global_coordinate(&mark);
        if here.is_empty() {
            log::warn!("no GPS fix yet");
        } else {
            log::info!(
                "12 m mark is at {:.6}, {:.6} heading {:.1}",
                here.latitude,
                here.longitude,
                here.heading
            );
            let back = service.convert_to_local_coordinate(&here);
            log::info!("and back in local frame: x {:.3} z {:.3}", back.x, back.z);
        }
        log::info!(
            "mode {:?}, failures {}",
            service.mode(),
            service.failure_count()
        );
    }

    core.shutdown().context("failed to stop the vps service")?;
    Ok(())
}
