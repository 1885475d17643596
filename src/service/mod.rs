//! VPS localization service
//!
//! [`VpsService`] wires the fusion engine to the device collaborators and
//! the backend transport, and runs the periodic localization loop on the
//! ambient tokio runtime.
pub mod config;
pub(crate) mod driver;
pub mod transport;

use self::config::VpsConfig;
use self::driver::{lock_engine, DriverContext};
use self::transport::{LocalizationResponse, LocalizationTransport};
use crate::common::types::Transform;
use crate::error::{Result, VpsError};
use crate::lifecycle::{LifecycleNode, LifecycleNodeBase, State};
use crate::perception::localization::LocalizationMode;
use crate::perception::sensors::{
    CameraCapture, CameraPoseProvider, FeatureExtractor, FrameSource, GpsSource,
};
use crate::perception::{AttemptOutcome, FusionEngine, LocalizationUpdate};
use crate::pose::{FusedPose, GpsPose, NodePose};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Run state of the localization loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped,
    Running,
    /// Stopped by a fatal error, waiting for an explicit restart
    Failed,
}

/// Receiver of localization outcomes.
///
/// Called from the driver task; implementations must not block.
pub trait VpsCallback: Send + Sync {
    /// A fix was applied
    fn on_success(&self, update: &LocalizationUpdate);

    /// The backend did not localize, the loop keeps running
    fn on_fail(&self, failure_count: u32);

    /// The session ended on an unrecoverable error
    fn on_error(&self, error: &VpsError);

    fn on_state_change(&self, _state: ServiceState) {}
}

/// External components the service depends on
#[derive(Clone)]
pub struct VpsCollaborators {
    pub camera: Arc<dyn CameraPoseProvider>,
    pub frames: Arc<dyn FrameSource>,
    pub transport: Arc<dyn LocalizationTransport>,
    pub gps: Option<Arc<dyn GpsSource>>,
    pub extractor: Option<Arc<dyn FeatureExtractor>>,
    pub callback: Option<Arc<dyn VpsCallback>>,
}

impl VpsCollaborators {
    pub fn new(
        camera: Arc<dyn CameraPoseProvider>,
        frames: Arc<dyn FrameSource>,
        transport: Arc<dyn LocalizationTransport>,
    ) -> Self {
        VpsCollaborators {
            camera,
            frames,
            transport,
            gps: None,
            extractor: None,
            callback: None,
        }
    }

    pub fn with_gps(mut self, gps: Arc<dyn GpsSource>) -> Self {
        self.gps = Some(gps);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn FeatureExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn VpsCallback>) -> Self {
        self.callback = Some(callback);
        self
    }
}

/// Run state shared with the driver task
#[derive(Debug, Clone)]
pub(crate) struct SharedState(Arc<Mutex<ServiceState>>);

impl SharedState {
    fn new() -> Self {
        SharedState(Arc::new(Mutex::new(ServiceState::Stopped)))
    }

    pub(crate) fn get(&self) -> ServiceState {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set(&self, state: ServiceState) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

struct Worker {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Visual positioning session
pub struct VpsService {
    base: LifecycleNodeBase,
    config: VpsConfig,
    engine: Arc<Mutex<FusionEngine>>,
    collaborators: VpsCollaborators,
    state: SharedState,
    worker: Option<Worker>,
}

impl VpsService {
    /// Create a new, stopped service
    pub fn new(config: VpsConfig, collaborators: VpsCollaborators) -> Self {
        let engine = FusionEngine::new(config.only_force, config.failure_escalation_threshold);
        VpsService {
            base: LifecycleNodeBase::new("vps_service"),
            config,
            engine: Arc::new(Mutex::new(engine)),
            collaborators,
            state: SharedState::new(),
            worker: None,
        }
    }

    pub fn config(&self) -> &VpsConfig {
        &self.config
    }

    /// Apply numeric overrides, see [`VpsConfig::configure`]. Takes effect at
    /// the next start.
    pub fn configure(&mut self, params: &HashMap<String, f64>) -> Result<()> {
        self.config.configure(params)
    }

    /// Start the localization loop on the current tokio runtime.
    ///
    /// Starting a running service does nothing.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            log::debug!("localization loop already running");
            return Ok(());
        }
        self.config.validate()?;
        if self.config.use_neuro && self.collaborators.extractor.is_none() {
            return Err(VpsError::InvalidConfig(
                "use_neuro requires a feature extractor".to_string(),
            ));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| VpsError::NoRuntime)?;

        // clear a finished or failed worker
        self.halt_worker();
        {
            let mut engine = lock_engine(&self.engine);
            engine.stop();
            engine.set_policy(self.config.only_force, self.config.failure_escalation_threshold);
        }

        let (stop, stop_rx) = watch::channel(false);
        let context = DriverContext {
            config: self.config.clone(),
            engine: Arc::clone(&self.engine),
            collaborators: self.collaborators.clone(),
            state: self.state.clone(),
        };
        let handle = runtime.spawn(driver::run(context, stop_rx));
        self.worker = Some(Worker { stop, handle });

        self.set_state(ServiceState::Running);
        Ok(())
    }

    /// Stop the loop. A response still in flight is discarded.
    pub fn stop(&mut self) {
        lock_engine(&self.engine).stop();
        let was_running = self.halt_worker();
        if was_running || self.state.get() != ServiceState::Stopped {
            self.set_state(ServiceState::Stopped);
        }
    }

    /// Stop and drop all fusion state including the fused pose
    pub fn destroy(&mut self) {
        self.stop();
        lock_engine(&self.engine).reset();
    }

    pub fn is_running(&self) -> bool {
        self.state.get() == ServiceState::Running
            && self
                .worker
                .as_ref()
                .map(|worker| !worker.handle.is_finished())
                .unwrap_or(false)
    }

    pub fn state(&self) -> ServiceState {
        self.state.get()
    }

    /// Toggle the only-force policy for the running and future sessions
    pub fn enable_force_localization(&mut self, enabled: bool) {
        self.config.only_force = enabled;
        lock_engine(&self.engine).enable_force_localization(enabled);
    }

    /// Stop the loop and apply `response` as if it came from the backend for
    /// a frame captured now.
    pub fn localize_with_mock_data(
        &mut self,
        response: LocalizationResponse,
    ) -> Result<AttemptOutcome> {
        self.stop();

        let capture = CameraCapture::from_provider(self.collaborators.camera.as_ref());
        let outcome = {
            let mut engine = lock_engine(&self.engine);
            let plan = engine.plan_attempt(1);
            engine.apply_response(
                plan.generation,
                &response,
                &[capture],
                self.config.anchor_blend_duration(),
            )
        };

        match &outcome {
            Ok(outcome) => driver::notify(self.collaborators.callback.as_deref(), outcome),
            Err(error) => {
                log::error!("mock localization rejected: {}", error);
                if let Some(callback) = self.collaborators.callback.as_deref() {
                    callback.on_error(error);
                }
            }
        }
        outcome
    }

    pub fn mode(&self) -> LocalizationMode {
        lock_engine(&self.engine).mode()
    }

    pub fn failure_count(&self) -> u32 {
        lock_engine(&self.engine).failure_count()
    }

    pub fn is_localized(&self) -> bool {
        lock_engine(&self.engine).is_localized()
    }

    pub fn fused_pose(&self) -> FusedPose {
        lock_engine(&self.engine).fused_pose()
    }

    /// Global pose of a local pose, `GpsPose::EMPTY` before the first GPS fix
    pub fn convert_to_global_coordinate(&self, node_pose: &NodePose) -> GpsPose {
        lock_engine(&self.engine).convert_to_global_coordinate(node_pose)
    }

    /// Local pose of a global pose, `NodePose::EMPTY` before the first GPS fix
    pub fn convert_to_local_coordinate(&self, gps_pose: &GpsPose) -> NodePose {
        lock_engine(&self.engine).convert_to_local_coordinate(gps_pose)
    }

    /// Step the anchor blend by a frame's duration
    pub fn advance_anchor(&self, dt: Duration) -> Transform {
        lock_engine(&self.engine).advance_anchor(dt)
    }

    pub fn anchor(&self) -> Transform {
        lock_engine(&self.engine).anchor()
    }

    fn halt_worker(&mut self) -> bool {
        match self.worker.take() {
            Some(worker) => {
                let running = !worker.handle.is_finished();
                let _ = worker.stop.send(true);
                worker.handle.abort();
                running
            }
            None => false,
        }
    }

    fn set_state(&self, state: ServiceState) {
        self.state.set(state);
        log::info!("vps service {}: {:?}", self.base.name, state);
        if let Some(callback) = self.collaborators.callback.as_deref() {
            callback.on_state_change(state);
        }
    }
}

impl Drop for VpsService {
    fn drop(&mut self) {
        self.halt_worker();
    }
}

impl LifecycleNode for VpsService {
    fn on_configure(&mut self) -> Result<()> {
        self.config.validate()?;
        self.base.set_state(State::Inactive);
        Ok(())
    }

    fn on_activate(&mut self) -> Result<()> {
        if self.base.get_state() != State::Inactive {
            return Err(VpsError::Lifecycle(format!(
                "cannot activate from {:?}",
                self.base.get_state()
            )));
        }
        self.start()?;
        self.base.set_state(State::Active);
        Ok(())
    }

    fn on_deactivate(&mut self) -> Result<()> {
        self.stop();
        self.base.set_state(State::Inactive);
        Ok(())
    }

    fn on_cleanup(&mut self) -> Result<()> {
        self.destroy();
        self.base.set_state(State::Unconfigured);
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
