pub mod common;
pub mod error;
pub mod lifecycle;
pub mod perception;
pub mod pose;
pub mod service;

pub use crate::error::{Result, VpsError};
pub use crate::pose::{FusedPose, GpsLocation, GpsPose, NodePose};
pub use crate::service::config::VpsConfig;
pub use crate::service::{VpsCallback, VpsCollaborators, VpsService};

use crate::lifecycle::LifecycleNode;

/// Registry driving the lifecycle of every VPS component of an app
pub struct VpsCore {
    components: Vec<Box<dyn LifecycleNode>>,
}

impl Default for VpsCore {
    fn default() -> Self {
        Self::new()
    }
}

impl VpsCore {
    /// Create a new, empty registry
    pub fn new() -> Self {
        VpsCore {
            components: Vec::new(),
        }
    }

    /// Register a component with the core
    pub fn register<T: LifecycleNode + 'static>(&mut self, component: T) {
        self.components.push(Box::new(component));
    }

    /// Configure and activate all registered components
    pub fn init(&mut self) -> Result<()> {
        for component in &mut self.components {
            component.on_configure()?;
            component.on_activate()?;
        }
        Ok(())
    }

    /// Deactivate and clean up all registered components
    pub fn shutdown(&mut self) -> Result<()> {
        for component in &mut self.components {
            component.on_deactivate()?;
            component.on_cleanup()?;
        }
        Ok(())
    }

    /// Get the first registered VPS service
    pub fn service_mut(&mut self) -> Option<&mut VpsService> {
        self.components
            .iter_mut()
            .find_map(|component| component.as_any_mut().downcast_mut::<VpsService>())
    }
}
