//! Lifecycle management for long-running VPS components

use crate::error::Result;
use std::any::Any;

/// Trait for components that follow a lifecycle pattern
pub trait LifecycleNode: Send + Sync {
    /// Validate settings, Unconfigured -> Inactive
    fn on_configure(&mut self) -> Result<()>;

    /// Start working, Inactive -> Active
    fn on_activate(&mut self) -> Result<()>;

    /// Stop working but keep state, Active -> Inactive
    fn on_deactivate(&mut self) -> Result<()>;

    /// Release all state, Inactive -> Unconfigured
    fn on_cleanup(&mut self) -> Result<()>;

    /// Convert to Any for downcasting
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Base implementation for lifecycle nodes
#[derive(Debug)]
pub struct LifecycleNodeBase {
    pub name: String,
    state: State,
}

/// State of a lifecycle node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Unconfigured,
    Inactive,
    Active,
}

impl LifecycleNodeBase {
    /// Create a new lifecycle node base
    pub fn new(name: &str) -> Self {
        LifecycleNodeBase {
            name: name.to_string(),
            state: State::Unconfigured,
        }
    }

    /// Get the current state
    pub fn get_state(&self) -> State {
        self.state
    }

    /// Set the state
    pub fn set_state(&mut self, state: State) {
        log::debug!("{}: {:?} -> {:?}", self.name, self.state, state);
        self.state = state;
    }
}
