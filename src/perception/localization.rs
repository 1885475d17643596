//! Localization state machine
//!
//! Decides, per attempt, whether the request is forced (image only) or
//! incremental (carries a local position hint), counts failures and falls
//! back to forced requests after repeated failures.

/// Request mode for one localization attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalizationMode {
    /// No relative position hint, the server localizes from the image alone
    Forced,
    /// Carries the local position delta since the last fix
    Incremental,
}

/// Failures after a fix before requests are forced again
pub const DEFAULT_ESCALATION_THRESHOLD: u32 = 2;

/// State of the force/incremental policy
#[derive(Debug, Clone)]
pub struct LocalizationStateMachine {
    mode: LocalizationMode,
    failure_count: u32,
    first_localization_done: bool,
    only_force: bool,
    escalation_threshold: u32,
}

impl LocalizationStateMachine {
    /// Create a new state machine in forced mode
    pub fn new(only_force: bool) -> Self {
        LocalizationStateMachine {
            mode: LocalizationMode::Forced,
            failure_count: 0,
            first_localization_done: false,
            only_force,
            escalation_threshold: DEFAULT_ESCALATION_THRESHOLD,
        }
    }

    /// Override the number of failures that forces the next request
    pub fn with_escalation_threshold(mut self, threshold: u32) -> Self {
        self.escalation_threshold = threshold.max(1);
        self
    }

    /// Mode for the request being built now.
    ///
    /// Once a fix exists, reaching the failure threshold switches back to
    /// forced mode; only a later success leaves it.
    pub fn request_mode(&mut self) -> LocalizationMode {
        if self.first_localization_done && self.failure_count >= self.escalation_threshold {
            if self.mode != LocalizationMode::Forced {
                log::debug!(
                    "escalating to forced localization after {} failures",
                    self.failure_count
                );
            }
            self.mode = LocalizationMode::Forced;
        }
        self.mode
    }

    /// Record a successful localization
    pub fn on_success(&mut self) {
        self.first_localization_done = true;
        self.failure_count = 0;
        if !self.only_force {
            self.mode = LocalizationMode::Incremental;
        }
    }

    /// Record a failed localization, returns the new failure count
    pub fn on_failure(&mut self) -> u32 {
        self.failure_count = self.failure_count.saturating_add(1);
        self.failure_count
    }

    /// Back to the initial state, used when the service stops
    pub fn reset(&mut self) {
        self.first_localization_done = false;
        self.mode = LocalizationMode::Forced;
        self.failure_count = 0;
    }

    /// Toggle the only-force policy.
    ///
    /// Enabling forces the very next request. Disabling leaves the current
    /// mode alone and takes effect at the next success.
    pub fn enable_force_localization(&mut self, enabled: bool) {
        self.only_force = enabled;
        if enabled {
            self.mode = LocalizationMode::Forced;
        }
    }

    pub fn mode(&self) -> LocalizationMode {
        self.mode
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn first_localization_done(&self) -> bool {
        self.first_localization_done
    }

    pub fn only_force(&self) -> bool {
        self.only_force
    }
}
