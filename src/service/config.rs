//! Localization service configuration

use crate::error::{Result, VpsError};
use std::collections::HashMap;
use std::time::Duration;

/// Settings of one VPS session
#[derive(Debug, Clone, PartialEq)]
pub struct VpsConfig {
    /// Base URL of the localization backend
    pub url: String,
    /// Location the backend localizes against
    pub location_id: String,
    /// Send every request forced, even after a fix
    pub only_force: bool,
    pub interval_localization: Duration,
    /// Attach the latest GPS sample to requests
    pub use_gps: bool,
    /// Send feature embeddings instead of raw frames
    pub use_neuro: bool,
    /// Frames captured for the first localization
    pub count_images: usize,
    pub interval_images: Duration,
    pub world_interpolation_duration: Duration,
    pub image_retry_delay: Duration,
    pub image_retry_limit: u32,
    /// Failures after a fix before requests are forced again
    pub failure_escalation_threshold: u32,
}

impl Default for VpsConfig {
    fn default() -> Self {
        VpsConfig {
            url: String::new(),
            location_id: String::new(),
            only_force: true,
            interval_localization: Duration::from_millis(6000),
            use_gps: false,
            use_neuro: false,
            count_images: 1,
            interval_images: Duration::from_millis(1000),
            world_interpolation_duration: Duration::from_millis(500),
            image_retry_delay: Duration::from_millis(100),
            image_retry_limit: 50,
            failure_escalation_threshold: 2,
        }
    }
}

impl VpsConfig {
    /// Create a configuration for a backend and location with default tuning
    pub fn new(url: impl Into<String>, location_id: impl Into<String>) -> Self {
        VpsConfig {
            url: url.into(),
            location_id: location_id.into(),
            ..Self::default()
        }
    }

    /// Apply numeric overrides by key.
    ///
    /// Durations are given in milliseconds, flags as 0 or 1. Unknown keys are
    /// ignored. The first invalid value aborts and leaves earlier keys applied.
    pub fn configure(&mut self, params: &HashMap<String, f64>) -> Result<()> {
        if let Some(&flag) = params.get("only_force") {
            self.only_force = parse_flag("only_force", flag)?;
        }

        if let Some(&ms) = params.get("interval_localization_ms") {
            self.interval_localization = parse_duration("interval_localization_ms", ms)?;
        }

        if let Some(&flag) = params.get("use_gps") {
            self.use_gps = parse_flag("use_gps", flag)?;
        }

        if let Some(&flag) = params.get("use_neuro") {
            self.use_neuro = parse_flag("use_neuro", flag)?;
        }

        if let Some(&count) = params.get("count_images") {
            self.count_images = parse_count("count_images", count)? as usize;
        }

        if let Some(&ms) = params.get("interval_images_ms") {
            self.interval_images = parse_duration("interval_images_ms", ms)?;
        }

        if let Some(&ms) = params.get("world_interpolation_duration_ms") {
            self.world_interpolation_duration =
                parse_duration("world_interpolation_duration_ms", ms)?;
        }

        if let Some(&ms) = params.get("image_retry_delay_ms") {
            self.image_retry_delay = parse_duration("image_retry_delay_ms", ms)?;
        }

        if let Some(&limit) = params.get("image_retry_limit") {
            self.image_retry_limit = parse_count("image_retry_limit", limit)?;
        }

        if let Some(&threshold) = params.get("failure_escalation_threshold") {
            self.failure_escalation_threshold =
                parse_count("failure_escalation_threshold", threshold)?;
        }

        Ok(())
    }

    /// Check the settings that have no usable default
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(VpsError::InvalidConfig("url must not be empty".to_string()));
        }
        if self.location_id.trim().is_empty() {
            return Err(VpsError::InvalidConfig("location id must not be empty".to_string()));
        }
        if self.count_images == 0 {
            return Err(VpsError::InvalidConfig("count_images must be at least 1".to_string()));
        }
        if self.interval_localization.is_zero() {
            return Err(VpsError::InvalidConfig(
                "interval_localization must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// How long the anchor takes to settle on a new fix
    pub fn anchor_blend_duration(&self) -> Duration {
        self.world_interpolation_duration.min(self.interval_localization)
    }
}

fn parse_flag(key: &str, value: f64) -> Result<bool> {
    if value == 0.0 {
        Ok(false)
    } else if value == 1.0 {
        Ok(true)
    } else {
        Err(VpsError::InvalidConfig(format!("{} must be 0 or 1, got {}", key, value)))
    }
}

fn parse_duration(key: &str, millis: f64) -> Result<Duration> {
    if !millis.is_finite() || millis <= 0.0 {
        return Err(VpsError::InvalidConfig(format!("{} must be positive, got {}", key, millis)));
    }
    Ok(Duration::from_secs_f64(millis / 1000.0))
}

fn parse_count(key: &str, value: f64) -> Result<u32> {
    if !value.is_finite() || value < 1.0 || value.fract() != 0.0 || value > u32::MAX as f64 {
        return Err(VpsError::InvalidConfig(format!(
            "{} must be a whole number of at least 1, got {}",
            key, value
        )));
    }
    Ok(value as u32)
}
