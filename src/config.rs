use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::ports::SamplingPolicy;

pub const DEFAULT_ALERT_WINDOW: usize = 20;
pub const DEFAULT_HISTORY_LIMIT: usize = 5;
pub const DEFAULT_LABEL_OFFSET_PX: f64 = 35.0;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Size of the recent-alerts window the listener subscribes to.
    pub alert_window: usize,
    /// Alerts shown for a selected user.
    pub history_limit: usize,
    /// Pixels a label is lifted above its projected point.
    pub label_offset_px: f64,
    pub tracking: TrackingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackingConfig {
    pub interval_ms: u64,
    pub min_distance_m: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            alert_window: DEFAULT_ALERT_WINDOW,
            history_limit: DEFAULT_HISTORY_LIMIT,
            label_offset_px: DEFAULT_LABEL_OFFSET_PX,
            tracking: TrackingConfig::default(),
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        let policy = SamplingPolicy::default();
        Self {
            interval_ms: policy.interval.as_millis() as u64,
            min_distance_m: policy.min_distance_m,
        }
    }
}

impl SyncConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.alert_window == 0 {
            return Err(ConfigError::Invalid("alert_window must be greater than 0".into()));
        }
        if self.history_limit == 0 {
            return Err(ConfigError::Invalid("history_limit must be greater than 0".into()));
        }
        if !self.label_offset_px.is_finite() {
            return Err(ConfigError::Invalid("label_offset_px must be finite".into()));
        }
        let distance = self.tracking.min_distance_m;
        if !distance.is_finite() || distance < 0.0 {
            return Err(ConfigError::Invalid(
                "tracking.min_distance_m must be a non-negative number".into(),
            ));
        }
        Ok(())
    }

    pub fn policy(&self) -> SamplingPolicy {
        SamplingPolicy {
            interval: Duration::from_millis(self.tracking.interval_ms),
            min_distance_m: self.tracking.min_distance_m,
        }
    }
}
