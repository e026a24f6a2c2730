//! Runtime configuration, loadable from JSON.
//!
//! ```json
//! { "stages": ["input", "pre_update", "update", "post_update"],
//!   "max_delta_secs": 0.1,
//!   "freeze_registry": true }
//! ```
//!
//! Every field is optional; missing ones take their [`Default`] value.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ecs::StageLabel;
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Stage names in execution order.
    pub stages: Vec<String>,
    /// Upper bound on a frame's delta, so a stall (debugger, window drag)
    /// does not turn into one enormous simulation step.
    pub max_delta_secs: f32,
    /// Freeze the component registry once [`App::initialize`](crate::app::App::initialize)
    /// succeeds. Component types first used after that panic.
    pub freeze_registry: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stages: vec!["pre_update".into(), "update".into(), "post_update".into()],
            max_delta_secs: 0.25,
            freeze_registry: false,
        }
    }
}

impl RuntimeConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path.as_ref())?;
        log::debug!("loading runtime config from {}", path.as_ref().display());
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stages.is_empty() {
            return Err(ConfigError::Invalid("at least one stage is required".into()));
        }
        for (i, stage) in self.stages.iter().enumerate() {
            if stage.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("stage #{i} has an empty name")));
            }
            if self.stages[..i].contains(stage) {
                return Err(ConfigError::Invalid(format!("stage `{stage}` is listed twice")));
            }
        }
        if self.max_delta().is_none() {
            return Err(ConfigError::Invalid(format!(
                "max_delta_secs must be a positive number of seconds that fits a Duration, got {}",
                self.max_delta_secs
            )));
        }
        Ok(())
    }

    /// `max_delta_secs` as a [`Duration`], `None` unless it is positive and
    /// representable.
    pub fn max_delta(&self) -> Option<Duration> {
        Duration::try_from_secs_f32(self.max_delta_secs)
            .ok()
            .filter(|max| !max.is_zero())
    }

    pub fn stage_labels(&self) -> Vec<StageLabel> {
        self.stages.iter().cloned().map(StageLabel::from).collect()
    }

    /// Caps `delta` at [`max_delta`](Self::max_delta). An unusable limit
    /// (possible only if the field was changed after validation) caps nothing.
    pub fn clamp_delta(&self, delta: Duration) -> Duration {
        match self.max_delta() {
            Some(max) => delta.min(max),
            None => delta,
        }
    }
}
