use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{SchedulerError, SchedulerResult};
use crate::priority::Priority;

pub const MIN_TARGET_FPS: f64 = 15.0;
pub const MAX_TARGET_FPS: f64 = 120.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_target_fps")]
    pub target_fps: f64,
    /// Frame intervals kept for the rolling FPS estimate.
    #[serde(default = "default_history_len")]
    pub history_len: usize,
    /// Below this FPS the High tier is shed.
    #[serde(default = "default_severe_fps")]
    pub severe_fps: f64,
    /// Below this FPS Low/Idle are shed and Medium alternates.
    #[serde(default = "default_degraded_fps")]
    pub degraded_fps: f64,
    #[serde(default = "default_slow_threshold_ms")]
    pub slow_threshold_ms: f64,
    #[serde(default = "default_slow_min_runs")]
    pub slow_min_runs: u64,
    #[serde(default = "default_max_delta_ms")]
    pub max_delta_ms: f64,
    #[serde(default)]
    pub log_fps: bool,
    #[serde(default = "default_fps_log_period_ms")]
    pub fps_log_period_ms: f64,
    #[serde(default)]
    pub callbacks: Vec<CallbackConfig>,
}

fn default_target_fps() -> f64 { 60.0 }
fn default_history_len() -> usize { 60 }
fn default_severe_fps() -> f64 { 20.0 }
fn default_degraded_fps() -> f64 { 50.0 }
fn default_slow_threshold_ms() -> f64 { 10.0 }
fn default_slow_min_runs() -> u64 { 1 }
fn default_max_delta_ms() -> f64 { 250.0 }
fn default_fps_log_period_ms() -> f64 { 1000.0 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            target_fps: default_target_fps(),
            history_len: default_history_len(),
            severe_fps: default_severe_fps(),
            degraded_fps: default_degraded_fps(),
            slow_threshold_ms: default_slow_threshold_ms(),
            slow_min_runs: default_slow_min_runs(),
            max_delta_ms: default_max_delta_ms(),
            log_fps: false,
            fps_log_period_ms: default_fps_log_period_ms(),
            callbacks: Vec::new(),
        }
    }
}

impl SchedulerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn load_toml(path: impl AsRef<Path>) -> SchedulerResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| SchedulerError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|source| SchedulerError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// A callback instantiated by name through a registered factory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackConfig {
    pub name: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_settings")]
    pub settings: toml::Value,
}

fn default_enabled() -> bool { true }

fn default_settings() -> toml::Value {
    // Empty table keeps factories free to `try_into()` their own settings.
    toml::Value::Table(toml::map::Map::new())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
