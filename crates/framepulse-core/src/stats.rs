use std::collections::BTreeMap;

use serde::Serialize;

use crate::priority::Priority;
use crate::registry::{CallbackEntry, CallbackId};

/// Point-in-time scheduler snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    pub fps: f64,
    pub frame_count: u64,
    /// Registered callbacks, enabled or not.
    pub callback_count: usize,
    pub enabled_count: usize,
    pub average_frame_time: f64,
    /// Every tier is present, including empty ones.
    pub callbacks_by_priority: BTreeMap<Priority, usize>,
    /// Tier dispatches shed by the FPS policy.
    pub skipped_by_policy: u64,
    /// Tier dispatches dropped because the frame budget was already spent.
    pub skipped_by_budget: u64,
    /// Callback invocations that returned an error or panicked.
    pub callback_failures: u64,
    /// Times a callback was disabled for chronic slowness.
    pub quarantines: u64,
    pub target_fps: f64,
    pub is_running: bool,
}

/// Timing history of one callback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallbackStats {
    pub id: CallbackId,
    pub label: String,
    pub priority: Priority,
    pub enabled: bool,
    pub quarantined: bool,
    pub run_count: u64,
    pub total_time_ms: f64,
    pub average_time_ms: f64,
    pub error_count: u64,
    pub last_error: Option<String>,
}

impl From<&CallbackEntry> for CallbackStats {
    fn from(e: &CallbackEntry) -> Self {
        Self {
            id: e.id(),
            label: e.label().to_string(),
            priority: e.priority(),
            enabled: e.is_enabled(),
            quarantined: e.is_quarantined(),
            run_count: e.run_count(),
            total_time_ms: e.total_time_ms(),
            average_time_ms: e.average_time_ms(),
            error_count: e.error_count,
            last_error: e.last_error.clone(),
        }
    }
}
