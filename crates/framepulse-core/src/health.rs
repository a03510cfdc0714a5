use log::{error, warn};

use crate::error::CallbackFailure;
use crate::registry::CallbackEntry;

/// What the monitor concluded about one invocation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Verdict {
    Healthy,
    Failed,
    /// The entry crossed the slowness threshold and was disabled.
    Quarantined,
}

/// Per-callback timing bookkeeping and chronic-slowness quarantine.
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    slow_threshold_ms: f64,
    slow_min_runs: u64,
}

impl HealthMonitor {
    pub fn new(slow_threshold_ms: f64, slow_min_runs: u64) -> Self {
        Self {
            slow_threshold_ms,
            slow_min_runs: slow_min_runs.max(1),
        }
    }

    #[inline]
    pub fn slow_threshold_ms(&self) -> f64 {
        self.slow_threshold_ms
    }

    /// Folds one invocation into the entry and applies the quarantine rule.
    pub(crate) fn observe(
        &self,
        entry: &mut CallbackEntry,
        elapsed_ms: f64,
        outcome: Result<(), CallbackFailure>,
    ) -> Verdict {
        let mut verdict = Verdict::Healthy;

        match outcome {
            Ok(()) => {
                entry.run_count += 1;
                entry.total_time_ms += elapsed_ms;
            }
            Err(failure) => {
                entry.error_count += 1;
                error!(
                    "callback '{}' ({}, tier {}) {failure}",
                    entry.label(),
                    entry.id(),
                    entry.priority()
                );
                entry.last_error = Some(failure.to_string());
                verdict = Verdict::Failed;
            }
        }

        let (runs, time_ms) = entry.window();
        if runs >= self.slow_min_runs {
            let avg = time_ms / runs as f64;
            if avg > self.slow_threshold_ms {
                entry.enabled = false;
                entry.quarantined = true;
                warn!(
                    "callback '{}' ({}, tier {}) disabled: average {:.2}ms over {} runs exceeds {:.2}ms",
                    entry.label(),
                    entry.id(),
                    entry.priority(),
                    avg,
                    runs,
                    self.slow_threshold_ms
                );
                verdict = Verdict::Quarantined;
            }
        }

        verdict
    }
}

#[cfg(test)]
#[path = "tests/health_tests.rs"]
mod tests;
