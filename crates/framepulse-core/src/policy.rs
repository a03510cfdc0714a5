use crate::priority::Priority;

/// FPS-driven load shedding.
///
/// Critical work is never shed. Under severe degradation everything below
/// Critical is shed. Under moderate degradation Medium keeps half its cadence
/// and Low and Idle are shed. A tier never runs while a more urgent one is shed.
#[derive(Debug, Clone)]
pub struct SkipPolicy {
    severe_fps: f64,
    degraded_fps: f64,
    parity: [u64; Priority::COUNT],
}

impl SkipPolicy {
    pub fn new(severe_fps: f64, degraded_fps: f64) -> Self {
        Self {
            severe_fps,
            degraded_fps: degraded_fps.max(severe_fps),
            parity: [0; Priority::COUNT],
        }
    }

    /// Decides whether `priority` sits out this frame.
    ///
    /// Alternating tiers advance their parity counter on every degraded call,
    /// so this must be asked at most once per tier per frame.
    pub fn should_skip(&mut self, priority: Priority, fps: f64, target_fps: f64) -> bool {
        if fps >= target_fps {
            return false;
        }

        match priority {
            Priority::Critical => false,
            Priority::High => fps < self.severe_fps,
            Priority::Medium => {
                if fps < self.severe_fps {
                    true
                } else if fps < self.degraded_fps {
                    let counter = &mut self.parity[priority.index()];
                    *counter = counter.wrapping_add(1);
                    *counter % 2 == 0
                } else {
                    false
                }
            }
            Priority::Low | Priority::Idle => fps < self.degraded_fps,
        }
    }

    #[inline]
    pub fn severe_fps(&self) -> f64 {
        self.severe_fps
    }

    #[inline]
    pub fn degraded_fps(&self) -> f64 {
        self.degraded_fps
    }

    pub fn reset(&mut self) {
        self.parity = [0; Priority::COUNT];
    }
}

#[cfg(test)]
#[path = "tests/policy_tests.rs"]
mod tests;
