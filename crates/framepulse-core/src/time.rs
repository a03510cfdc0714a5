use std::collections::VecDeque;

/// Frame clock bookkeeping and rolling FPS estimate.
#[derive(Debug, Clone)]
pub struct FrameTimer {
    last_frame_ms: f64,
    delta_ms: f64,
    frame_count: u64,
    fps: f64,

    history: VecDeque<f64>,
    history_len: usize,
    max_delta_ms: f64,
}

impl FrameTimer {
    pub fn new(history_len: usize, max_delta_ms: f64, initial_fps: f64) -> Self {
        let history_len = history_len.max(1);
        Self {
            last_frame_ms: 0.0,
            delta_ms: 0.0,
            frame_count: 0,
            fps: initial_fps,
            history: VecDeque::with_capacity(history_len),
            history_len,
            max_delta_ms: max_delta_ms.max(1.0),
        }
    }

    /// Re-anchors the clock without touching the history (used on start/resume).
    #[inline]
    pub fn anchor(&mut self, now_ms: f64) {
        self.last_frame_ms = now_ms;
    }

    /// Forgets every sample and counter.
    pub fn reset(&mut self, initial_fps: f64) {
        self.last_frame_ms = 0.0;
        self.delta_ms = 0.0;
        self.frame_count = 0;
        self.fps = initial_fps;
        self.history.clear();
    }

    /// Advances one frame and returns the delta handed to callbacks.
    pub fn advance(&mut self, timestamp_ms: f64) -> f64 {
        let mut dt = timestamp_ms - self.last_frame_ms;
        if !dt.is_finite() || dt < 0.0 {
            dt = 0.0;
        }
        dt = dt.min(self.max_delta_ms);

        self.last_frame_ms = timestamp_ms;
        self.delta_ms = dt;
        self.frame_count = self.frame_count.wrapping_add(1);

        self.history.push_back(dt);
        while self.history.len() > self.history_len {
            self.history.pop_front();
        }

        let avg = self.average_frame_time();
        if avg > 0.0 {
            self.fps = 1000.0 / avg;
        }
        dt
    }

    /// Mean of the recorded frame intervals, or 0 with no samples.
    pub fn average_frame_time(&self) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }
        self.history.iter().sum::<f64>() / self.history.len() as f64
    }

    /// Replaces the estimate while no sample exists yet.
    #[inline]
    pub fn set_default_fps(&mut self, fps: f64) {
        if self.history.is_empty() {
            self.fps = fps;
        }
    }

    #[inline]
    pub fn fps(&self) -> f64 {
        self.fps
    }

    #[inline]
    pub fn delta_ms(&self) -> f64 {
        self.delta_ms
    }

    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    #[inline]
    pub fn last_frame_ms(&self) -> f64 {
        self.last_frame_ms
    }

    #[inline]
    pub fn samples(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
#[path = "tests/time_tests.rs"]
mod tests;
