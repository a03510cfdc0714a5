use log::info;

/// Periodic FPS reporting through the `log` facade.
pub struct Telemetry {
    enabled: bool,
    period_ms: f64,

    window_start_ms: Option<f64>,
    window_frames: u32,
}

impl Telemetry {
    pub fn new(enabled: bool, period_ms: f64) -> Self {
        Self {
            enabled,
            period_ms: period_ms.max(250.0),
            window_start_ms: None,
            window_frames: 0,
        }
    }

    pub fn frame_tick(&mut self, timestamp_ms: f64, fps: f64, delta_ms: f64, callbacks: usize) {
        if !self.enabled {
            return;
        }

        let start = *self.window_start_ms.get_or_insert(timestamp_ms);
        self.window_frames += 1;

        let elapsed = timestamp_ms - start;
        if elapsed >= self.period_ms {
            info!(
                "fps={:.1} dt_ms={:.2} frames={} callbacks={}",
                fps, delta_ms, self.window_frames, callbacks
            );
            self.window_frames = 0;
            self.window_start_ms = Some(timestamp_ms);
        }
    }

    pub fn reset(&mut self) {
        self.window_start_ms = None;
        self.window_frames = 0;
    }
}
