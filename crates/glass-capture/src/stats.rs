//! Capture frame-rate measurement.

/// Length of the measurement window in milliseconds.
pub const FPS_WINDOW_MS: u64 = 1000;

/// Frame counter with a trailing one-second rate estimate.
///
/// The rate is recomputed only once more than [`FPS_WINDOW_MS`] has passed
/// since the previous measurement, giving an average over the whole window
/// rather than an instantaneous value.
#[derive(Debug, Clone)]
pub struct FrameStats {
    frame_count: u64,
    window_start_ms: u64,
    window_start_count: u64,
    last_frame_ms: u64,
    fps: f32,
}

impl FrameStats {
    /// Start measuring at `start_ms`.
    pub fn new(start_ms: u64) -> Self {
        Self {
            frame_count: 0,
            window_start_ms: start_ms,
            window_start_count: 0,
            last_frame_ms: start_ms,
            fps: 0.0,
        }
    }

    /// Count a frame ingested at `now_ms` and return the new total.
    pub fn record(&mut self, now_ms: u64) -> u64 {
        self.frame_count += 1;
        self.last_frame_ms = now_ms;

        let elapsed = now_ms.saturating_sub(self.window_start_ms);
        if elapsed > FPS_WINDOW_MS {
            let frames = self.frame_count - self.window_start_count;
            self.fps = (frames as f64 * 1000.0 / elapsed as f64) as f32;
            self.window_start_ms = now_ms;
            self.window_start_count = self.frame_count;
        }

        self.frame_count
    }

    /// Total frames recorded.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Rate over the last completed window.
    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// Timestamp of the most recent frame.
    pub fn last_frame_ms(&self) -> u64 {
        self.last_frame_ms
    }
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new(0)
    }
}
