//! Metrics collection and reporting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use glass_ipc::CaptureMetrics;

/// Session-side figures folded into a metrics snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CaptureSample {
    pub capture_fps: f32,
    pub frames_captured: u64,
    pub content_size: (u32, u32),
}

/// Collects render-loop metrics.
pub struct MetricsCollector {
    start_time: RwLock<Option<Instant>>,
    frames_rendered: AtomicU64,
    frames_repeated: AtomicU64,
    last_report_time: RwLock<Instant>,
    last_rendered: AtomicU64,
    target_fps: f32,
}

impl MetricsCollector {
    pub fn new(target_fps: f32) -> Self {
        Self {
            start_time: RwLock::new(None),
            frames_rendered: AtomicU64::new(0),
            frames_repeated: AtomicU64::new(0),
            last_report_time: RwLock::new(Instant::now()),
            last_rendered: AtomicU64::new(0),
            target_fps,
        }
    }

    pub fn start(&self) {
        *self.start_time.write() = Some(Instant::now());
        *self.last_report_time.write() = Instant::now();
    }

    pub fn stop(&self) {
        *self.start_time.write() = None;
    }

    /// Record one submission to the shader stage. `fresh` is false when the
    /// previous capture was repeated.
    pub fn record_render(&self, fresh: bool) {
        self.frames_rendered.fetch_add(1, Ordering::Relaxed);
        if !fresh {
            self.frames_repeated.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }

    /// True once `interval` has passed since the last report.
    pub fn should_report(&self, interval: Duration) -> bool {
        self.last_report_time.read().elapsed() >= interval
    }

    pub fn snapshot(&self, capture: CaptureSample) -> CaptureMetrics {
        let now = Instant::now();

        let elapsed = now.duration_since(*self.last_report_time.read());
        let rendered = self.frames_rendered.load(Ordering::Relaxed);
        let last_rendered = self.last_rendered.load(Ordering::Relaxed);
        let render_fps = if elapsed.as_secs_f32() > 0.0 {
            rendered.saturating_sub(last_rendered) as f32 / elapsed.as_secs_f32()
        } else {
            0.0
        };

        let uptime_seconds = self
            .start_time
            .read()
            .map(|s| now.duration_since(s).as_secs())
            .unwrap_or(0);

        CaptureMetrics {
            capture_fps: capture.capture_fps,
            render_fps,
            target_fps: self.target_fps,
            frames_captured: capture.frames_captured,
            frames_rendered: rendered,
            frames_repeated: self.frames_repeated.load(Ordering::Relaxed),
            content_width: capture.content_size.0,
            content_height: capture.content_size.1,
            uptime_seconds,
        }
    }

    /// Reset the window used for the render rate.
    pub fn mark_reported(&self) {
        *self.last_report_time.write() = Instant::now();
        self.last_rendered
            .store(self.frames_rendered.load(Ordering::Relaxed), Ordering::Relaxed);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(60.0)
    }
}
