//! Render loop feeding the shader stage.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info};

use glass_capture::{CaptureSession, FrameInfo, ShaderPipeline};

use crate::metrics::MetricsCollector;

/// The shader stage as shared with the render thread.
pub type SharedPipeline<T> = Arc<Mutex<Box<dyn ShaderPipeline<T> + Send>>>;

/// Notes whether each submission carried a fresh frame.
struct Metered<'a, T> {
    inner: &'a mut dyn ShaderPipeline<T>,
    fresh: bool,
}

impl<T> ShaderPipeline<T> for Metered<'_, T> {
    fn process(&mut self, input: &T, frame: &FrameInfo) {
        self.fresh = frame.fresh;
        self.inner.process(input, frame);
    }
}

/// Interval between renders at `fps`.
pub fn frame_interval(fps: u32) -> Duration {
    Duration::from_nanos(1_000_000_000 / u64::from(fps.max(1)))
}

/// Submit the session's current texture once per interval until stopped.
///
/// Wakes early when a frame arrives, so capture latency is not padded by a
/// whole render interval; a slower capture repeats its last frame.
pub(crate) fn render_loop<T: Clone + Send + Sync + 'static>(
    session: Arc<CaptureSession<T>>,
    pipeline: SharedPipeline<T>,
    metrics: Arc<MetricsCollector>,
    should_stop: Arc<AtomicBool>,
    render_fps: u32,
) {
    debug!(render_fps, "Render loop starting");

    let interval = frame_interval(render_fps);
    let start_time = Instant::now();
    let mut last_log_time = Instant::now();

    while !should_stop.load(Ordering::SeqCst) {
        let frame_start = Instant::now();

        if last_log_time.elapsed() >= Duration::from_secs(5) {
            info!(
                "Render stats: captured={}, rendered={}, capture_fps={:.1}, uptime={:.1}s",
                session.frame_count(),
                metrics.frames_rendered(),
                session.fps(),
                start_time.elapsed().as_secs_f32()
            );
            last_log_time = Instant::now();
        }

        session.wait_for_frame(interval);
        if should_stop.load(Ordering::SeqCst) {
            break;
        }

        let submitted = {
            let mut stage = pipeline.lock();
            let mut metered = Metered {
                inner: &mut **stage,
                fresh: false,
            };
            let submitted = session.process_input(&mut metered);
            submitted.then_some(metered.fresh)
        };
        if let Some(fresh) = submitted {
            metrics.record_render(fresh);
        }

        let elapsed = frame_start.elapsed();
        if elapsed < interval {
            thread::sleep(interval - elapsed);
        }
    }

    info!(
        "Render loop stopped: captured={}, rendered={}",
        session.frame_count(),
        metrics.frames_rendered()
    );
}
