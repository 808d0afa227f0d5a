//! Synthetic test pattern.
//!
//! A moving gradient at a fixed size, for exercising the host without a
//! compositor or screen-share permission.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use glass_ipc::abi::BridgeStatus;

use crate::backend::{CaptureBackend, StartRequest};
use crate::delivery::Feed;
use crate::error::{ModuleError, ModuleResult};

pub const PATTERN_WIDTH: u32 = 640;
pub const PATTERN_HEIGHT: u32 = 480;
pub const PATTERN_INTERVAL: Duration = Duration::from_millis(10);

/// Packed BGRA pixel (little-endian `0xAARRGGBB`) at `x`, `y` in `frame`.
pub fn pattern_pixel(x: u32, y: u32, frame: u32) -> u32 {
    let red = (x.wrapping_add(frame)) % 255;
    let green = (x + y) % 255;
    0xff00_0000 | (red << 16) | (green << 8) | 0xff
}

/// Fill a tightly packed `PATTERN_WIDTH` x `PATTERN_HEIGHT` buffer.
pub fn render_pattern(buffer: &mut [u8], frame: u32) {
    for (index, pixel) in buffer.chunks_exact_mut(4).enumerate() {
        let x = index as u32 % PATTERN_WIDTH;
        let y = index as u32 / PATTERN_WIDTH;
        pixel.copy_from_slice(&pattern_pixel(x, y, frame).to_le_bytes());
    }
}

pub struct PatternBackend {
    running: Mutex<Option<Arc<AtomicBool>>>,
}

impl PatternBackend {
    pub fn new() -> Self {
        Self {
            running: Mutex::new(None),
        }
    }
}

impl Default for PatternBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for PatternBackend {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn init(&self) -> ModuleResult<()> {
        Ok(())
    }

    fn start(&self, request: StartRequest, feed: Feed) -> ModuleResult<()> {
        let mut running = self.running.lock();
        if let Some(previous) = running.take() {
            previous.store(false, Ordering::SeqCst);
        }

        let flag = Arc::new(AtomicBool::new(true));
        let thread_flag = Arc::clone(&flag);

        thread::Builder::new()
            .name("glasscap-pattern".into())
            .spawn(move || pattern_loop(thread_flag, feed))
            .map_err(|e| ModuleError::Thread(e.to_string()))?;

        *running = Some(flag);
        info!(window = request.is_window(), "Test pattern started");
        Ok(())
    }

    fn stop(&self) {
        if let Some(flag) = self.running.lock().take() {
            flag.store(false, Ordering::SeqCst);
            debug!("Test pattern stopping");
        }
    }

    fn status(&self) -> BridgeStatus {
        match self.running.lock().as_ref() {
            Some(flag) if flag.load(Ordering::SeqCst) => BridgeStatus::Streaming,
            _ => BridgeStatus::Idle,
        }
    }
}

fn pattern_loop(running: Arc<AtomicBool>, feed: Feed) {
    let pitch = PATTERN_WIDTH * 4;
    let mut buffer = vec![0u8; (pitch * PATTERN_HEIGHT) as usize];
    let mut frame: u32 = 0;

    loop {
        thread::sleep(PATTERN_INTERVAL);
        // Stopped while asleep.
        if !running.load(Ordering::SeqCst) {
            break;
        }
        render_pattern(&mut buffer, frame);
        if !feed.deliver(&buffer, PATTERN_WIDTH, PATTERN_HEIGHT, pitch) && !feed.is_current() {
            break;
        }
        frame = frame.wrapping_add(1);
    }

    debug!(frames = frame, "Test pattern thread exiting");
}
