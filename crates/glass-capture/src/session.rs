//! Frame ingestion session.
//!
//! A [`CaptureSession`] owns the current input texture for one capture and
//! reconciles two schedules: frames pushed by a backend thread, and the
//! render loop pulling "whatever is current" through
//! [`CaptureSession::process_input`]. A session runs in exactly one mode,
//! fixed at construction:
//!
//! - **native**: the platform hands over GPU surfaces; the session only
//!   tracks the latest surface and its content size.
//! - **bridge**: raw BGRA buffers arrive from the capture module and are
//!   copied into a texture the session owns, recreated on size change.
//! - **image**: one texture is resubmitted on every call.
//!
//! Texture recreation, upload, and the render loop's read all happen under
//! one lock, so the render loop never sees a half-written texture.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use glass_ipc::abi::BridgeStatus;
use glass_ipc::{InputModeKind, SessionEvent};

use crate::bridge::{CaptureBridge, FrameSink, SourceKind};
use crate::copy::copy_rows;
use crate::device::TextureDevice;
use crate::frame::FrameRef;
use crate::native::{PlatformCapture, SurfaceSink};
use crate::stats::FrameStats;
use crate::CaptureResult;

/// Frame metadata handed to the shader stage with each texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// Arrival time of the submitted frame, in milliseconds since the
    /// session started. Repeats of a frame keep its arrival time.
    pub ticks_ms: u64,

    /// Frames ingested so far.
    pub frame_count: u64,

    /// Content size of the submitted texture.
    pub content_size: (u32, u32),

    /// A new frame arrived since the previous submission.
    pub fresh: bool,
}

/// The shader stage fed by a session.
pub trait ShaderPipeline<T> {
    fn process(&mut self, input: &T, frame: &FrameInfo);
}

struct FrameSlot<T> {
    texture: Option<T>,
    texture_size: (u32, u32),
}

/// State shared between the session and its delivery thread.
struct SessionShared<T> {
    slot: Mutex<FrameSlot<T>>,
    content_size: AtomicU64,
    stats: Mutex<FrameStats>,
    clock: Instant,
    active: AtomicBool,
    size_notified: AtomicBool,
    frame_tx: Sender<()>,
    frame_rx: Receiver<()>,
    events: Option<Sender<SessionEvent>>,
}

impl<T> SessionShared<T> {
    fn new(events: Option<Sender<SessionEvent>>) -> Self {
        // Single slot: any number of arrivals between two waits wake once.
        let (frame_tx, frame_rx) = crossbeam_channel::bounded(1);
        Self {
            slot: Mutex::new(FrameSlot {
                texture: None,
                texture_size: (0, 0),
            }),
            content_size: AtomicU64::new(0),
            stats: Mutex::new(FrameStats::new(0)),
            clock: Instant::now(),
            active: AtomicBool::new(true),
            size_notified: AtomicBool::new(false),
            frame_tx,
            frame_rx,
            events,
        }
    }

    fn ticks_ms(&self) -> u64 {
        self.clock.elapsed().as_millis() as u64
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn content_size(&self) -> (u32, u32) {
        let packed = self.content_size.load(Ordering::Acquire);
        ((packed >> 32) as u32, packed as u32)
    }

    fn set_content_size(&self, width: u32, height: u32) {
        let packed = (u64::from(width) << 32) | u64::from(height);
        self.content_size.store(packed, Ordering::Release);
    }

    /// Count a committed frame and wake the render loop.
    fn frame_arrived(&self) {
        let now = self.ticks_ms();
        self.stats.lock().record(now);
        let _ = self.frame_tx.try_send(());
    }

    fn notify(&self, event: SessionEvent) {
        if let Some(events) = &self.events {
            if let Err(TrySendError::Full(event)) = events.try_send(event) {
                warn!(?event, "Session event channel full, dropping event");
            }
        }
    }
}

/// Bridge-mode frame sink: copies raw buffers into a session texture.
struct BridgeInput<D: TextureDevice> {
    shared: Arc<SessionShared<D::Texture>>,
    device: Arc<D>,
    oversize_warned: AtomicBool,
}

impl<D: TextureDevice> BridgeInput<D> {
    /// Copy `frame` into the session texture; false if the frame was dropped.
    fn ingest(&self, frame: FrameRef<'_>) -> bool {
        let (width, height) = (frame.width(), frame.height());

        let max = self.device.max_texture_dimension();
        if width > max || height > max {
            if !self.oversize_warned.swap(true, Ordering::Relaxed) {
                warn!(width, height, max, "Frame exceeds texture limit, dropping");
            }
            return false;
        }

        let mut slot = self.shared.slot.lock();
        if !self.shared.is_active() {
            return false;
        }

        if slot.texture.is_none() || slot.texture_size != (width, height) {
            slot.texture = None;
            match self.device.create_texture(width, height) {
                Ok(texture) => {
                    debug!(width, height, "Created input texture");
                    slot.texture = Some(texture);
                    slot.texture_size = (width, height);
                }
                Err(e) => {
                    warn!("Failed to create input texture: {}", e);
                    return false;
                }
            }
        }

        let Some(texture) = slot.texture.as_ref() else {
            return false;
        };

        let uploaded = self.device.write_texture(texture, &mut |mapped| {
            copy_rows(
                frame.data(),
                frame.pitch(),
                mapped.data,
                mapped.row_pitch,
                frame.row_bytes(),
                height as usize,
            )
        });
        if let Err(e) = uploaded {
            warn!("Failed to upload frame: {}", e);
            return false;
        }

        self.shared.set_content_size(width, height);
        true
    }
}

impl<D: TextureDevice> FrameSink for BridgeInput<D> {
    fn on_frame(&self, frame: FrameRef<'_>) {
        if !self.ingest(frame) {
            return;
        }

        self.shared.frame_arrived();

        if !self.shared.size_notified.swap(true, Ordering::AcqRel) {
            let (width, height) = (frame.width(), frame.height());
            info!(width, height, "First bridge frame, content size known");
            self.shared
                .notify(SessionEvent::FirstFrame { width, height });
        }
    }
}

/// Native-mode sink: tracks the latest platform surface.
struct NativeInput<T> {
    shared: Arc<SessionShared<T>>,
}

impl<T: Send + Sync> SurfaceSink<T> for NativeInput<T> {
    fn on_surface(&self, surface: T, width: u32, height: u32) {
        {
            let mut slot = self.shared.slot.lock();
            if !self.shared.is_active() {
                return;
            }
            slot.texture = Some(surface);
            slot.texture_size = (width, height);
            self.shared.set_content_size(width, height);
        }
        self.shared.frame_arrived();
    }
}

enum InputMode<T> {
    Native {
        capture: Mutex<Box<dyn PlatformCapture<T>>>,
    },
    Bridge {
        bridge: Arc<CaptureBridge>,
        // The bridge only holds a weak reference.
        _sink: Arc<dyn FrameSink>,
    },
    Image,
}

/// One capture stream feeding the shader stage.
pub struct CaptureSession<T: Clone + Send + Sync + 'static> {
    shared: Arc<SessionShared<T>>,
    mode: InputMode<T>,
    last_submitted: AtomicU64,
}

impl<T: Clone + Send + Sync + 'static> CaptureSession<T> {
    /// Start a native capture.
    ///
    /// The content size starts as the capture item's size and follows every
    /// delivered surface.
    #[instrument(name = "session_native", skip_all)]
    pub fn native(
        mut capture: Box<dyn PlatformCapture<T>>,
        events: Option<Sender<SessionEvent>>,
    ) -> CaptureResult<Self> {
        let shared = Arc::new(SessionShared::new(events));
        let (width, height) = capture.dimensions();
        shared.set_content_size(width, height);

        let sink: Arc<dyn SurfaceSink<T>> = Arc::new(NativeInput {
            shared: Arc::clone(&shared),
        });
        capture.start(sink)?;

        info!(width, height, "Native capture session started");
        Ok(Self {
            shared,
            mode: InputMode::Native {
                capture: Mutex::new(capture),
            },
            last_submitted: AtomicU64::new(0),
        })
    }

    /// Start a bridge capture uploading through `device`.
    ///
    /// The content size is unknown (0x0) until the first frame, which also
    /// raises a single [`SessionEvent::FirstFrame`].
    #[instrument(name = "session_bridge", skip(device, bridge, events))]
    pub fn bridge<D>(
        device: Arc<D>,
        bridge: Arc<CaptureBridge>,
        kind: SourceKind,
        want_cursor: bool,
        events: Option<Sender<SessionEvent>>,
    ) -> CaptureResult<Self>
    where
        D: TextureDevice<Texture = T>,
    {
        let shared = Arc::new(SessionShared::new(events));
        let sink: Arc<dyn FrameSink> = Arc::new(BridgeInput {
            shared: Arc::clone(&shared),
            device,
            oversize_warned: AtomicBool::new(false),
        });

        bridge.start(kind, want_cursor, Arc::downgrade(&sink))?;

        info!("Bridge capture session started");
        Ok(Self {
            shared,
            mode: InputMode::Bridge {
                bridge,
                _sink: sink,
            },
            last_submitted: AtomicU64::new(0),
        })
    }

    /// Wrap a static texture as a perpetual frame.
    pub fn image(texture: T, width: u32, height: u32) -> Self {
        let shared = SessionShared::new(None);
        {
            let mut slot = shared.slot.lock();
            slot.texture = Some(texture);
            slot.texture_size = (width, height);
        }
        shared.set_content_size(width, height);

        debug!(width, height, "Image session created");
        Self {
            shared: Arc::new(shared),
            mode: InputMode::Image,
            last_submitted: AtomicU64::new(0),
        }
    }

    /// Submit the current texture to `pipeline`.
    ///
    /// Never waits for a new frame: a slow capture repeats its last frame and
    /// a fast one skips frames. Returns false if there is nothing to submit.
    pub fn process_input(&self, pipeline: &mut dyn ShaderPipeline<T>) -> bool {
        if !self.shared.is_active() {
            return false;
        }

        match &self.mode {
            InputMode::Bridge { .. } => {
                // Held across `process` so the delivery thread cannot swap
                // or rewrite the texture underneath the shader stage.
                let slot = self.shared.slot.lock();
                let Some(texture) = slot.texture.as_ref() else {
                    return false;
                };
                let info = self.frame_info();
                pipeline.process(texture, &info);
                true
            }
            InputMode::Native { .. } | InputMode::Image => {
                let texture = self.shared.slot.lock().texture.clone();
                let Some(texture) = texture else {
                    return false;
                };
                let info = self.frame_info();
                pipeline.process(&texture, &info);
                true
            }
        }
    }

    fn frame_info(&self) -> FrameInfo {
        let (frame_count, ticks_ms) = {
            let stats = self.shared.stats.lock();
            (stats.frame_count(), stats.last_frame_ms())
        };
        let previous = self.last_submitted.swap(frame_count, Ordering::AcqRel);
        FrameInfo {
            ticks_ms,
            frame_count,
            content_size: self.shared.content_size(),
            fresh: frame_count != previous,
        }
    }

    /// Last committed content size; (0, 0) before the first bridge frame.
    pub fn content_size(&self) -> (u32, u32) {
        self.shared.content_size()
    }

    /// Input frame rate over the last completed one-second window.
    pub fn fps(&self) -> f32 {
        self.shared.stats.lock().fps()
    }

    /// Frames ingested so far.
    pub fn frame_count(&self) -> u64 {
        self.shared.stats.lock().frame_count()
    }

    /// Block until a frame arrives or `timeout` elapses.
    pub fn wait_for_frame(&self, timeout: Duration) -> bool {
        self.shared.frame_rx.recv_timeout(timeout).is_ok()
    }

    pub fn mode(&self) -> InputModeKind {
        match self.mode {
            InputMode::Native { .. } => InputModeKind::Native,
            InputMode::Bridge { .. } => InputModeKind::Bridge,
            InputMode::Image => InputModeKind::Image,
        }
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    /// Show or hide the cursor in a native capture.
    ///
    /// Bridge captures fix the cursor at start and image sessions have none,
    /// so both ignore the call.
    pub fn update_cursor(&self, visible: bool) -> CaptureResult<()> {
        match &self.mode {
            InputMode::Native { capture } => capture.lock().set_cursor_capture(visible),
            InputMode::Bridge { .. } | InputMode::Image => {
                debug!(visible, "Cursor toggle ignored for this input mode");
                Ok(())
            }
        }
    }

    /// State reported by the capture module, for bridge sessions.
    pub fn backend_status(&self) -> Option<BridgeStatus> {
        match &self.mode {
            InputMode::Bridge { bridge, .. } => Some(bridge.status()),
            InputMode::Native { .. } | InputMode::Image => None,
        }
    }

    /// Stop capturing and release the texture. Later calls do nothing.
    #[instrument(name = "session_stop", skip(self))]
    pub fn stop(&self) {
        if !self.shared.active.swap(false, Ordering::AcqRel) {
            return;
        }

        info!(mode = self.mode().name(), "Stopping capture session");

        match &self.mode {
            InputMode::Native { capture } => {
                if let Err(e) = capture.lock().stop() {
                    warn!("Failed to stop native capture: {}", e);
                }
            }
            InputMode::Bridge { bridge, .. } => {
                if let Err(e) = bridge.stop() {
                    warn!("Failed to stop bridge capture: {}", e);
                }
            }
            InputMode::Image => {}
        }

        {
            let mut slot = self.shared.slot.lock();
            slot.texture = None;
            slot.texture_size = (0, 0);
        }

        self.shared.notify(SessionEvent::Stopped);
    }
}

impl<T: Clone + Send + Sync + 'static> Drop for CaptureSession<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    use glass_ipc::abi::SOURCE_WINDOW;

    use crate::device::{MemoryDevice, MemoryTexture};
    use crate::error::{BridgeError, CaptureError};
    use crate::testing::{
        emit, emit_solid, last_source_kind, module_active, registered_callback, FakeLoader,
    };

    #[derive(Default)]
    struct RecordingPipeline {
        submitted: Vec<(MemoryTexture, FrameInfo)>,
    }

    impl ShaderPipeline<MemoryTexture> for RecordingPipeline {
        fn process(&mut self, input: &MemoryTexture, frame: &FrameInfo) {
            self.submitted.push((input.clone(), *frame));
        }
    }

    struct BridgeFixture {
        device: Arc<MemoryDevice>,
        bridge: Arc<CaptureBridge>,
        events: Receiver<SessionEvent>,
        session: CaptureSession<MemoryTexture>,
    }

    fn bridge_session(device: MemoryDevice) -> BridgeFixture {
        let opens = Arc::new(AtomicUsize::new(0));
        let device = Arc::new(device);
        let bridge = Arc::new(CaptureBridge::new(FakeLoader::new(&opens)));
        let (events_tx, events) = crossbeam_channel::unbounded();
        let session = CaptureSession::bridge(
            Arc::clone(&device),
            Arc::clone(&bridge),
            SourceKind::Desktop,
            true,
            Some(events_tx),
        )
        .unwrap();
        BridgeFixture {
            device,
            bridge,
            events,
            session,
        }
    }

    fn current_texture(session: &CaptureSession<MemoryTexture>) -> Option<MemoryTexture> {
        let mut pipeline = RecordingPipeline::default();
        session.process_input(&mut pipeline);
        pipeline.submitted.pop().map(|(texture, _)| texture)
    }

    #[test]
    fn test_content_size_follows_each_frame() {
        let fixture = bridge_session(MemoryDevice::default());
        assert_eq!(fixture.session.content_size(), (0, 0));
        assert_eq!(fixture.session.mode(), InputModeKind::Bridge);

        emit_solid(800, 600, 3200, 1);
        assert_eq!(fixture.session.content_size(), (800, 600));

        emit_solid(640, 480, 2600, 1);
        assert_eq!(fixture.session.content_size(), (640, 480));
        assert_eq!(fixture.session.frame_count(), 2);
    }

    #[test]
    fn test_degenerate_frames_leave_state_unchanged() {
        let fixture = bridge_session(MemoryDevice::default());
        emit_solid(32, 16, 128, 7);
        let before = current_texture(&fixture.session).unwrap();

        let pixels = vec![0u8; 4096];
        emit(std::ptr::null(), 32, 16, 128);
        emit(pixels.as_ptr(), 0, 16, 128);
        emit(pixels.as_ptr(), 32, 0, 128);
        emit(pixels.as_ptr(), 32, 16, 0);

        assert_eq!(fixture.session.content_size(), (32, 16));
        assert_eq!(fixture.session.frame_count(), 1);
        let after = current_texture(&fixture.session).unwrap();
        assert_eq!(after.id(), before.id());
        assert_eq!(after.pixel(0, 0), [7, 7, 7, 7]);
    }

    #[test]
    fn test_texture_recreated_only_on_size_change() {
        let fixture = bridge_session(MemoryDevice::default());

        emit_solid(32, 16, 128, 1);
        let first = current_texture(&fixture.session).unwrap();
        emit_solid(32, 16, 160, 2);
        let second = current_texture(&fixture.session).unwrap();
        assert_eq!(first.id(), second.id());
        assert_eq!(fixture.device.textures_created(), 1);

        emit_solid(64, 16, 256, 3);
        let third = current_texture(&fixture.session).unwrap();
        assert_ne!(third.id(), second.id());
        assert_eq!((third.width(), third.height()), (64, 16));
        assert_eq!(fixture.device.textures_created(), 2);
    }

    #[test]
    fn test_first_frame_notified_once() {
        let fixture = bridge_session(MemoryDevice::default());

        emit_solid(800, 600, 3200, 0);
        emit_solid(800, 600, 3200, 0);
        emit_solid(1024, 768, 4096, 0);

        let events: Vec<SessionEvent> = fixture.events.try_iter().collect();
        assert_eq!(
            events,
            vec![SessionEvent::FirstFrame {
                width: 800,
                height: 600
            }]
        );
        assert_eq!(fixture.device.textures_created(), 2);
        assert_eq!(fixture.session.content_size(), (1024, 768));
    }

    #[test]
    fn test_rows_copied_into_device_pitch() {
        // 3 pixels wide: 12 meaningful bytes, producer pitch 16, device pitch 64
        let fixture = bridge_session(MemoryDevice::new(64, 4096));
        let mut pixels = vec![0xEEu8; 16 * 2];
        for row in 0..2 {
            for byte in 0..12 {
                pixels[row * 16 + byte] = (row * 12 + byte) as u8;
            }
        }
        emit(pixels.as_ptr(), 3, 2, 16);

        let texture = current_texture(&fixture.session).unwrap();
        assert_eq!(texture.row_pitch(), 64);
        let bytes = texture.pixels();
        for row in 0..2 {
            let expected: Vec<u8> = (0..12).map(|byte| (row * 12 + byte) as u8).collect();
            assert_eq!(&bytes[row * 64..row * 64 + 12], expected.as_slice());
            assert!(bytes[row * 64 + 12..(row + 1) * 64].iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn test_nothing_to_process_before_first_frame() {
        let fixture = bridge_session(MemoryDevice::default());
        let mut pipeline = RecordingPipeline::default();
        assert!(!fixture.session.process_input(&mut pipeline));
        assert!(pipeline.submitted.is_empty());
    }

    #[test]
    fn test_fresh_flag_marks_new_frames() {
        let fixture = bridge_session(MemoryDevice::default());
        let mut pipeline = RecordingPipeline::default();

        emit_solid(8, 8, 32, 1);
        assert!(fixture.session.process_input(&mut pipeline));
        assert!(fixture.session.process_input(&mut pipeline));
        emit_solid(8, 8, 32, 2);
        assert!(fixture.session.process_input(&mut pipeline));

        let fresh: Vec<bool> = pipeline.submitted.iter().map(|(_, f)| f.fresh).collect();
        assert_eq!(fresh, vec![true, false, true]);
        assert_eq!(pipeline.submitted[2].1.frame_count, 2);
        assert_eq!(pipeline.submitted[2].1.content_size, (8, 8));
    }

    #[test]
    fn test_repeated_frame_keeps_arrival_ticks() {
        let fixture = bridge_session(MemoryDevice::default());
        let mut pipeline = RecordingPipeline::default();

        emit_solid(8, 8, 32, 1);
        assert!(fixture.session.process_input(&mut pipeline));
        thread::sleep(Duration::from_millis(50));
        assert!(fixture.session.process_input(&mut pipeline));

        let (first, repeat) = (pipeline.submitted[0].1, pipeline.submitted[1].1);
        assert!(first.fresh);
        assert!(!repeat.fresh);
        assert_eq!(repeat.ticks_ms, first.ticks_ms);

        emit_solid(8, 8, 32, 2);
        assert!(fixture.session.process_input(&mut pipeline));
        let next = pipeline.submitted[2].1;
        assert!(next.fresh);
        assert!(next.ticks_ms >= first.ticks_ms + 50);
    }

    #[derive(Default)]
    struct SizeCheckingPipeline {
        processed: u32,
        mismatches: u32,
    }

    impl ShaderPipeline<MemoryTexture> for SizeCheckingPipeline {
        fn process(&mut self, input: &MemoryTexture, frame: &FrameInfo) {
            self.processed += 1;
            if (input.width(), input.height()) != frame.content_size {
                self.mismatches += 1;
            }
        }
    }

    #[test]
    fn test_texture_matches_content_size_under_concurrent_resizes() {
        let fixture = bridge_session(MemoryDevice::default());
        let (callback, context) = registered_callback().unwrap();

        let done = Arc::new(AtomicBool::new(false));
        let producer = {
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let sizes = [(64u32, 32u32), (32, 64), (48, 48)];
                let pixels = vec![9u8; 64 * 4 * 64];
                for i in 0..600 {
                    let (width, height) = sizes[i % sizes.len()];
                    unsafe {
                        callback(
                            pixels.as_ptr(),
                            width,
                            height,
                            width * 4,
                            context as *mut std::ffi::c_void,
                        )
                    };
                }
                done.store(true, Ordering::Release);
            })
        };

        let mut pipeline = SizeCheckingPipeline::default();
        while !done.load(Ordering::Acquire) {
            fixture.session.process_input(&mut pipeline);
        }
        producer.join().unwrap();
        fixture.session.process_input(&mut pipeline);

        assert!(pipeline.processed > 0);
        assert_eq!(pipeline.mismatches, 0);
        assert_eq!(fixture.session.frame_count(), 600);
    }

    #[test]
    fn test_frame_signal_coalesces() {
        let fixture = bridge_session(MemoryDevice::default());
        assert!(!fixture.session.wait_for_frame(Duration::from_millis(1)));

        emit_solid(8, 8, 32, 1);
        emit_solid(8, 8, 32, 1);
        assert!(fixture.session.wait_for_frame(Duration::from_millis(1)));
        assert!(!fixture.session.wait_for_frame(Duration::from_millis(1)));
    }

    #[test]
    fn test_oversized_frame_dropped() {
        let fixture = bridge_session(MemoryDevice::new(4, 64));
        emit_solid(128, 8, 512, 1);

        assert_eq!(fixture.session.content_size(), (0, 0));
        assert_eq!(fixture.device.textures_created(), 0);
        assert!(fixture.events.try_recv().is_err());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let fixture = bridge_session(MemoryDevice::default());
        emit_solid(16, 16, 64, 1);

        fixture.session.stop();
        fixture.session.stop();

        assert!(!fixture.session.is_active());
        assert!(!fixture.bridge.is_active());
        assert!(!module_active());

        let stopped = fixture
            .events
            .try_iter()
            .filter(|e| *e == SessionEvent::Stopped)
            .count();
        assert_eq!(stopped, 1);
    }

    #[test]
    fn test_late_frames_after_stop_ignored() {
        let fixture = bridge_session(MemoryDevice::default());
        emit_solid(16, 16, 64, 1);
        fixture.session.stop();

        emit_solid(32, 32, 128, 1);
        assert_eq!(fixture.session.frame_count(), 1);
        assert_eq!(fixture.device.textures_created(), 1);

        let mut pipeline = RecordingPipeline::default();
        assert!(!fixture.session.process_input(&mut pipeline));
    }

    #[test]
    fn test_second_bridge_session_refused() {
        let fixture = bridge_session(MemoryDevice::default());
        let result = CaptureSession::bridge(
            Arc::clone(&fixture.device),
            Arc::clone(&fixture.bridge),
            SourceKind::Window,
            false,
            None,
        );
        assert!(matches!(
            result,
            Err(CaptureError::Bridge(BridgeError::AlreadyActive))
        ));

        emit_solid(16, 16, 64, 1);
        assert_eq!(fixture.session.content_size(), (16, 16));
        assert!(fixture.session.is_active());
    }

    #[test]
    fn test_window_kind_passed_to_module() {
        let opens = Arc::new(AtomicUsize::new(0));
        let bridge = Arc::new(CaptureBridge::new(FakeLoader::new(&opens)));
        let _session = CaptureSession::bridge(
            Arc::new(MemoryDevice::default()),
            bridge,
            SourceKind::Window,
            false,
            None,
        )
        .unwrap();
        assert_eq!(last_source_kind(), Some(SOURCE_WINDOW));
    }

    #[test]
    fn test_image_session_resubmits_texture() {
        let device = MemoryDevice::default();
        let texture = device.create_texture(320, 200).unwrap();
        let session = CaptureSession::image(texture.clone(), 320, 200);
        let mut pipeline = RecordingPipeline::default();

        for _ in 0..3 {
            assert!(session.process_input(&mut pipeline));
        }

        assert_eq!(session.mode(), InputModeKind::Image);
        assert_eq!(session.content_size(), (320, 200));
        assert!(pipeline
            .submitted
            .iter()
            .all(|(t, _)| t.id() == texture.id()));
        assert!(session.backend_status().is_none());
        assert!(session.update_cursor(false).is_ok());
    }

    #[derive(Default)]
    struct FakeCaptureState {
        sink: Option<Arc<dyn SurfaceSink<MemoryTexture>>>,
        started: bool,
        stops: u32,
        cursor: Option<bool>,
    }

    struct FakeCapture {
        state: Arc<Mutex<FakeCaptureState>>,
    }

    impl PlatformCapture<MemoryTexture> for FakeCapture {
        fn start(&mut self, sink: Arc<dyn SurfaceSink<MemoryTexture>>) -> CaptureResult<()> {
            let mut state = self.state.lock();
            state.sink = Some(sink);
            state.started = true;
            Ok(())
        }

        fn stop(&mut self) -> CaptureResult<()> {
            let mut state = self.state.lock();
            state.stops += 1;
            state.started = false;
            Ok(())
        }

        fn is_active(&self) -> bool {
            self.state.lock().started
        }

        fn dimensions(&self) -> (u32, u32) {
            (1920, 1080)
        }

        fn set_cursor_capture(&mut self, visible: bool) -> CaptureResult<()> {
            self.state.lock().cursor = Some(visible);
            Ok(())
        }
    }

    #[test]
    fn test_native_session_tracks_surfaces() {
        let device = MemoryDevice::default();
        let state = Arc::new(Mutex::new(FakeCaptureState::default()));
        let session = CaptureSession::native(
            Box::new(FakeCapture {
                state: Arc::clone(&state),
            }),
            None,
        )
        .unwrap();

        assert_eq!(session.mode(), InputModeKind::Native);
        assert_eq!(session.content_size(), (1920, 1080));
        assert!(current_texture(&session).is_none());

        // the platform reports a resized window
        let surface = device.create_texture(1280, 720).unwrap();
        let sink = state.lock().sink.clone().unwrap();
        sink.on_surface(surface.clone(), 1280, 720);

        assert_eq!(session.content_size(), (1280, 720));
        assert_eq!(current_texture(&session).unwrap().id(), surface.id());
        assert_eq!(session.frame_count(), 1);

        session.update_cursor(false).unwrap();
        assert_eq!(state.lock().cursor, Some(false));

        session.stop();
        session.stop();
        assert_eq!(state.lock().stops, 1);

        sink.on_surface(device.create_texture(64, 64).unwrap(), 64, 64);
        assert_eq!(session.frame_count(), 1);
    }
}
