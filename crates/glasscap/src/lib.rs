//! Capture module for the glass frame ingestion bridge.
//!
//! Built as a dynamic library and loaded by the host at runtime. The host
//! resolves the `CaptureLib*` entry points declared in [`glass_ipc::abi`]
//! and receives BGRA frames through its callback, on threads owned by this
//! module.
//!
//! Backends:
//! - `portal` (Linux): desktop portal ScreenCast streamed from PipeWire
//!   through GStreamer
//! - `pattern`: a synthetic moving gradient
//!
//! `GLASSCAP_BACKEND` picks one at first use; `GLASSCAP_LOG` sets the log
//! filter.

mod backend;
mod delivery;
mod error;
mod module;
mod pattern;
#[cfg(target_os = "linux")]
mod pipewire;
#[cfg(target_os = "linux")]
mod portal;

pub use backend::{BackendKind, CaptureBackend, StartRequest, StatusCell, BACKEND_ENV};
pub use delivery::{Delivery, Feed};
pub use error::{ModuleError, ModuleResult};
pub use module::Module;
pub use pattern::{pattern_pixel, render_pattern, PatternBackend, PATTERN_HEIGHT, PATTERN_WIDTH};
#[cfg(target_os = "linux")]
pub use pipewire::{crop_region, Region};

use std::ffi::c_void;
use std::sync::OnceLock;

use tracing::warn;
use tracing_subscriber::EnvFilter;

use glass_ipc::abi::{FrameCallback, CAPTURE_LIB_VERSION, STATUS_FAIL, STATUS_OK};

/// Environment variable holding the module's log filter.
pub const LOG_ENV: &str = "GLASSCAP_LOG";

static MODULE: OnceLock<Module> = OnceLock::new();

fn module() -> &'static Module {
    MODULE.get_or_init(Module::from_env)
}

/// The module owns its own copy of `tracing`, so the host's subscriber
/// does not see these events. A subscriber already installed in this
/// copy wins.
fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new("glasscap=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn status_code(result: ModuleResult<()>, operation: &str) -> i32 {
    match result {
        Ok(()) => STATUS_OK,
        Err(e) => {
            warn!(operation, "{}", e);
            STATUS_FAIL
        }
    }
}

#[no_mangle]
pub extern "system" fn CaptureLibVersion() -> u32 {
    CAPTURE_LIB_VERSION
}

#[no_mangle]
pub extern "system" fn CaptureLibInit() -> i32 {
    init_logging();
    status_code(module().init(), "init")
}

/// # Safety
///
/// `context` is passed back to `callback` untouched; the caller keeps it
/// valid for as long as frames may arrive.
#[no_mangle]
pub unsafe extern "system" fn CaptureLibStart(
    source_kind: u32,
    want_cursor: u32,
    callback: FrameCallback,
    context: *mut c_void,
) -> i32 {
    let request = StartRequest::from_raw(source_kind, want_cursor);
    status_code(module().start(request, callback, context), "start")
}

#[no_mangle]
pub extern "system" fn CaptureLibStop() -> i32 {
    status_code(module().stop(), "stop")
}

#[no_mangle]
pub extern "system" fn CaptureLibStatus() -> u32 {
    module().status().to_raw()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    use glass_capture::{
        BridgeError, BridgeLibrary, CaptureBridge, CaptureSession, FrameInfo, LibraryLoader,
        MemoryDevice, MemoryTexture, ShaderPipeline, SourceKind,
    };
    use glass_ipc::abi::{
        BridgeStatus, INIT_SYMBOL, START_SYMBOL, STATUS_SYMBOL, STOP_SYMBOL, VERSION_SYMBOL,
    };

    /// Resolves the entry points linked into this test binary.
    struct LinkedExports;

    impl BridgeLibrary for LinkedExports {
        fn symbol(&self, name: &str) -> Option<*const c_void> {
            let address = match name {
                VERSION_SYMBOL => CaptureLibVersion as usize,
                INIT_SYMBOL => CaptureLibInit as usize,
                START_SYMBOL => CaptureLibStart as usize,
                STOP_SYMBOL => CaptureLibStop as usize,
                STATUS_SYMBOL => CaptureLibStatus as usize,
                _ => return None,
            };
            Some(address as *const c_void)
        }
    }

    struct LinkedLoader {
        opens: Arc<AtomicUsize>,
    }

    impl LibraryLoader for LinkedLoader {
        fn open(&self) -> Result<Box<dyn BridgeLibrary>, BridgeError> {
            self.opens.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(Box::new(LinkedExports))
        }
    }

    #[derive(Default)]
    struct Probe {
        corner: Option<[u8; 4]>,
        inner: Option<[u8; 4]>,
        info: Option<FrameInfo>,
    }

    impl ShaderPipeline<MemoryTexture> for Probe {
        fn process(&mut self, input: &MemoryTexture, frame: &FrameInfo) {
            self.corner = Some(input.pixel(0, 0));
            self.inner = Some(input.pixel(10, 5));
            self.info = Some(*frame);
        }
    }

    #[test]
    fn test_pattern_through_host_bridge() {
        // The only test touching the process-wide module.
        std::env::set_var(BACKEND_ENV, "pattern");

        let opens = Arc::new(AtomicUsize::new(0));
        let bridge = Arc::new(CaptureBridge::new(LinkedLoader {
            opens: Arc::clone(&opens),
        }));
        bridge.load().unwrap();
        assert_eq!(bridge.version(), Some(CAPTURE_LIB_VERSION));

        let device = Arc::new(MemoryDevice::default());
        let session = CaptureSession::bridge(
            device,
            Arc::clone(&bridge),
            SourceKind::Desktop,
            true,
            None,
        )
        .unwrap();

        assert!(session.wait_for_frame(Duration::from_secs(2)));
        assert_eq!(session.content_size(), (PATTERN_WIDTH, PATTERN_HEIGHT));
        assert_eq!(bridge.status(), BridgeStatus::Streaming);

        let mut probe = Probe::default();
        assert!(session.process_input(&mut probe));
        let [b, g, _, a] = probe.corner.unwrap();
        assert_eq!((b, g, a), (0xff, 0, 0xff));
        let [b, g, _, a] = probe.inner.unwrap();
        assert_eq!((b, g, a), (0xff, 15, 0xff));
        assert_eq!(probe.info.unwrap().content_size, (640, 480));

        session.stop();
        assert!(!bridge.is_active());
        assert_eq!(CaptureLibStop(), STATUS_FAIL);
        assert_eq!(opens.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
