//! Capture bridge: a capture backend loaded at runtime.
//!
//! The bridge module lives in its own dynamic library so the host never
//! links the module's native dependencies. [`CaptureBridge`] resolves the
//! module's entry points once, checks the ABI version, and forwards frames
//! from the module's delivery thread to a [`FrameSink`].

mod loader;

pub use loader::{BridgeLibrary, DynamicLoader, LibraryLoader, MODULE_NAME, MODULE_PATH_ENV};

use std::ffi::c_void;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use tracing::{debug, info, instrument, trace, warn};

use glass_ipc::abi::{
    self, BridgeStatus, InitFn, StartFn, StatusFn, StopFn, VersionFn, CAPTURE_LIB_VERSION,
    STATUS_OK,
};

use crate::error::BridgeError;
use crate::frame::FrameRef;

/// Receives frames on the bridge module's delivery thread.
pub trait FrameSink: Send + Sync {
    fn on_frame(&self, frame: FrameRef<'_>);
}

/// What the bridge module should capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Desktop,
    Window,
}

impl SourceKind {
    fn to_raw(self) -> u32 {
        match self {
            Self::Desktop => abi::SOURCE_DESKTOP,
            Self::Window => abi::SOURCE_WINDOW,
        }
    }
}

/// Entry points resolved from a loaded module.
struct BridgeApi {
    // Keeps the module mapped for as long as the function pointers live.
    _library: Box<dyn BridgeLibrary>,
    version: u32,
    start: StartFn,
    stop: StopFn,
    status: Option<StatusFn>,
}

/// Per-capture record handed to the module as the callback context.
struct DeliveryContext {
    sink: Weak<dyn FrameSink>,
    armed: AtomicBool,
}

/// Process-wide handle to the capture module.
///
/// Construct one per process and share it; loading happens at most once and
/// its outcome, success or failure, is kept for the handle's lifetime.
pub struct CaptureBridge {
    loader: Box<dyn LibraryLoader>,
    disabled: AtomicBool,
    api: OnceLock<Result<BridgeApi, BridgeError>>,
    active: Mutex<Option<Arc<DeliveryContext>>>,
    // Contexts of stopped captures. A callback already in flight when
    // `stop` returns may still read its context, so they are never freed;
    // each holds only a flag and a weak sink.
    retired: Mutex<Vec<Arc<DeliveryContext>>>,
}

impl CaptureBridge {
    /// Create a bridge that opens the module through `loader`.
    pub fn new(loader: impl LibraryLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            disabled: AtomicBool::new(false),
            api: OnceLock::new(),
            active: Mutex::new(None),
            retired: Mutex::new(Vec::new()),
        }
    }

    /// Create a bridge that searches for the module on disk.
    pub fn dynamic() -> Self {
        Self::new(DynamicLoader::default())
    }

    /// Turn the bridge off for good; every later load reports `Disabled`.
    pub fn disable(&self) {
        if !self.disabled.swap(true, Ordering::AcqRel) {
            info!("Capture bridge disabled");
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }

    /// Load the module and resolve its entry points.
    ///
    /// The first call does the work; later calls return the same outcome.
    pub fn load(&self) -> Result<(), BridgeError> {
        self.api().map(|_| ())
    }

    /// Returns true once the module is loaded and initialised.
    pub fn is_loaded(&self) -> bool {
        !self.is_disabled() && matches!(self.api.get(), Some(Ok(_)))
    }

    /// Version reported by the loaded module.
    pub fn version(&self) -> Option<u32> {
        match self.api.get() {
            Some(Ok(api)) => Some(api.version),
            _ => None,
        }
    }

    /// Start continuous frame delivery into `sink`.
    ///
    /// Loads the module if needed. Fails with `AlreadyActive` while another
    /// capture runs, leaving that capture untouched.
    #[instrument(name = "bridge_start", skip(self, sink))]
    pub fn start(
        &self,
        kind: SourceKind,
        want_cursor: bool,
        sink: Weak<dyn FrameSink>,
    ) -> Result<(), BridgeError> {
        let api = self.api()?;

        let mut active = self.active.lock();
        if active.is_some() {
            debug!("Bridge capture already active, refusing start");
            return Err(BridgeError::AlreadyActive);
        }

        let context = Arc::new(DeliveryContext {
            sink,
            armed: AtomicBool::new(true),
        });

        let status = unsafe {
            (api.start)(
                kind.to_raw(),
                u32::from(want_cursor),
                deliver_frame,
                Arc::as_ptr(&context) as *mut c_void,
            )
        };

        if status != STATUS_OK {
            // A refused start leaves the module without the context, so
            // the record is released here.
            warn!(status, "Capture module refused to start");
            return Err(BridgeError::StartFailed(status));
        }

        *active = Some(context);
        info!("Bridge capture started");
        Ok(())
    }

    /// Stop frame delivery.
    ///
    /// No new callback reaches the sink after this returns; one already
    /// running may finish.
    #[instrument(name = "bridge_stop", skip(self))]
    pub fn stop(&self) -> Result<(), BridgeError> {
        let api = match self.api.get() {
            Some(Ok(api)) => api,
            _ => return Err(BridgeError::NotActive),
        };

        let context = self.active.lock().take().ok_or(BridgeError::NotActive)?;
        context.armed.store(false, Ordering::Release);

        let status = unsafe { (api.stop)() };
        self.retired.lock().push(context);

        if status != STATUS_OK {
            warn!(status, "Capture module failed to stop");
            return Err(BridgeError::StopFailed(status));
        }

        info!("Bridge capture stopped");
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Session state reported by the module.
    pub fn status(&self) -> BridgeStatus {
        match self.api.get() {
            Some(Ok(BridgeApi {
                status: Some(status),
                ..
            })) => BridgeStatus::from_raw(unsafe { (*status)() }),
            _ => BridgeStatus::Unknown,
        }
    }

    fn api(&self) -> Result<&BridgeApi, BridgeError> {
        if self.is_disabled() {
            return Err(BridgeError::Disabled);
        }
        self.api
            .get_or_init(|| self.resolve())
            .as_ref()
            .map_err(Clone::clone)
    }

    #[instrument(name = "bridge_load", skip(self))]
    fn resolve(&self) -> Result<BridgeApi, BridgeError> {
        let result = self.resolve_inner();
        match &result {
            Ok(api) => info!(version = api.version, "Capture bridge loaded"),
            Err(e) => warn!("Capture bridge unavailable: {}", e),
        }
        result
    }

    fn resolve_inner(&self) -> Result<BridgeApi, BridgeError> {
        let library = self.loader.open()?;

        let version_fn: VersionFn = unsafe { entry_point(library.as_ref(), abi::VERSION_SYMBOL)? };
        let version = unsafe { version_fn() };
        if version != CAPTURE_LIB_VERSION {
            return Err(BridgeError::VersionMismatch {
                expected: CAPTURE_LIB_VERSION,
                found: version,
            });
        }

        let init_fn: InitFn = unsafe { entry_point(library.as_ref(), abi::INIT_SYMBOL)? };
        let status = unsafe { init_fn() };
        if status != STATUS_OK {
            return Err(BridgeError::InitFailed(status));
        }

        let start: StartFn = unsafe { entry_point(library.as_ref(), abi::START_SYMBOL)? };
        let stop: StopFn = unsafe { entry_point(library.as_ref(), abi::STOP_SYMBOL)? };
        let status: Option<StatusFn> =
            unsafe { entry_point(library.as_ref(), abi::STATUS_SYMBOL).ok() };

        Ok(BridgeApi {
            _library: library,
            version,
            start,
            stop,
            status,
        })
    }
}

/// Resolve `name` as a function pointer of type `F`.
///
/// # Safety
///
/// `F` must be a function pointer type matching the export's signature.
unsafe fn entry_point<F: Copy>(
    library: &dyn BridgeLibrary,
    name: &'static str,
) -> Result<F, BridgeError> {
    debug_assert_eq!(mem::size_of::<F>(), mem::size_of::<*const c_void>());
    let address = library
        .symbol(name)
        .ok_or(BridgeError::MissingEntryPoint(name))?;
    Ok(mem::transmute_copy::<*const c_void, F>(&address))
}

/// Callback handed to the module; runs on the module's delivery thread.
unsafe extern "system" fn deliver_frame(
    data: *const u8,
    width: u32,
    height: u32,
    pitch: u32,
    context: *mut c_void,
) {
    if context.is_null() {
        return;
    }
    let context = &*(context as *const DeliveryContext);
    if !context.armed.load(Ordering::Acquire) {
        return;
    }

    let Some(frame) = FrameRef::from_raw(data, width, height, pitch) else {
        trace!(width, height, pitch, "Dropping degenerate frame");
        return;
    };
    let Some(sink) = context.sink.upgrade() else {
        return;
    };

    // Unwinding across the module boundary is undefined behaviour.
    if panic::catch_unwind(AssertUnwindSafe(|| sink.on_frame(frame))).is_err() {
        warn!("Frame sink panicked; frame dropped");
    }
}
