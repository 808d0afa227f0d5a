//! In-process stand-in for a capture module.
//!
//! Module state is thread-local, so each test drives its own fake and
//! delivers frames on the test thread. Tests that need a delivery thread
//! take the callback out with [`registered_callback`].

use std::cell::RefCell;
use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use glass_ipc::abi::{
    self, BridgeStatus, FrameCallback, InitFn, StartFn, VersionFn, CAPTURE_LIB_VERSION,
    STATUS_FAIL, STATUS_OK,
};

use crate::bridge::{BridgeLibrary, LibraryLoader};
use crate::error::BridgeError;

#[derive(Default)]
struct FakeModule {
    active: bool,
    starts: u32,
    last_kind: Option<u32>,
    callback: Option<(FrameCallback, usize)>,
}

thread_local! {
    static MODULE: RefCell<FakeModule> = RefCell::new(FakeModule::default());
}

pub unsafe extern "system" fn version_current() -> u32 {
    CAPTURE_LIB_VERSION
}

pub unsafe extern "system" fn version_next() -> u32 {
    CAPTURE_LIB_VERSION + 1
}

pub unsafe extern "system" fn init_ok() -> i32 {
    STATUS_OK
}

pub unsafe extern "system" fn init_fail() -> i32 {
    STATUS_FAIL
}

unsafe extern "system" fn fake_start(
    kind: u32,
    _cursor: u32,
    callback: FrameCallback,
    context: *mut c_void,
) -> i32 {
    MODULE.with(|module| {
        let mut module = module.borrow_mut();
        if module.active {
            return STATUS_FAIL;
        }
        module.active = true;
        module.starts += 1;
        module.last_kind = Some(kind);
        module.callback = Some((callback, context as usize));
        STATUS_OK
    })
}

pub unsafe extern "system" fn start_refuse(
    _kind: u32,
    _cursor: u32,
    _callback: FrameCallback,
    _context: *mut c_void,
) -> i32 {
    STATUS_FAIL
}

unsafe extern "system" fn fake_stop() -> i32 {
    MODULE.with(|module| {
        let mut module = module.borrow_mut();
        if !module.active {
            return STATUS_FAIL;
        }
        module.active = false;
        STATUS_OK
    })
}

unsafe extern "system" fn status_streaming() -> u32 {
    BridgeStatus::Streaming.to_raw()
}

/// Invoke the most recently registered callback, even after stop.
pub fn emit(data: *const u8, width: u32, height: u32, pitch: u32) {
    let registered = MODULE.with(|module| module.borrow().callback);
    if let Some((callback, context)) = registered {
        unsafe { callback(data, width, height, pitch, context as *mut c_void) };
    }
}

/// Callback and context from the last start on this thread.
pub fn registered_callback() -> Option<(FrameCallback, usize)> {
    MODULE.with(|module| module.borrow().callback)
}

/// Deliver a solid `width` x `height` frame with the given pitch.
pub fn emit_solid(width: u32, height: u32, pitch: u32, value: u8) {
    let pixels = vec![value; pitch as usize * height as usize];
    emit(pixels.as_ptr(), width, height, pitch);
}

pub fn module_starts() -> u32 {
    MODULE.with(|module| module.borrow().starts)
}

pub fn module_active() -> bool {
    MODULE.with(|module| module.borrow().active)
}

pub fn last_source_kind() -> Option<u32> {
    MODULE.with(|module| module.borrow().last_kind)
}

struct FakeLibrary {
    symbols: Vec<(&'static str, usize)>,
}

impl BridgeLibrary for FakeLibrary {
    fn symbol(&self, name: &str) -> Option<*const c_void> {
        self.symbols
            .iter()
            .find(|(symbol, _)| *symbol == name)
            .map(|(_, address)| *address as *const c_void)
    }
}

pub struct FakeLoader {
    pub opens: Arc<AtomicUsize>,
    pub missing: bool,
    pub version: VersionFn,
    pub init: InitFn,
    pub start: StartFn,
    pub omit: Option<&'static str>,
    pub with_status: bool,
}

impl FakeLoader {
    pub fn new(opens: &Arc<AtomicUsize>) -> Self {
        Self {
            opens: Arc::clone(opens),
            missing: false,
            version: version_current,
            init: init_ok,
            start: fake_start,
            omit: None,
            with_status: false,
        }
    }
}

impl LibraryLoader for FakeLoader {
    fn open(&self) -> Result<Box<dyn BridgeLibrary>, BridgeError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.missing {
            return Err(BridgeError::ModuleNotFound("libfake.so".to_string()));
        }

        let mut symbols = vec![
            (abi::VERSION_SYMBOL, self.version as usize),
            (abi::INIT_SYMBOL, self.init as usize),
            (abi::START_SYMBOL, self.start as usize),
            (abi::STOP_SYMBOL, fake_stop as usize),
        ];
        if self.with_status {
            symbols.push((abi::STATUS_SYMBOL, status_streaming as usize));
        }
        if let Some(omit) = self.omit {
            symbols.retain(|(symbol, _)| *symbol != omit);
        }
        Ok(Box::new(FakeLibrary { symbols }))
    }
}
