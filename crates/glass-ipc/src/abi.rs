//! C ABI between the host and a capture module.
//!
//! A capture module is a dynamic library exporting the entry points named
//! below with the system calling convention. The host resolves them at
//! runtime, checks [`CAPTURE_LIB_VERSION`], and receives frames through a
//! [`FrameCallback`] invoked on a thread owned by the module.

use std::ffi::c_void;

/// Version the host and module must agree on.
pub const CAPTURE_LIB_VERSION: u32 = 1;

/// Capture a whole desktop/monitor.
pub const SOURCE_DESKTOP: u32 = 0;

/// Capture a single window.
pub const SOURCE_WINDOW: u32 = 1;

/// Success status.
pub const STATUS_OK: i32 = 0;

/// Generic failure status (`E_FAIL`).
pub const STATUS_FAIL: i32 = 0x8000_4005_u32 as i32;

pub const VERSION_SYMBOL: &str = "CaptureLibVersion";
pub const INIT_SYMBOL: &str = "CaptureLibInit";
pub const START_SYMBOL: &str = "CaptureLibStart";
pub const STOP_SYMBOL: &str = "CaptureLibStop";
/// Optional; modules without it report [`BridgeStatus::Unknown`].
pub const STATUS_SYMBOL: &str = "CaptureLibStatus";

/// Frame delivery callback.
///
/// `data` points to `height` rows of `pitch` bytes each, of which the first
/// `width * 4` are BGRA/BGRx pixels. The buffer is only valid for the
/// duration of the call.
pub type FrameCallback = unsafe extern "system" fn(
    data: *const u8,
    width: u32,
    height: u32,
    pitch: u32,
    context: *mut c_void,
);

pub type VersionFn = unsafe extern "system" fn() -> u32;
pub type InitFn = unsafe extern "system" fn() -> i32;
pub type StartFn = unsafe extern "system" fn(
    source_kind: u32,
    want_cursor: u32,
    callback: FrameCallback,
    context: *mut c_void,
) -> i32;
pub type StopFn = unsafe extern "system" fn() -> i32;
pub type StatusFn = unsafe extern "system" fn() -> u32;

/// Session state reported by a module's status entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeStatus {
    /// No capture requested.
    Idle,

    /// Waiting on the screen-share handshake.
    Negotiating,

    /// Frames are flowing.
    Streaming,

    /// The user declined the screen-share prompt.
    Denied,

    /// The module failed to establish a stream.
    Failed,

    /// The module does not report status.
    Unknown,
}

impl BridgeStatus {
    /// Wire value for this status.
    pub fn to_raw(self) -> u32 {
        match self {
            Self::Idle => 0,
            Self::Negotiating => 1,
            Self::Streaming => 2,
            Self::Denied => 3,
            Self::Failed => 4,
            Self::Unknown => u32::MAX,
        }
    }

    /// Parse a wire value; anything unrecognised is `Unknown`.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::Negotiating,
            2 => Self::Streaming,
            3 => Self::Denied,
            4 => Self::Failed,
            _ => Self::Unknown,
        }
    }

    /// Returns true if the module gave up on the current capture.
    pub fn is_terminal_failure(self) -> bool {
        matches!(self, Self::Denied | Self::Failed)
    }
}
