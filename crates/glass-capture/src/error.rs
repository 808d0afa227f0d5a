//! Error types for the capture module.

use thiserror::Error;

/// Errors that can occur during capture operations.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Windows API error.
    #[error("Windows API error: {message}")]
    WindowsApi {
        message: String,
        #[cfg(windows)]
        #[source]
        source: Option<windows::core::Error>,
    },

    /// Capture source not found.
    #[error("Capture source not found: {0}")]
    SourceNotFound(String),

    /// Capture already started.
    #[error("Capture already started")]
    AlreadyStarted,

    /// Capture not started.
    #[error("Capture not started")]
    NotStarted,

    /// Native capture not supported on this system.
    #[error("Native capture not supported")]
    NotSupported,

    /// The capture bridge failed to load or run.
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// Texture device failure.
    #[error("Texture device error: {0}")]
    Device(String),

    /// Frame larger than the device can hold.
    #[error("Frame {width}x{height} exceeds the texture limit of {max}")]
    TextureTooLarge { width: u32, height: u32, max: u32 },

    /// Frame geometry does not fit the buffers involved.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Static image could not be loaded.
    #[error("Image error: {0}")]
    Image(String),
}

#[cfg(windows)]
impl From<windows::core::Error> for CaptureError {
    fn from(err: windows::core::Error) -> Self {
        Self::WindowsApi {
            message: err.message().to_string(),
            source: Some(err),
        }
    }
}

/// Errors reported by the capture bridge.
///
/// Load failures are remembered and reported again on every later call,
/// so this type is `Clone`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// The bridge was turned off for this process.
    #[error("Capture bridge is disabled")]
    Disabled,

    /// The capture module could not be opened.
    #[error("Capture module not found: {0}")]
    ModuleNotFound(String),

    /// A required export is missing from the module.
    #[error("Capture module is missing entry point {0}")]
    MissingEntryPoint(&'static str),

    /// The module was built against a different ABI version.
    #[error("Capture module version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    /// The module's init call failed.
    #[error("Capture module init failed with status {0:#010x}")]
    InitFailed(i32),

    /// A capture is already running.
    #[error("Capture bridge is already active")]
    AlreadyActive,

    /// No capture is running.
    #[error("Capture bridge is not active")]
    NotActive,

    /// The module refused to start.
    #[error("Capture module start failed with status {0:#010x}")]
    StartFailed(i32),

    /// The module refused to stop.
    #[error("Capture module stop failed with status {0:#010x}")]
    StopFailed(i32),
}

impl BridgeError {
    /// The bridge is absent or switched off; callers should fall back.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Disabled | Self::ModuleNotFound(_))
    }

    /// The error came from the one-time load step.
    pub fn is_load_failure(&self) -> bool {
        matches!(
            self,
            Self::Disabled
                | Self::ModuleNotFound(_)
                | Self::MissingEntryPoint(_)
                | Self::VersionMismatch { .. }
                | Self::InitFailed(_)
        )
    }
}
