//! Engine error types.

use std::path::PathBuf;

use thiserror::Error;

use glass_capture::{BridgeError, CaptureError};

/// Reasons a capture could not be started or kept running.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Capture unavailable: no native capture and no capture module")]
    CaptureUnavailable,

    #[error("Native capture is not supported on this system")]
    NativeUnsupported,

    #[error("Capture module error: {0}")]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("Failed to load image {path}: {message}")]
    Image { path: PathBuf, message: String },

    #[error("Startup reached {0} without an input")]
    MissingInput(&'static str),
}

impl EngineError {
    /// Whether retrying with other settings may succeed.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::MissingInput(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
