//! Error types for the capture module.

use thiserror::Error;

use glass_ipc::abi::BridgeStatus;

/// Errors raised inside the capture module.
///
/// None of these cross the ABI; exported functions log them and return
/// a failure status.
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("Capture already active")]
    AlreadyActive,

    #[error("Capture not active")]
    NotActive,

    #[error("Screen cast portal unavailable: {0}")]
    PortalUnavailable(String),

    #[error("Screen cast denied or cancelled by user")]
    Denied,

    #[error("Portal error: {0}")]
    Portal(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Failed to spawn capture thread: {0}")]
    Thread(String),
}

impl ModuleError {
    /// Status a capture lands in after failing with this error.
    pub fn status(&self) -> BridgeStatus {
        match self {
            Self::Denied => BridgeStatus::Denied,
            _ => BridgeStatus::Failed,
        }
    }
}

#[cfg(target_os = "linux")]
impl From<ashpd::Error> for ModuleError {
    fn from(err: ashpd::Error) -> Self {
        match err {
            // The portal answers a declined or dismissed dialog with a
            // non-zero response code.
            ashpd::Error::Response(_) => Self::Denied,
            other => Self::Portal(other.to_string()),
        }
    }
}

pub type ModuleResult<T> = Result<T, ModuleError>;
