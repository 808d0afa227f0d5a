//! Commands sent from the host to the engine.

use serde::{Deserialize, Serialize};

use crate::types::CaptureConfig;

/// Commands that the host can send to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineCommand {
    /// Start capturing with the given configuration.
    Start { config: CaptureConfig },

    /// Stop the current capture.
    Stop,

    /// Show or hide the cursor in a live capture.
    SetCursor(bool),

    /// Request the list of available capture sources.
    GetCaptureSources,

    /// Request current engine state.
    GetState,

    /// Shutdown the engine completely.
    Shutdown,
}
