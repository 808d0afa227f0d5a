//! Events sent from the engine to the host.

use serde::{Deserialize, Serialize};

use crate::state::EngineState;
use crate::types::{CaptureMetrics, CaptureSource};

/// Events that the engine can send to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    /// Engine state has changed.
    StateChanged {
        /// Previous state.
        previous: Box<EngineState>,

        /// Current state.
        current: Box<EngineState>,
    },

    /// Updated capture metrics.
    Metrics(CaptureMetrics),

    /// The size of the captured content became known.
    ContentSizeKnown { width: u32, height: u32 },

    /// Error occurred.
    Error {
        /// Whether the error is recoverable.
        recoverable: bool,

        /// Error message.
        message: String,
    },

    /// List of available capture sources.
    CaptureSources(Vec<CaptureSource>),

    /// Engine is ready.
    Ready,

    /// Engine has shut down.
    Shutdown,
}

/// Notifications raised by a capture session on its delivery thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// First frame ingested; the content size is now known.
    FirstFrame { width: u32, height: u32 },

    /// The session has stopped.
    Stopped,
}
