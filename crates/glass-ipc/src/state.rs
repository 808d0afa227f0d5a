//! Engine state machine types.

use serde::{Deserialize, Serialize};

use crate::types::{CaptureConfig, InputModeKind};

/// The current state of the capture engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum EngineState {
    /// Engine is idle, not capturing.
    #[default]
    Idle,

    /// Engine is starting up.
    Starting {
        /// Current startup phase.
        phase: StartupPhase,
    },

    /// Engine is capturing and rendering.
    Capturing {
        /// Active capture configuration.
        config: CaptureConfig,

        /// Input mode chosen for this capture.
        mode: InputModeKind,
    },

    /// Engine is stopping.
    Stopping {
        /// Reason for stopping.
        reason: StopReason,
    },

    /// Engine encountered an error.
    Error {
        /// Error message.
        message: String,

        /// Whether recovery is possible.
        recoverable: bool,
    },
}

impl EngineState {
    /// Returns true if the engine is in the Idle state.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Returns true if the engine is currently capturing.
    pub fn is_capturing(&self) -> bool {
        matches!(self, Self::Capturing { .. })
    }

    /// Returns true if the engine is starting.
    pub fn is_starting(&self) -> bool {
        matches!(self, Self::Starting { .. })
    }

    /// Returns true if the engine is stopping.
    pub fn is_stopping(&self) -> bool {
        matches!(self, Self::Stopping { .. })
    }

    /// Returns a simple string representation of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Starting { .. } => "Starting",
            Self::Capturing { .. } => "Capturing",
            Self::Stopping { .. } => "Stopping",
            Self::Error { .. } => "Error",
        }
    }
}

/// Startup phases for the engine, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartupPhase {
    /// Choosing between native capture, the bridge module and a static image.
    SelectInput,

    /// Opening the capture session.
    OpenSession,

    /// Starting the render loop.
    StartRender,
}

impl StartupPhase {
    /// Returns the next phase, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::SelectInput => Some(Self::OpenSession),
            Self::OpenSession => Some(Self::StartRender),
            Self::StartRender => None,
        }
    }

    /// Returns the previous phase, if any (for rollback).
    pub fn previous(self) -> Option<Self> {
        match self {
            Self::SelectInput => None,
            Self::OpenSession => Some(Self::SelectInput),
            Self::StartRender => Some(Self::OpenSession),
        }
    }

    /// Returns the display name for this phase.
    pub fn name(self) -> &'static str {
        match self {
            Self::SelectInput => "Selecting input",
            Self::OpenSession => "Opening capture",
            Self::StartRender => "Starting render",
        }
    }
}

/// Reason for stopping the capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// User requested stop.
    UserRequested,

    /// The user declined the screen-share prompt.
    PermissionDenied,

    /// The capture backend failed.
    CaptureError { message: String },
}

impl StopReason {
    /// Returns a display message for this reason.
    pub fn message(&self) -> String {
        match self {
            Self::UserRequested => "Capture stopped by user".to_string(),
            Self::PermissionDenied => "Screen sharing was declined".to_string(),
            Self::CaptureError { message } => format!("Capture error: {message}"),
        }
    }
}
