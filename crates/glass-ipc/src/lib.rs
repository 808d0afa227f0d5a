//! Typed host<->engine messages for the capture pipeline.
//!
//! This crate defines the message types exchanged between the host
//! application and the engine core, plus the C ABI shared with the
//! dynamically loaded capture module.

pub mod abi;
mod commands;
mod events;
mod state;
mod types;

pub use commands::EngineCommand;
pub use events::{EngineEvent, SessionEvent};
pub use state::{EngineState, StartupPhase, StopReason};
pub use types::{
    BackendPreference, CaptureConfig, CaptureMetrics, CaptureSource, CaptureSourceType,
    InputModeKind, InputSource,
};

use crossbeam_channel::{Receiver, Sender};

/// Channel capacity for commands (host → engine).
pub const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Channel capacity for events (engine → host).
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Channel capacity for session notifications (capture → engine).
pub const SESSION_EVENT_CAPACITY: usize = 16;

/// Creates a bounded command channel.
pub fn command_channel() -> (Sender<EngineCommand>, Receiver<EngineCommand>) {
    crossbeam_channel::bounded(COMMAND_CHANNEL_CAPACITY)
}

/// Creates a bounded event channel.
pub fn event_channel() -> (Sender<EngineEvent>, Receiver<EngineEvent>) {
    crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY)
}

/// Creates a bounded channel for capture session notifications.
pub fn session_event_channel() -> (Sender<SessionEvent>, Receiver<SessionEvent>) {
    crossbeam_channel::bounded(SESSION_EVENT_CAPACITY)
}
