//! Frame ingestion for screen and window capture.
//!
//! This crate turns frames from heterogeneous capture backends into a
//! texture the shader stage can sample:
//!
//! - a native backend (Windows Graphics Capture) delivering GPU surfaces,
//! - a capture module loaded at runtime through [`CaptureBridge`],
//!   delivering raw BGRA buffers from its own thread,
//! - a static image.
//!
//! [`CaptureSession`] hides the difference behind a pollable
//! `process_input` call.

pub mod bridge;
mod copy;
mod device;
mod error;
mod frame;
mod native;
mod session;
mod stats;
#[cfg(test)]
mod testing;
#[cfg(windows)]
pub mod wgc;

pub use bridge::{BridgeLibrary, CaptureBridge, DynamicLoader, FrameSink, LibraryLoader, SourceKind};
pub use copy::copy_rows;
pub use device::{MappedTexture, MemoryDevice, MemoryTexture, TextureDevice};
pub use error::{BridgeError, CaptureError};
pub use frame::{FrameRef, BYTES_PER_PIXEL};
pub use glass_ipc::abi::BridgeStatus;
pub use native::{NativeBackend, NativeOptions, NoNativeCapture, PlatformCapture, SurfaceSink};
pub use session::{CaptureSession, FrameInfo, ShaderPipeline};
pub use stats::{FrameStats, FPS_WINDOW_MS};

/// Result type for capture operations.
pub type CaptureResult<T> = Result<T, CaptureError>;
