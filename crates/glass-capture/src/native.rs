//! Platform capture backends that deliver GPU surfaces.

use std::sync::Arc;

use glass_ipc::{CaptureSource, InputSource};

use crate::error::CaptureError;
use crate::CaptureResult;

/// Receives surfaces from a platform capture backend.
pub trait SurfaceSink<T>: Send + Sync {
    /// A new surface holding content of `width` x `height`.
    fn on_surface(&self, surface: T, width: u32, height: u32);
}

/// A live platform capture of one monitor or window.
pub trait PlatformCapture<T>: Send {
    /// Start delivering surfaces to `sink`.
    fn start(&mut self, sink: Arc<dyn SurfaceSink<T>>) -> CaptureResult<()>;

    /// Stop capturing and release the platform session.
    fn stop(&mut self) -> CaptureResult<()>;

    /// Check if capture is active.
    fn is_active(&self) -> bool;

    /// Size of the capture item as reported by the platform.
    fn dimensions(&self) -> (u32, u32);

    /// Show or hide the cursor; ignored where the platform lacks the control.
    fn set_cursor_capture(&mut self, visible: bool) -> CaptureResult<()>;
}

/// Options applied when opening a platform capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeOptions {
    pub capture_cursor: bool,
    pub max_capture_rate: bool,
}

impl Default for NativeOptions {
    fn default() -> Self {
        Self {
            capture_cursor: true,
            max_capture_rate: false,
        }
    }
}

/// Factory for platform captures.
pub trait NativeBackend<T>: Send + Sync {
    /// Whether the platform capture API is usable on this system.
    fn is_supported(&self) -> bool;

    /// Open (but do not start) a capture of `source`.
    fn open(
        &self,
        source: &InputSource,
        options: &NativeOptions,
    ) -> CaptureResult<Box<dyn PlatformCapture<T>>>;

    /// Monitors and windows this backend can capture.
    fn enumerate_sources(&self) -> Vec<CaptureSource> {
        Vec::new()
    }
}

/// Stand-in for platforms without a native capture API.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoNativeCapture;

impl<T> NativeBackend<T> for NoNativeCapture {
    fn is_supported(&self) -> bool {
        false
    }

    fn open(
        &self,
        _source: &InputSource,
        _options: &NativeOptions,
    ) -> CaptureResult<Box<dyn PlatformCapture<T>>> {
        Err(CaptureError::NotSupported)
    }
}
