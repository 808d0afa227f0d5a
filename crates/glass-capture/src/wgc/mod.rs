//! Windows Graphics Capture backend.

mod d3d11;
mod frame_pool;
mod session;
pub mod sources;

pub use d3d11::{D3D11Device, GpuTexture};
pub use session::{WgcCapture, WgcFeatures};
pub use sources::{enumerate_monitors, enumerate_windows, SourceTarget};

use std::sync::OnceLock;

use tracing::{debug, warn};
use windows::Graphics::Capture::{GraphicsCaptureItem, GraphicsCaptureSession};

use glass_ipc::{CaptureSource, CaptureSourceType, InputSource};

use crate::error::CaptureError;
use crate::native::{NativeBackend, NativeOptions, PlatformCapture};
use crate::CaptureResult;

/// Native capture through Windows Graphics Capture.
pub struct WgcBackend {
    device: D3D11Device,
    supported: OnceLock<bool>,
}

impl WgcBackend {
    /// Create a backend capturing through `device`.
    pub fn new(device: D3D11Device) -> Self {
        Self {
            device,
            supported: OnceLock::new(),
        }
    }

    fn create_item(source: &InputSource) -> CaptureResult<GraphicsCaptureItem> {
        match source {
            InputSource::Desktop { monitor: Some(id) } => {
                sources::find_source(id, CaptureSourceType::Monitor)?.create_capture_item()
            }
            InputSource::Desktop { monitor: None } => {
                sources::primary_monitor()?.create_capture_item()
            }
            InputSource::Window { window: Some(id) } => {
                sources::find_source(id, CaptureSourceType::Window)?.create_capture_item()
            }
            InputSource::Window { window: None } => Err(CaptureError::SourceNotFound(
                "window capture needs a window id".to_string(),
            )),
            InputSource::Image { path } => Err(CaptureError::SourceNotFound(format!(
                "{} is not a live source",
                path.display()
            ))),
        }
    }
}

impl NativeBackend<GpuTexture> for WgcBackend {
    fn is_supported(&self) -> bool {
        *self.supported.get_or_init(|| {
            let supported = GraphicsCaptureSession::IsSupported().unwrap_or(false);
            debug!(supported, "Probed Windows Graphics Capture support");
            supported
        })
    }

    fn open(
        &self,
        source: &InputSource,
        options: &NativeOptions,
    ) -> CaptureResult<Box<dyn PlatformCapture<GpuTexture>>> {
        if !self.is_supported() {
            return Err(CaptureError::NotSupported);
        }
        let item = Self::create_item(source)?;
        let capture = WgcCapture::new(self.device.clone(), item, *options)?;
        Ok(Box::new(capture))
    }

    fn enumerate_sources(&self) -> Vec<CaptureSource> {
        let mut sources = Vec::new();

        match enumerate_monitors() {
            Ok(monitors) => sources.extend(monitors.iter().map(SourceTarget::to_capture_source)),
            Err(e) => warn!("Failed to enumerate monitors: {}", e),
        }

        match enumerate_windows() {
            Ok(windows) => sources.extend(windows.iter().map(SourceTarget::to_capture_source)),
            Err(e) => warn!("Failed to enumerate windows: {}", e),
        }

        sources
    }
}
