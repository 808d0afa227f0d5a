//! Capture session management.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::{debug, info, instrument, warn};
use windows::core::HSTRING;
use windows::Foundation::Metadata::ApiInformation;
use windows::Foundation::TimeSpan;
use windows::Graphics::Capture::{GraphicsCaptureItem, GraphicsCaptureSession};
use windows::Graphics::DirectX::Direct3D11::IDirect3DDevice;

use super::d3d11::{D3D11Device, GpuTexture};
use super::frame_pool::FramePoolManager;
use crate::error::CaptureError;
use crate::native::{NativeOptions, PlatformCapture, SurfaceSink};
use crate::CaptureResult;

const SESSION_CLASS: &str = "Windows.Graphics.Capture.GraphicsCaptureSession";

/// Minimum interval between frames when the capture rate is not maxed out,
/// in 100ns units (15ms).
const MIN_UPDATE_INTERVAL: i64 = 150_000;

/// Optional session controls available on this Windows build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WgcFeatures {
    pub cursor: bool,
    pub border: bool,
    pub min_update_interval: bool,
}

impl WgcFeatures {
    /// Probe once per process.
    pub fn probe() -> Self {
        static FEATURES: OnceLock<WgcFeatures> = OnceLock::new();
        *FEATURES.get_or_init(|| {
            let class = HSTRING::from(SESSION_CLASS);
            let present = |property: &str| {
                ApiInformation::IsPropertyPresent(&class, &HSTRING::from(property))
                    .unwrap_or(false)
            };
            let features = Self {
                cursor: present("IsCursorCaptureEnabled"),
                border: present("IsBorderRequired"),
                min_update_interval: present("MinUpdateInterval"),
            };
            debug!(?features, "Probed capture session controls");
            features
        })
    }
}

/// A WGC capture of one monitor or window.
pub struct WgcCapture {
    _device: D3D11Device,
    direct3d_device: IDirect3DDevice,
    item: GraphicsCaptureItem,
    options: NativeOptions,
    features: WgcFeatures,
    frame_pool: Option<Arc<FramePoolManager>>,
    session: Option<GraphicsCaptureSession>,
    is_active: AtomicBool,
    width: u32,
    height: u32,
}

// WinRT capture objects are agile.
unsafe impl Send for WgcCapture {}

impl WgcCapture {
    #[instrument(name = "wgc_capture_new", skip_all)]
    pub fn new(
        device: D3D11Device,
        item: GraphicsCaptureItem,
        options: NativeOptions,
    ) -> CaptureResult<Self> {
        let direct3d_device = device.direct3d_device()?;
        let size = item.Size()?;
        debug!(width = size.Width, height = size.Height, "Opened capture item");

        Ok(Self {
            _device: device,
            direct3d_device,
            item,
            options,
            features: WgcFeatures::probe(),
            frame_pool: None,
            session: None,
            is_active: AtomicBool::new(false),
            width: size.Width.max(0) as u32,
            height: size.Height.max(0) as u32,
        })
    }

    /// Best effort; older builds lack some of these controls.
    fn apply_controls(&self, session: &GraphicsCaptureSession) {
        if self.features.border {
            if let Err(e) = session.SetIsBorderRequired(false) {
                debug!("Border control rejected: {}", e);
            }
        }

        if self.features.min_update_interval {
            let interval = if self.options.max_capture_rate {
                0
            } else {
                MIN_UPDATE_INTERVAL
            };
            if let Err(e) = session.SetMinUpdateInterval(TimeSpan { Duration: interval }) {
                debug!("Update interval rejected: {}", e);
            }
        }

        if self.features.cursor {
            if let Err(e) = session.SetIsCursorCaptureEnabled(self.options.capture_cursor) {
                debug!("Cursor control rejected: {}", e);
            }
        }
    }
}

impl PlatformCapture<GpuTexture> for WgcCapture {
    #[instrument(name = "wgc_capture_start", skip_all)]
    fn start(&mut self, sink: Arc<dyn SurfaceSink<GpuTexture>>) -> CaptureResult<()> {
        if self.is_active.load(Ordering::SeqCst) {
            return Err(CaptureError::AlreadyStarted);
        }

        let frame_pool = FramePoolManager::new(&self.item, &self.direct3d_device, sink)?;
        let session = frame_pool.frame_pool().CreateCaptureSession(&self.item)?;
        self.apply_controls(&session);

        frame_pool.set_active(true);
        session.StartCapture()?;

        self.frame_pool = Some(frame_pool);
        self.session = Some(session);
        self.is_active.store(true, Ordering::SeqCst);

        info!(
            width = self.width,
            height = self.height,
            cursor = self.options.capture_cursor,
            "Native capture started"
        );
        Ok(())
    }

    #[instrument(name = "wgc_capture_stop", skip_all)]
    fn stop(&mut self) -> CaptureResult<()> {
        if !self.is_active.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(frame_pool) = self.frame_pool.take() {
            if let Err(e) = frame_pool.close() {
                warn!("Failed to close frame pool: {}", e);
            }
        }
        if let Some(session) = self.session.take() {
            session.Close()?;
        }

        info!("Native capture stopped");
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.is_active.load(Ordering::SeqCst)
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn set_cursor_capture(&mut self, visible: bool) -> CaptureResult<()> {
        self.options.capture_cursor = visible;
        if let (Some(session), true) = (self.session.as_ref(), self.features.cursor) {
            session.SetIsCursorCaptureEnabled(visible)?;
        }
        Ok(())
    }
}

impl Drop for WgcCapture {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
