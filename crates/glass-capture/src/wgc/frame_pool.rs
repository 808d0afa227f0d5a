//! Frame pool management for WGC capture.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};
use windows::core::Interface;
use windows::Foundation::TypedEventHandler;
use windows::Graphics::Capture::{Direct3D11CaptureFramePool, GraphicsCaptureItem};
use windows::Graphics::DirectX::Direct3D11::IDirect3DDevice;
use windows::Graphics::DirectX::DirectXPixelFormat;
use windows::Graphics::SizeInt32;
use windows::Win32::Graphics::Direct3D11::ID3D11Texture2D;
use windows::Win32::System::WinRT::Direct3D11::IDirect3DDxgiInterfaceAccess;

use super::d3d11::GpuTexture;
use crate::native::SurfaceSink;
use crate::CaptureResult;

const PIXEL_FORMAT: DirectXPixelFormat = DirectXPixelFormat::B8G8R8A8UIntNormalized;
const POOL_BUFFERS: i32 = 2;

/// Owns the frame pool and forwards surfaces to the session.
pub struct FramePoolManager {
    frame_pool: Direct3D11CaptureFramePool,
    direct3d_device: IDirect3DDevice,
    sink: Arc<dyn SurfaceSink<GpuTexture>>,
    pool_size: Mutex<SizeInt32>,
    arrived_token: Mutex<Option<i64>>,
    sequence: AtomicU64,
    is_active: AtomicBool,
}

// WinRT capture objects are agile and the D3D device is multithread-protected.
unsafe impl Send for FramePoolManager {}
unsafe impl Sync for FramePoolManager {}

impl FramePoolManager {
    /// Create a free-threaded pool sized to `item`.
    pub fn new(
        item: &GraphicsCaptureItem,
        direct3d_device: &IDirect3DDevice,
        sink: Arc<dyn SurfaceSink<GpuTexture>>,
    ) -> CaptureResult<Arc<Self>> {
        let size = item.Size()?;
        debug!(width = size.Width, height = size.Height, "Creating frame pool");

        let frame_pool = Direct3D11CaptureFramePool::CreateFreeThreaded(
            direct3d_device,
            PIXEL_FORMAT,
            POOL_BUFFERS,
            size,
        )?;

        let manager = Arc::new(Self {
            frame_pool,
            direct3d_device: direct3d_device.clone(),
            sink,
            pool_size: Mutex::new(size),
            arrived_token: Mutex::new(None),
            sequence: AtomicU64::new(0),
            is_active: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&manager);
        let token = manager.frame_pool.FrameArrived(&TypedEventHandler::new(
            move |pool: &Option<Direct3D11CaptureFramePool>, _| {
                if let (Some(manager), Some(pool)) = (weak.upgrade(), pool.as_ref()) {
                    if let Err(e) = manager.on_frame_arrived(pool) {
                        warn!("Frame processing error: {}", e);
                    }
                }
                Ok(())
            },
        ))?;
        *manager.arrived_token.lock() = Some(token);

        Ok(manager)
    }

    pub fn frame_pool(&self) -> &Direct3D11CaptureFramePool {
        &self.frame_pool
    }

    pub fn set_active(&self, active: bool) {
        self.is_active.store(active, Ordering::SeqCst);
    }

    /// Detach the handler and close the pool.
    pub fn close(&self) -> CaptureResult<()> {
        self.set_active(false);
        if let Some(token) = self.arrived_token.lock().take() {
            self.frame_pool.RemoveFrameArrived(token)?;
        }
        self.frame_pool.Close()?;
        Ok(())
    }

    fn on_frame_arrived(&self, pool: &Direct3D11CaptureFramePool) -> CaptureResult<()> {
        if !self.is_active.load(Ordering::SeqCst) {
            return Ok(());
        }

        let frame = pool.TryGetNextFrame()?;
        let content_size = frame.ContentSize()?;

        // A resized source keeps arriving in old-sized buffers until the
        // pool is recreated.
        {
            let mut pool_size = self.pool_size.lock();
            if content_size.Width != pool_size.Width || content_size.Height != pool_size.Height {
                debug!(
                    width = content_size.Width,
                    height = content_size.Height,
                    "Content size changed, recreating frame pool"
                );
                self.frame_pool.Recreate(
                    &self.direct3d_device,
                    PIXEL_FORMAT,
                    POOL_BUFFERS,
                    content_size,
                )?;
                *pool_size = content_size;
            }
        }

        let access: IDirect3DDxgiInterfaceAccess = frame.Surface()?.cast()?;
        let texture: ID3D11Texture2D = unsafe { access.GetInterface()? };

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        trace!(sequence, "Captured surface");

        self.sink.on_surface(
            GpuTexture::from_frame(texture, frame),
            content_size.Width.max(0) as u32,
            content_size.Height.max(0) as u32,
        );

        Ok(())
    }
}
