//! GPU texture abstraction used by the ingestion session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::CaptureError;
use crate::frame::BYTES_PER_PIXEL;
use crate::CaptureResult;

/// A texture mapped for CPU writes.
pub struct MappedTexture<'a> {
    /// Mapped bytes, `row_pitch * (height - 1) + width * 4` at least.
    pub data: &'a mut [u8],

    /// Row pitch chosen by the device.
    pub row_pitch: usize,
}

/// Creates and fills BGRA textures the shader stage can sample.
pub trait TextureDevice: Send + Sync + 'static {
    /// Handle to a texture owned by this device.
    type Texture: Clone + Send + Sync + 'static;

    /// Largest width or height a texture may have.
    fn max_texture_dimension(&self) -> u32;

    /// Create a CPU-writable, shader-readable BGRA texture.
    fn create_texture(&self, width: u32, height: u32) -> CaptureResult<Self::Texture>;

    /// Map `texture` for write-discard, run `write`, then unmap.
    fn write_texture(
        &self,
        texture: &Self::Texture,
        write: &mut dyn FnMut(MappedTexture<'_>) -> CaptureResult<()>,
    ) -> CaptureResult<()>;
}

/// In-memory texture device with configurable row alignment.
///
/// Stands in for a GPU where none is available and lets pitch handling be
/// checked byte for byte.
pub struct MemoryDevice {
    row_alignment: usize,
    max_dimension: u32,
    next_id: AtomicU64,
}

impl MemoryDevice {
    /// Create a device padding rows to `row_alignment` bytes.
    pub fn new(row_alignment: usize, max_dimension: u32) -> Self {
        Self {
            row_alignment: row_alignment.max(1),
            max_dimension,
            next_id: AtomicU64::new(0),
        }
    }

    /// Number of textures created so far.
    pub fn textures_created(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed)
    }

    fn row_pitch(&self, width: u32) -> usize {
        let row_bytes = width as usize * BYTES_PER_PIXEL;
        row_bytes.div_ceil(self.row_alignment) * self.row_alignment
    }
}

impl Default for MemoryDevice {
    fn default() -> Self {
        Self::new(256, 16384)
    }
}

impl TextureDevice for MemoryDevice {
    type Texture = MemoryTexture;

    fn max_texture_dimension(&self) -> u32 {
        self.max_dimension
    }

    fn create_texture(&self, width: u32, height: u32) -> CaptureResult<MemoryTexture> {
        if width == 0 || height == 0 {
            return Err(CaptureError::Device(format!(
                "cannot create a {width}x{height} texture"
            )));
        }
        if width > self.max_dimension || height > self.max_dimension {
            return Err(CaptureError::TextureTooLarge {
                width,
                height,
                max: self.max_dimension,
            });
        }

        let row_pitch = self.row_pitch(width);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(MemoryTexture(Arc::new(MemoryTextureInner {
            id,
            width,
            height,
            row_pitch,
            pixels: Mutex::new(vec![0; row_pitch * height as usize]),
        })))
    }

    fn write_texture(
        &self,
        texture: &MemoryTexture,
        write: &mut dyn FnMut(MappedTexture<'_>) -> CaptureResult<()>,
    ) -> CaptureResult<()> {
        let mut pixels = texture.0.pixels.lock();
        write(MappedTexture {
            data: pixels.as_mut_slice(),
            row_pitch: texture.0.row_pitch,
        })
    }
}

/// Texture created by [`MemoryDevice`].
#[derive(Clone)]
pub struct MemoryTexture(Arc<MemoryTextureInner>);

struct MemoryTextureInner {
    id: u64,
    width: u32,
    height: u32,
    row_pitch: usize,
    pixels: Mutex<Vec<u8>>,
}

impl MemoryTexture {
    /// Creation order on its device, starting at 1.
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn width(&self) -> u32 {
        self.0.width
    }

    pub fn height(&self) -> u32 {
        self.0.height
    }

    pub fn row_pitch(&self) -> usize {
        self.0.row_pitch
    }

    /// Copy of the texture's bytes, including row padding.
    pub fn pixels(&self) -> Vec<u8> {
        self.0.pixels.lock().clone()
    }

    /// BGRA bytes of the pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let offset = y as usize * self.0.row_pitch + x as usize * BYTES_PER_PIXEL;
        let pixels = self.0.pixels.lock();
        let mut out = [0u8; 4];
        out.copy_from_slice(&pixels[offset..offset + BYTES_PER_PIXEL]);
        out
    }
}

impl std::fmt::Debug for MemoryTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTexture")
            .field("id", &self.0.id)
            .field("width", &self.0.width)
            .field("height", &self.0.height)
            .field("row_pitch", &self.0.row_pitch)
            .finish()
    }
}
