//! Direct3D 11 device and input textures.

use std::slice;

use tracing::{debug, instrument};
use windows::core::Interface;
use windows::Graphics::Capture::Direct3D11CaptureFrame;
use windows::Graphics::DirectX::Direct3D11::IDirect3DDevice;
use windows::Win32::Foundation::BOOL;
use windows::Win32::Graphics::Direct3D::D3D_DRIVER_TYPE_HARDWARE;
use windows::Win32::Graphics::Direct3D11::{
    D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext, ID3D11Multithread, ID3D11Texture2D,
    D3D11_BIND_SHADER_RESOURCE, D3D11_CPU_ACCESS_WRITE, D3D11_CREATE_DEVICE_BGRA_SUPPORT,
    D3D11_MAPPED_SUBRESOURCE, D3D11_MAP_WRITE_DISCARD, D3D11_REQ_TEXTURE2D_U_OR_V_DIMENSION,
    D3D11_SDK_VERSION, D3D11_TEXTURE2D_DESC, D3D11_USAGE_DYNAMIC,
};
use windows::Win32::Graphics::Dxgi::Common::{DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_SAMPLE_DESC};
use windows::Win32::Graphics::Dxgi::IDXGIDevice;
use windows::Win32::System::WinRT::Direct3D11::CreateDirect3D11DeviceFromDXGIDevice;

use crate::device::{MappedTexture, TextureDevice};
use crate::error::CaptureError;
use crate::CaptureResult;

/// Direct3D 11 device shared by capture and the shader stage.
#[derive(Clone)]
pub struct D3D11Device {
    device: ID3D11Device,
    context: ID3D11DeviceContext,
}

// The immediate context is multithread-protected in `new`.
unsafe impl Send for D3D11Device {}
unsafe impl Sync for D3D11Device {}

impl D3D11Device {
    /// Create a hardware device with BGRA support.
    #[instrument(name = "d3d11_create_device")]
    pub fn new() -> CaptureResult<Self> {
        let mut device = None;
        let mut context = None;

        unsafe {
            D3D11CreateDevice(
                None,
                D3D_DRIVER_TYPE_HARDWARE,
                None,
                D3D11_CREATE_DEVICE_BGRA_SUPPORT,
                None,
                D3D11_SDK_VERSION,
                Some(&mut device),
                None,
                Some(&mut context),
            )?;
        }

        let device = device.ok_or_else(|| CaptureError::WindowsApi {
            message: "D3D11CreateDevice returned no device".to_string(),
            source: None,
        })?;
        let context: ID3D11DeviceContext = context.ok_or_else(|| CaptureError::WindowsApi {
            message: "D3D11CreateDevice returned no immediate context".to_string(),
            source: None,
        })?;

        // Frames are uploaded from capture threads while the render loop
        // draws on its own.
        let multithread: ID3D11Multithread = context.cast()?;
        unsafe {
            let _ = multithread.SetMultithreadProtected(BOOL::from(true));
        }

        debug!("Created D3D11 device");
        Ok(Self { device, context })
    }

    pub fn device(&self) -> &ID3D11Device {
        &self.device
    }

    pub fn context(&self) -> &ID3D11DeviceContext {
        &self.context
    }

    /// WinRT view of the device, as the capture frame pool requires.
    pub fn direct3d_device(&self) -> CaptureResult<IDirect3DDevice> {
        let dxgi: IDXGIDevice = self.device.cast()?;
        let inspectable = unsafe { CreateDirect3D11DeviceFromDXGIDevice(&dxgi)? };
        Ok(inspectable.cast()?)
    }
}

/// A texture the shader stage can sample.
///
/// Surfaces from the capture frame pool keep their frame alive so the pool
/// does not reuse the buffer while it is being rendered.
#[derive(Clone)]
pub struct GpuTexture {
    texture: ID3D11Texture2D,
    _frame: Option<Direct3D11CaptureFrame>,
}

unsafe impl Send for GpuTexture {}
unsafe impl Sync for GpuTexture {}

impl GpuTexture {
    pub(crate) fn from_frame(texture: ID3D11Texture2D, frame: Direct3D11CaptureFrame) -> Self {
        Self {
            texture,
            _frame: Some(frame),
        }
    }

    pub fn texture(&self) -> &ID3D11Texture2D {
        &self.texture
    }
}

impl TextureDevice for D3D11Device {
    type Texture = GpuTexture;

    fn max_texture_dimension(&self) -> u32 {
        D3D11_REQ_TEXTURE2D_U_OR_V_DIMENSION
    }

    fn create_texture(&self, width: u32, height: u32) -> CaptureResult<GpuTexture> {
        let desc = D3D11_TEXTURE2D_DESC {
            Width: width,
            Height: height,
            MipLevels: 1,
            ArraySize: 1,
            Format: DXGI_FORMAT_B8G8R8A8_UNORM,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Usage: D3D11_USAGE_DYNAMIC,
            BindFlags: D3D11_BIND_SHADER_RESOURCE.0 as u32,
            CPUAccessFlags: D3D11_CPU_ACCESS_WRITE.0 as u32,
            MiscFlags: Default::default(),
        };

        let mut texture = None;
        unsafe {
            self.device
                .CreateTexture2D(&desc, None, Some(&mut texture))?;
        }

        let texture = texture.ok_or_else(|| CaptureError::WindowsApi {
            message: "Failed to create input texture".to_string(),
            source: None,
        })?;

        Ok(GpuTexture {
            texture,
            _frame: None,
        })
    }

    fn write_texture(
        &self,
        texture: &GpuTexture,
        write: &mut dyn FnMut(MappedTexture<'_>) -> CaptureResult<()>,
    ) -> CaptureResult<()> {
        let mut desc = D3D11_TEXTURE2D_DESC::default();
        unsafe { texture.texture.GetDesc(&mut desc) };

        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        unsafe {
            self.context.Map(
                &texture.texture,
                0,
                D3D11_MAP_WRITE_DISCARD,
                0,
                Some(&mut mapped),
            )?;
        }

        let row_pitch = mapped.RowPitch as usize;
        let data =
            unsafe { slice::from_raw_parts_mut(mapped.pData as *mut u8, row_pitch * desc.Height as usize) };
        let result = write(MappedTexture { data, row_pitch });

        unsafe {
            self.context.Unmap(&texture.texture, 0);
        }

        result
    }
}
