//! Monitors and windows that can back a capture item.
//!
//! Source ids are `monitor:<handle>` or `window:<handle>`.

use tracing::{debug, instrument};
use windows::Graphics::Capture::GraphicsCaptureItem;
use windows::Win32::Foundation::{BOOL, HWND, LPARAM, RECT};
use windows::Win32::Graphics::Gdi::{
    EnumDisplayMonitors, GetMonitorInfoW, HDC, HMONITOR, MONITORINFOEXW, MONITORINFOF_PRIMARY,
};
use windows::Win32::System::WinRT::Graphics::Capture::IGraphicsCaptureItemInterop;
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetWindowLongW, GetWindowRect, GetWindowTextW, IsWindowVisible, GWL_EXSTYLE,
    WS_EX_TOOLWINDOW,
};

use glass_ipc::{CaptureSource, CaptureSourceType};

use crate::error::CaptureError;
use crate::CaptureResult;

/// A monitor or top-level window.
#[derive(Debug, Clone)]
pub struct SourceTarget {
    pub kind: CaptureSourceType,
    pub handle: isize,
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub is_primary: bool,
}

impl SourceTarget {
    pub fn id(&self) -> String {
        format!("{}:{}", id_prefix(self.kind), self.handle)
    }

    pub fn to_capture_source(&self) -> CaptureSource {
        let name = if self.is_primary {
            format!("{} (Primary)", self.name)
        } else {
            self.name.clone()
        };

        CaptureSource {
            id: self.id(),
            name,
            source_type: self.kind,
            width: self.width,
            height: self.height,
        }
    }

    pub fn create_capture_item(&self) -> CaptureResult<GraphicsCaptureItem> {
        let interop: IGraphicsCaptureItemInterop =
            windows::core::factory::<GraphicsCaptureItem, IGraphicsCaptureItemInterop>()?;

        let item = match self.kind {
            CaptureSourceType::Monitor => unsafe {
                interop.CreateForMonitor(HMONITOR(self.handle as *mut _))?
            },
            CaptureSourceType::Window => unsafe {
                interop.CreateForWindow(HWND(self.handle as *mut _))?
            },
        };

        Ok(item)
    }
}

fn id_prefix(kind: CaptureSourceType) -> &'static str {
    match kind {
        CaptureSourceType::Monitor => "monitor",
        CaptureSourceType::Window => "window",
    }
}

/// Split a source id into its kind and native handle.
pub fn parse_source_id(id: &str) -> Option<(CaptureSourceType, isize)> {
    let (prefix, handle) = id.split_once(':')?;
    let kind = match prefix {
        "monitor" => CaptureSourceType::Monitor,
        "window" => CaptureSourceType::Window,
        _ => return None,
    };
    Some((kind, handle.parse().ok()?))
}

#[instrument(name = "enumerate_monitors")]
pub fn enumerate_monitors() -> CaptureResult<Vec<SourceTarget>> {
    let mut monitors: Vec<SourceTarget> = Vec::new();

    let ok = unsafe {
        EnumDisplayMonitors(
            HDC::default(),
            None,
            Some(collect_monitor),
            LPARAM(&mut monitors as *mut Vec<SourceTarget> as isize),
        )
    };
    if !ok.as_bool() {
        return Err(CaptureError::WindowsApi {
            message: "EnumDisplayMonitors failed".to_string(),
            source: None,
        });
    }

    debug!(count = monitors.len(), "Enumerated monitors");
    Ok(monitors)
}

#[instrument(name = "enumerate_windows")]
pub fn enumerate_windows() -> CaptureResult<Vec<SourceTarget>> {
    let mut windows: Vec<SourceTarget> = Vec::new();

    unsafe {
        EnumWindows(
            Some(collect_window),
            LPARAM(&mut windows as *mut Vec<SourceTarget> as isize),
        )?;
    }

    debug!(count = windows.len(), "Enumerated windows");
    Ok(windows)
}

/// The primary monitor, or the first one reported.
pub fn primary_monitor() -> CaptureResult<SourceTarget> {
    let mut monitors = enumerate_monitors()?;
    let index = monitors.iter().position(|m| m.is_primary).unwrap_or(0);
    if monitors.is_empty() {
        return Err(CaptureError::SourceNotFound("no monitors attached".to_string()));
    }
    Ok(monitors.swap_remove(index))
}

/// Look up a live source of the given kind by id.
pub fn find_source(id: &str, kind: CaptureSourceType) -> CaptureResult<SourceTarget> {
    let handle = match parse_source_id(id) {
        Some((found, handle)) if found == kind => handle,
        _ => return Err(CaptureError::SourceNotFound(id.to_string())),
    };

    let candidates = match kind {
        CaptureSourceType::Monitor => enumerate_monitors()?,
        CaptureSourceType::Window => enumerate_windows()?,
    };

    candidates
        .into_iter()
        .find(|target| target.handle == handle)
        .ok_or_else(|| CaptureError::SourceNotFound(id.to_string()))
}

unsafe extern "system" fn collect_monitor(
    hmonitor: HMONITOR,
    _hdc: HDC,
    _rect: *mut RECT,
    lparam: LPARAM,
) -> BOOL {
    let monitors = &mut *(lparam.0 as *mut Vec<SourceTarget>);

    let mut info = MONITORINFOEXW::default();
    info.monitorInfo.cbSize = std::mem::size_of::<MONITORINFOEXW>() as u32;
    if !GetMonitorInfoW(hmonitor, &mut info.monitorInfo).as_bool() {
        return BOOL::from(true);
    }

    let bounds = info.monitorInfo.rcMonitor;
    monitors.push(SourceTarget {
        kind: CaptureSourceType::Monitor,
        handle: hmonitor.0 as isize,
        name: wide_to_string(&info.szDevice),
        width: (bounds.right - bounds.left).max(0) as u32,
        height: (bounds.bottom - bounds.top).max(0) as u32,
        is_primary: info.monitorInfo.dwFlags & MONITORINFOF_PRIMARY != 0,
    });

    BOOL::from(true)
}

unsafe extern "system" fn collect_window(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let windows = &mut *(lparam.0 as *mut Vec<SourceTarget>);

    if !IsWindowVisible(hwnd).as_bool() {
        return BOOL::from(true);
    }
    if GetWindowLongW(hwnd, GWL_EXSTYLE) as u32 & WS_EX_TOOLWINDOW.0 != 0 {
        return BOOL::from(true);
    }

    let mut title = [0u16; 512];
    let len = GetWindowTextW(hwnd, &mut title);
    if len <= 0 {
        return BOOL::from(true);
    }
    let name = String::from_utf16_lossy(&title[..len as usize]);
    if name.trim().is_empty() {
        return BOOL::from(true);
    }

    let mut rect = RECT::default();
    if GetWindowRect(hwnd, &mut rect).is_err() {
        return BOOL::from(true);
    }
    let width = (rect.right - rect.left).max(0) as u32;
    let height = (rect.bottom - rect.top).max(0) as u32;
    if width == 0 || height == 0 {
        return BOOL::from(true);
    }

    windows.push(SourceTarget {
        kind: CaptureSourceType::Window,
        handle: hwnd.0 as isize,
        name,
        width,
        height,
        is_primary: false,
    });

    BOOL::from(true)
}

fn wide_to_string(wide: &[u16]) -> String {
    let end = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
    String::from_utf16_lossy(&wide[..end])
}
