//! Capture backends behind the exported entry points.

use std::env;
use std::sync::atomic::{AtomicU32, Ordering};

use tracing::warn;

use glass_ipc::abi::{BridgeStatus, SOURCE_WINDOW};

use crate::delivery::Feed;
use crate::error::ModuleResult;
use crate::pattern::PatternBackend;

/// Environment variable selecting the backend at init.
pub const BACKEND_ENV: &str = "GLASSCAP_BACKEND";

/// What the host asked for in `CaptureLibStart`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartRequest {
    pub source: u32,
    pub want_cursor: bool,
}

impl StartRequest {
    pub fn from_raw(source: u32, want_cursor: u32) -> Self {
        Self {
            source,
            want_cursor: want_cursor != 0,
        }
    }

    pub fn is_window(&self) -> bool {
        self.source == SOURCE_WINDOW
    }
}

/// A source of frames for the host.
pub trait CaptureBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// One-time setup; failure means the module is unusable.
    fn init(&self) -> ModuleResult<()>;

    /// Begin producing frames into `feed`. Must not block on the user.
    fn start(&self, request: StartRequest, feed: Feed) -> ModuleResult<()>;

    /// End the current capture without waiting for it to wind down.
    fn stop(&self);

    fn status(&self) -> BridgeStatus;
}

/// Backend status shared with worker threads.
#[derive(Debug)]
pub struct StatusCell(AtomicU32);

impl StatusCell {
    pub fn new() -> Self {
        Self(AtomicU32::new(BridgeStatus::Idle.to_raw()))
    }

    pub fn set(&self, status: BridgeStatus) {
        self.0.store(status.to_raw(), Ordering::Release);
    }

    pub fn get(&self) -> BridgeStatus {
        BridgeStatus::from_raw(self.0.load(Ordering::Acquire))
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Available backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Synthetic moving gradient.
    Pattern,
    /// Desktop portal ScreenCast over PipeWire.
    Portal,
}

impl BackendKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "pattern" | "test" => Some(Self::Pattern),
            "portal" | "pipewire" => Some(Self::Portal),
            _ => None,
        }
    }

    /// Backend named by [`BACKEND_ENV`], else the platform default.
    pub fn from_env() -> Self {
        match env::var(BACKEND_ENV) {
            Ok(name) => Self::parse(&name).unwrap_or_else(|| {
                warn!(name = %name, "Unknown capture backend, using default");
                Self::platform_default()
            }),
            Err(_) => Self::platform_default(),
        }
    }

    pub fn platform_default() -> Self {
        if cfg!(target_os = "linux") {
            Self::Portal
        } else {
            Self::Pattern
        }
    }

    pub fn create(self) -> Box<dyn CaptureBackend> {
        match self {
            Self::Pattern => Box::new(PatternBackend::new()),
            #[cfg(target_os = "linux")]
            Self::Portal => Box::new(crate::portal::PortalBackend::new()),
            #[cfg(not(target_os = "linux"))]
            Self::Portal => {
                warn!("Portal capture needs Linux, using test pattern");
                Box::new(PatternBackend::new())
            }
        }
    }
}
