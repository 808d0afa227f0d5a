//! Module state behind the exported entry points.

use std::ffi::c_void;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use glass_ipc::abi::{BridgeStatus, FrameCallback};

use crate::backend::{BackendKind, CaptureBackend, StartRequest};
use crate::delivery::Delivery;
use crate::error::ModuleResult;

/// One backend plus the delivery slot shared with it.
pub struct Module {
    backend: Box<dyn CaptureBackend>,
    delivery: Arc<Delivery>,
}

impl Module {
    pub fn new(backend: Box<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            delivery: Arc::new(Delivery::new()),
        }
    }

    pub fn from_env() -> Self {
        Self::new(BackendKind::from_env().create())
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    #[instrument(name = "module_init", skip(self), fields(backend = self.backend.name()))]
    pub fn init(&self) -> ModuleResult<()> {
        self.backend.init()?;
        info!("Capture module initialized");
        Ok(())
    }

    /// Arm delivery and start the backend. Fails if a capture is active.
    #[instrument(name = "module_start", skip(self, callback, context))]
    pub fn start(
        &self,
        request: StartRequest,
        callback: FrameCallback,
        context: *mut c_void,
    ) -> ModuleResult<()> {
        let feed = self.delivery.arm(callback, context)?;

        if let Err(e) = self.backend.start(request, feed) {
            warn!("Backend failed to start: {}", e);
            let _ = self.delivery.disarm();
            return Err(e);
        }
        Ok(())
    }

    /// Disarm delivery, then let the backend wind down on its own.
    #[instrument(name = "module_stop", skip(self))]
    pub fn stop(&self) -> ModuleResult<()> {
        self.delivery.disarm()?;
        self.backend.stop();
        info!(
            backend = self.backend_name(),
            delivered = self.delivery.delivered(),
            "Capture stopped"
        );
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.delivery.is_active()
    }

    pub fn status(&self) -> BridgeStatus {
        self.backend.status()
    }
}
