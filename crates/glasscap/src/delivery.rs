//! Hand-off of frames to the host callback.

use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use glass_ipc::abi::FrameCallback;

use crate::error::{ModuleError, ModuleResult};

#[derive(Clone, Copy)]
struct Target {
    callback: FrameCallback,
    context: usize,
    generation: u64,
}

/// The host callback for the current capture.
///
/// Each [`Delivery::arm`] hands out a [`Feed`] bound to that capture. A
/// feed from an earlier capture never reaches a later callback, and once
/// disarmed every frame is discarded without reaching the host.
pub struct Delivery {
    target: RwLock<Option<Target>>,
    active: AtomicBool,
    generation: AtomicU64,
    delivered: AtomicU64,
}

impl Delivery {
    pub fn new() -> Self {
        Self {
            target: RwLock::new(None),
            active: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
        }
    }

    /// Route frames to `callback` until [`Delivery::disarm`].
    pub fn arm(self: &Arc<Self>, callback: FrameCallback, context: *mut c_void) -> ModuleResult<Feed> {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ModuleError::AlreadyActive);
        }

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        *self.target.write() = Some(Target {
            callback,
            context: context as usize,
            generation,
        });
        Ok(Feed {
            delivery: Arc::clone(self),
            generation,
        })
    }

    /// Stop routing frames. Does not wait for a frame already in the callback.
    pub fn disarm(&self) -> ModuleResult<()> {
        self.active
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ModuleError::NotActive)?;
        // Only waits out a concurrent copy of the target, never the callback.
        *self.target.write() = None;
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Frames handed to the host so far.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    fn current(&self) -> u64 {
        match self.target.read().as_ref() {
            Some(target) => target.generation,
            None => 0,
        }
    }

    fn deliver(&self, generation: u64, data: &[u8], width: u32, height: u32, pitch: u32) -> bool {
        if !self.is_active() || width == 0 || height == 0 {
            return false;
        }

        let required = pitch as usize * (height as usize - 1) + width as usize * 4;
        if (pitch as usize) < width as usize * 4 || data.len() < required {
            warn!(
                width,
                height,
                pitch,
                len = data.len(),
                "Frame buffer smaller than its layout, discarding"
            );
            return false;
        }

        // Copied out so arming a new capture never waits on a slow host.
        let target = *self.target.read();
        let Some(target) = target.filter(|t| t.generation == generation) else {
            return false;
        };

        unsafe {
            (target.callback)(
                data.as_ptr(),
                width,
                height,
                pitch,
                target.context as *mut c_void,
            );
        }
        self.delivered.fetch_add(1, Ordering::Relaxed);
        true
    }
}

impl Default for Delivery {
    fn default() -> Self {
        Self::new()
    }
}

/// Frame input for one capture, handed to the backend at start.
#[derive(Clone)]
pub struct Feed {
    delivery: Arc<Delivery>,
    generation: u64,
}

impl Feed {
    /// Pass one frame to the host. Returns false if it was discarded,
    /// including when this capture has been stopped or superseded.
    pub fn deliver(&self, data: &[u8], width: u32, height: u32, pitch: u32) -> bool {
        self.delivery
            .deliver(self.generation, data, width, height, pitch)
    }

    /// Whether the capture this feed belongs to is still armed.
    pub fn is_current(&self) -> bool {
        self.delivery.is_active() && self.delivery.current() == self.generation
    }
}
