//! Input selection and capture session lifecycle.

use std::path::Path;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use glass_capture::{
    copy_rows, BridgeError, CaptureBridge, CaptureError, CaptureSession, NativeBackend,
    NativeOptions, SourceKind, TextureDevice, BYTES_PER_PIXEL,
};
use glass_ipc::{
    BackendPreference, CaptureConfig, CaptureSource, InputModeKind, InputSource, SessionEvent,
    StartupPhase,
};

use crate::error::{EngineError, EngineResult};

/// Pick the input mode for `source`.
///
/// Image sources always run in image mode. For live sources the bridge is
/// only loaded when the preference might use it.
pub fn select_input_mode(
    source: &InputSource,
    preference: BackendPreference,
    native_supported: bool,
    load_bridge: impl FnOnce() -> Result<(), BridgeError>,
) -> EngineResult<InputModeKind> {
    if !source.is_live() {
        return Ok(InputModeKind::Image);
    }

    match preference {
        BackendPreference::Native if native_supported => Ok(InputModeKind::Native),
        BackendPreference::Native => Err(EngineError::NativeUnsupported),
        BackendPreference::Bridge => {
            load_bridge()?;
            Ok(InputModeKind::Bridge)
        }
        BackendPreference::Auto if native_supported => Ok(InputModeKind::Native),
        BackendPreference::Auto => match load_bridge() {
            Ok(()) => Ok(InputModeKind::Bridge),
            Err(e) if e.is_unavailable() => {
                debug!("Capture module unavailable: {}", e);
                Err(EngineError::CaptureUnavailable)
            }
            // A module that is present but unusable is reported as such.
            Err(e) => Err(e.into()),
        },
    }
}

/// Swap the red and blue channels of packed 8-bit pixels in place.
pub fn rgba_to_bgra(pixels: &mut [u8]) {
    for pixel in pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
        pixel.swap(0, 2);
    }
}

/// Decode an image file into a new device texture.
#[instrument(name = "load_image", skip(device))]
pub fn load_image<D: TextureDevice>(device: &D, path: &Path) -> EngineResult<(D::Texture, u32, u32)> {
    let image = image::open(path)
        .map_err(|e| EngineError::Image {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
        .to_rgba8();
    let (width, height) = image.dimensions();

    let max = device.max_texture_dimension();
    if width > max || height > max {
        return Err(CaptureError::TextureTooLarge { width, height, max }.into());
    }

    let mut pixels = image.into_raw();
    rgba_to_bgra(&mut pixels);

    let row_bytes = width as usize * BYTES_PER_PIXEL;
    let texture = device.create_texture(width, height)?;
    device.write_texture(&texture, &mut |mapped| {
        copy_rows(
            &pixels,
            row_bytes,
            mapped.data,
            mapped.row_pitch,
            row_bytes,
            height as usize,
        )
    })?;

    info!(width, height, "Loaded image input");
    Ok((texture, width, height))
}

/// Owns the capture inputs and the session built from them.
pub struct InputManager<D: TextureDevice> {
    device: Arc<D>,
    bridge: Arc<CaptureBridge>,
    native: Box<dyn NativeBackend<D::Texture>>,
    mode: Mutex<Option<InputModeKind>>,
    session: Mutex<Option<Arc<CaptureSession<D::Texture>>>>,
    current_phase: Mutex<Option<StartupPhase>>,
    events_tx: Sender<SessionEvent>,
    events_rx: Receiver<SessionEvent>,
}

impl<D: TextureDevice> InputManager<D> {
    pub fn new(
        device: Arc<D>,
        bridge: Arc<CaptureBridge>,
        native: Box<dyn NativeBackend<D::Texture>>,
    ) -> Self {
        let (events_tx, events_rx) = glass_ipc::session_event_channel();
        Self {
            device,
            bridge,
            native,
            mode: Mutex::new(None),
            session: Mutex::new(None),
            current_phase: Mutex::new(None),
            events_tx,
            events_rx,
        }
    }

    /// Run startup phases up to and including `target_phase`, reporting
    /// each phase before it runs.
    #[instrument(name = "init_inputs", skip(self, config, on_phase))]
    pub fn initialize(
        &self,
        config: &CaptureConfig,
        target_phase: StartupPhase,
        mut on_phase: impl FnMut(StartupPhase),
    ) -> EngineResult<()> {
        let mut phase = StartupPhase::SelectInput;

        loop {
            *self.current_phase.lock() = Some(phase);
            on_phase(phase);
            self.init_phase(config, phase)?;

            if phase == target_phase {
                break;
            }
            match phase.next() {
                Some(next) => phase = next,
                None => break,
            }
        }

        Ok(())
    }

    fn init_phase(&self, config: &CaptureConfig, phase: StartupPhase) -> EngineResult<()> {
        info!("Initializing phase: {:?}", phase);

        match phase {
            StartupPhase::SelectInput => self.select_input(config),
            StartupPhase::OpenSession => self.open_session(config),
            StartupPhase::StartRender => {
                // The orchestrator starts the render loop itself.
                debug!("Render ready");
                Ok(())
            }
        }
    }

    fn select_input(&self, config: &CaptureConfig) -> EngineResult<()> {
        let mode = select_input_mode(
            &config.source,
            config.backend,
            self.native.is_supported(),
            || self.bridge.load(),
        )?;

        info!(mode = mode.name(), "Selected input mode");
        *self.mode.lock() = Some(mode);
        Ok(())
    }

    fn open_session(&self, config: &CaptureConfig) -> EngineResult<()> {
        let mode = (*self.mode.lock()).ok_or(EngineError::MissingInput("session"))?;

        // Stale notifications from an earlier session.
        while self.events_rx.try_recv().is_ok() {}

        let session = match (mode, &config.source) {
            (InputModeKind::Image, InputSource::Image { path }) => {
                let (texture, width, height) = load_image(&*self.device, path)?;
                CaptureSession::image(texture, width, height)
            }
            (InputModeKind::Image, _) => return Err(EngineError::MissingInput("image")),
            (InputModeKind::Native, source) => {
                let options = NativeOptions {
                    capture_cursor: config.capture_cursor,
                    max_capture_rate: config.max_capture_rate,
                };
                let capture = self.native.open(source, &options)?;
                CaptureSession::native(capture, Some(self.events_tx.clone()))?
            }
            (InputModeKind::Bridge, source) => {
                let kind = match source {
                    InputSource::Window { .. } => SourceKind::Window,
                    _ => SourceKind::Desktop,
                };
                CaptureSession::bridge(
                    Arc::clone(&self.device),
                    Arc::clone(&self.bridge),
                    kind,
                    config.capture_cursor,
                    Some(self.events_tx.clone()),
                )?
            }
        };

        *self.session.lock() = Some(Arc::new(session));
        debug!("Capture session open");
        Ok(())
    }

    /// The live session, if one is open.
    pub fn session(&self) -> Option<Arc<CaptureSession<D::Texture>>> {
        self.session.lock().clone()
    }

    pub fn mode(&self) -> Option<InputModeKind> {
        *self.mode.lock()
    }

    /// Notifications raised by the current session.
    pub fn session_events(&self) -> &Receiver<SessionEvent> {
        &self.events_rx
    }

    pub fn enumerate_sources(&self) -> Vec<CaptureSource> {
        self.native.enumerate_sources()
    }

    /// Undo startup phases from the current one backwards.
    #[instrument(name = "rollback_inputs", skip(self))]
    pub fn rollback(&self) {
        let current = *self.current_phase.lock();

        if let Some(mut phase) = current {
            loop {
                debug!("Rolling back phase: {:?}", phase);
                self.rollback_phase(phase);

                match phase.previous() {
                    Some(previous) => phase = previous,
                    None => break,
                }
            }
        }

        *self.current_phase.lock() = None;
    }

    fn rollback_phase(&self, phase: StartupPhase) {
        match phase {
            StartupPhase::StartRender => {}
            StartupPhase::OpenSession => {
                if let Some(session) = self.session.lock().take() {
                    session.stop();
                }
            }
            StartupPhase::SelectInput => {
                *self.mode.lock() = None;
            }
        }
    }

    /// Stop the session and release everything.
    pub fn shutdown(&self) {
        info!("Shutting down capture inputs");
        self.rollback();
    }
}

impl<D: TextureDevice> Drop for InputManager<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glass_capture::{MemoryDevice, MemoryTexture, NoNativeCapture};
    use std::cell::Cell;

    fn desktop() -> InputSource {
        InputSource::Desktop { monitor: None }
    }

    #[test]
    fn test_auto_prefers_native() {
        let loaded = Cell::new(false);
        let mode = select_input_mode(&desktop(), BackendPreference::Auto, true, || {
            loaded.set(true);
            Ok(())
        })
        .unwrap();
        assert_eq!(mode, InputModeKind::Native);
        assert!(!loaded.get());
    }

    #[test]
    fn test_auto_falls_back_to_bridge() {
        let mode = select_input_mode(&desktop(), BackendPreference::Auto, false, || Ok(())).unwrap();
        assert_eq!(mode, InputModeKind::Bridge);
    }

    #[test]
    fn test_auto_without_any_backend() {
        let result = select_input_mode(&desktop(), BackendPreference::Auto, false, || {
            Err(BridgeError::ModuleNotFound("glasscap".into()))
        });
        assert!(matches!(result, Err(EngineError::CaptureUnavailable)));
    }

    #[test]
    fn test_auto_reports_broken_module() {
        let result = select_input_mode(&desktop(), BackendPreference::Auto, false, || {
            Err(BridgeError::VersionMismatch {
                expected: 1,
                found: 2,
            })
        });
        assert!(matches!(
            result,
            Err(EngineError::Bridge(BridgeError::VersionMismatch {
                expected: 1,
                found: 2
            }))
        ));

        let result = select_input_mode(&desktop(), BackendPreference::Auto, false, || {
            Err(BridgeError::InitFailed(-1))
        });
        assert!(matches!(
            result,
            Err(EngineError::Bridge(BridgeError::InitFailed(-1)))
        ));
    }

    #[test]
    fn test_explicit_preferences() {
        assert!(matches!(
            select_input_mode(&desktop(), BackendPreference::Native, false, || Ok(())),
            Err(EngineError::NativeUnsupported)
        ));
        assert!(matches!(
            select_input_mode(&desktop(), BackendPreference::Bridge, true, || {
                Err(BridgeError::Disabled)
            }),
            Err(EngineError::Bridge(BridgeError::Disabled))
        ));
        assert_eq!(
            select_input_mode(&desktop(), BackendPreference::Bridge, true, || Ok(())).unwrap(),
            InputModeKind::Bridge
        );
    }

    #[test]
    fn test_image_source_ignores_backends() {
        let image = InputSource::Image {
            path: "frame.png".into(),
        };
        let mode = select_input_mode(&image, BackendPreference::Native, false, || {
            panic!("bridge must not load for images")
        })
        .unwrap();
        assert_eq!(mode, InputModeKind::Image);
    }

    #[test]
    fn test_rgba_to_bgra() {
        let mut pixels = vec![1, 2, 3, 4, 5, 6, 7, 8];
        rgba_to_bgra(&mut pixels);
        assert_eq!(pixels, vec![3, 2, 1, 4, 7, 6, 5, 8]);
    }

    #[test]
    fn test_load_image_swaps_channels_and_pads_rows() {
        let path = std::env::temp_dir().join(format!("glass-input-{}.png", std::process::id()));
        let mut source = image::RgbaImage::new(3, 2);
        source.put_pixel(0, 0, image::Rgba([10, 20, 30, 255]));
        source.put_pixel(2, 1, image::Rgba([40, 50, 60, 128]));
        source.save(&path).unwrap();

        let device = MemoryDevice::new(64, 16384);
        let (texture, width, height) = load_image(&device, &path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!((width, height), (3, 2));
        assert_eq!(texture.row_pitch(), 64);
        assert_eq!(texture.pixel(0, 0), [30, 20, 10, 255]);
        assert_eq!(texture.pixel(2, 1), [60, 50, 40, 128]);
    }

    #[test]
    fn test_load_missing_image() {
        let device = MemoryDevice::default();
        let result = load_image(&device, Path::new("/nonexistent/glass.png"));
        assert!(matches!(result, Err(EngineError::Image { .. })));
    }

    #[test]
    fn test_failed_start_rolls_back() {
        let native: Box<dyn NativeBackend<MemoryTexture>> = Box::new(NoNativeCapture);
        let inputs = InputManager::new(
            Arc::new(MemoryDevice::default()),
            Arc::new(CaptureBridge::dynamic()),
            native,
        );
        inputs.bridge.disable();

        let config = CaptureConfig::default();
        let mut phases = Vec::new();
        let result = inputs.initialize(&config, StartupPhase::StartRender, |p| phases.push(p));

        assert!(matches!(result, Err(EngineError::CaptureUnavailable)));
        assert_eq!(phases, vec![StartupPhase::SelectInput]);

        inputs.rollback();
        assert!(inputs.session().is_none());
        assert!(inputs.mode().is_none());
    }
}
