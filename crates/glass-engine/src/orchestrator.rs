//! Main engine orchestrator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use glass_capture::{ShaderPipeline, TextureDevice};
use glass_ipc::{
    CaptureConfig, EngineCommand, EngineEvent, EngineState, SessionEvent, StartupPhase,
    StopReason,
};

use crate::input::InputManager;
use crate::metrics::{CaptureSample, MetricsCollector};
use crate::render::{render_loop, SharedPipeline};

/// How often metrics are reported while capturing.
const METRICS_INTERVAL: Duration = Duration::from_secs(1);

/// The capture engine.
pub struct Engine<D: TextureDevice> {
    command_rx: Receiver<EngineCommand>,
    event_tx: Sender<EngineEvent>,
    state: Arc<RwLock<EngineState>>,
    inputs: InputManager<D>,
    pipeline: SharedPipeline<D::Texture>,
    metrics: Arc<MetricsCollector>,
    render_thread: Option<JoinHandle<()>>,
    should_stop: Arc<AtomicBool>,
}

impl<D: TextureDevice> Engine<D> {
    pub fn new(
        command_rx: Receiver<EngineCommand>,
        event_tx: Sender<EngineEvent>,
        inputs: InputManager<D>,
        pipeline: Box<dyn ShaderPipeline<D::Texture> + Send>,
    ) -> Self {
        Self {
            command_rx,
            event_tx,
            state: Arc::new(RwLock::new(EngineState::Idle)),
            inputs,
            pipeline: Arc::new(Mutex::new(pipeline)),
            metrics: Arc::new(MetricsCollector::default()),
            render_thread: None,
            should_stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Current state.
    pub fn state(&self) -> EngineState {
        self.state.read().clone()
    }

    /// Run the engine (blocking).
    #[instrument(name = "engine_run", skip(self))]
    pub fn run(&mut self) {
        info!("Engine starting");
        self.send_event(EngineEvent::Ready);

        loop {
            match self.command_rx.recv_timeout(Duration::from_millis(100)) {
                Ok(command) => {
                    if !self.handle_command(command) {
                        break;
                    }
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    info!("Command channel disconnected, shutting down");
                    self.stop_capture(StopReason::UserRequested);
                    break;
                }
            }

            if self.state.read().is_capturing() {
                self.monitor_capture();
            }
        }

        info!("Engine stopped");
    }

    /// Handle a command. Returns false if engine should stop.
    fn handle_command(&mut self, command: EngineCommand) -> bool {
        debug!(?command, "Handling command");

        match command {
            EngineCommand::Start { config } => self.start_capture(config),
            EngineCommand::Stop => self.stop_capture(StopReason::UserRequested),
            EngineCommand::SetCursor(visible) => self.set_cursor(visible),
            EngineCommand::GetCaptureSources => self.send_capture_sources(),
            EngineCommand::GetState => self.send_state(),
            EngineCommand::Shutdown => {
                self.stop_capture(StopReason::UserRequested);
                self.send_event(EngineEvent::Shutdown);
                return false;
            }
        }

        true
    }

    #[instrument(name = "start_capture", skip(self, config))]
    fn start_capture(&mut self, config: CaptureConfig) {
        // Idempotent: ignore if already starting or capturing
        {
            let state = self.state.read();
            if state.is_starting() || state.is_capturing() {
                debug!("Already starting or capturing, ignoring start command");
                return;
            }
        }

        info!(source = ?config.source, backend = ?config.backend, "Starting capture");

        let state = Arc::clone(&self.state);
        let event_tx = self.event_tx.clone();
        let result = self
            .inputs
            .initialize(&config, StartupPhase::StartRender, |phase| {
                transition(&state, &event_tx, EngineState::Starting { phase });
            });

        match (result, self.inputs.session(), self.inputs.mode()) {
            (Ok(()), Some(session), Some(mode)) => {
                self.metrics = Arc::new(MetricsCollector::new(config.render_fps as f32));
                self.metrics.start();

                self.start_render_loop(Arc::clone(&session), config.render_fps);

                let (width, height) = session.content_size();
                if width > 0 && height > 0 {
                    self.send_event(EngineEvent::ContentSizeKnown { width, height });
                }

                self.transition_to(EngineState::Capturing { config, mode });
                info!(mode = mode.name(), "Capture started");
            }
            (result, _, _) => {
                let (message, recoverable) = match result {
                    Err(e) => (e.to_string(), e.is_recoverable()),
                    Ok(()) => ("Startup finished without a session".to_string(), false),
                };
                error!("Capture start failed: {}", message);

                self.inputs.rollback();

                self.transition_to(EngineState::Error {
                    message,
                    recoverable,
                });
            }
        }
    }

    fn start_render_loop(
        &mut self,
        session: Arc<glass_capture::CaptureSession<D::Texture>>,
        render_fps: u32,
    ) {
        let pipeline = Arc::clone(&self.pipeline);
        let metrics = Arc::clone(&self.metrics);
        let should_stop = Arc::clone(&self.should_stop);

        should_stop.store(false, Ordering::SeqCst);

        let spawned = thread::Builder::new()
            .name("glass-render".into())
            .spawn(move || render_loop(session, pipeline, metrics, should_stop, render_fps));

        match spawned {
            Ok(handle) => self.render_thread = Some(handle),
            Err(e) => error!("Failed to spawn render thread: {}", e),
        }
    }

    #[instrument(name = "stop_capture", skip(self))]
    fn stop_capture(&mut self, reason: StopReason) {
        // Idempotent: ignore if already idle or stopping
        {
            let state = self.state.read();
            if state.is_idle() || state.is_stopping() {
                debug!("Already idle or stopping, ignoring stop command");
                return;
            }
        }

        info!(?reason, "Stopping capture");

        self.should_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.render_thread.take() {
            let _ = handle.join();
        }

        self.transition_to(EngineState::Stopping { reason });

        self.metrics.stop();
        self.inputs.shutdown();

        self.transition_to(EngineState::Idle);
        info!("Capture stopped");
    }

    /// Forward session notifications, watch the backend, report metrics.
    fn monitor_capture(&mut self) {
        while let Ok(event) = self.inputs.session_events().try_recv() {
            match event {
                SessionEvent::FirstFrame { width, height } => {
                    self.send_event(EngineEvent::ContentSizeKnown { width, height });
                }
                SessionEvent::Stopped => debug!("Session reported stop"),
            }
        }

        let Some(session) = self.inputs.session() else {
            return;
        };

        if let Some(status) = session.backend_status() {
            if status.is_terminal_failure() {
                let (reason, message) = if status == glass_capture::BridgeStatus::Denied {
                    (
                        StopReason::PermissionDenied,
                        "Screen capture permission denied".to_string(),
                    )
                } else {
                    let message = "Capture module failed to stream".to_string();
                    (
                        StopReason::CaptureError {
                            message: message.clone(),
                        },
                        message,
                    )
                };

                warn!(?status, "{}", message);
                self.stop_capture(reason);
                self.send_event(EngineEvent::Error {
                    recoverable: true,
                    message: message.clone(),
                });
                self.transition_to(EngineState::Error {
                    message,
                    recoverable: true,
                });
                return;
            }
        }

        if self.metrics.should_report(METRICS_INTERVAL) {
            let snapshot = self.metrics.snapshot(CaptureSample {
                capture_fps: session.fps(),
                frames_captured: session.frame_count(),
                content_size: session.content_size(),
            });
            self.send_event(EngineEvent::Metrics(snapshot));
            self.metrics.mark_reported();
        }
    }

    fn set_cursor(&self, visible: bool) {
        let Some(session) = self.inputs.session() else {
            debug!(visible, "No capture session, ignoring cursor toggle");
            return;
        };

        if let Err(e) = session.update_cursor(visible) {
            warn!("Failed to toggle cursor: {}", e);
            self.send_event(EngineEvent::Error {
                recoverable: true,
                message: e.to_string(),
            });
        }
    }

    fn send_capture_sources(&self) {
        let sources = self.inputs.enumerate_sources();
        self.send_event(EngineEvent::CaptureSources(sources));
    }

    fn send_state(&self) {
        let state = self.state.read().clone();
        self.send_event(EngineEvent::StateChanged {
            previous: Box::new(state.clone()),
            current: Box::new(state),
        });
    }

    fn transition_to(&self, new_state: EngineState) {
        transition(&self.state, &self.event_tx, new_state);
    }

    fn send_event(&self, event: EngineEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            warn!("Failed to send event: {}", e);
        }
    }
}

impl<D: TextureDevice> Drop for Engine<D> {
    fn drop(&mut self) {
        self.should_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.render_thread.take() {
            let _ = handle.join();
        }
    }
}

fn transition(state: &RwLock<EngineState>, event_tx: &Sender<EngineEvent>, new_state: EngineState) {
    let previous = {
        let mut state = state.write();
        std::mem::replace(&mut *state, new_state.clone())
    };

    debug!(
        previous = %previous.name(),
        current = %new_state.name(),
        "State transition"
    );

    if let Err(e) = event_tx.try_send(EngineEvent::StateChanged {
        previous: Box::new(previous),
        current: Box::new(new_state),
    }) {
        warn!("Failed to send event: {}", e);
    }
}
