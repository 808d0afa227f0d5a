//! Core orchestrator for glass.
//!
//! This crate picks a capture input, runs the capture session, and drives
//! the render loop that feeds the shader stage.

mod error;
mod input;
mod metrics;
mod orchestrator;
mod render;

pub use error::{EngineError, EngineResult};
pub use input::{load_image, rgba_to_bgra, select_input_mode, InputManager};
pub use metrics::{CaptureSample, MetricsCollector};
pub use orchestrator::Engine;
pub use render::{frame_interval, SharedPipeline};

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use glass_capture::{CaptureBridge, NativeBackend, ShaderPipeline, TextureDevice};
use glass_ipc::{EngineCommand, EngineEvent};

/// Create an engine instance with IPC channels.
pub fn create_engine<D: TextureDevice>(
    command_rx: Receiver<EngineCommand>,
    event_tx: Sender<EngineEvent>,
    device: Arc<D>,
    bridge: Arc<CaptureBridge>,
    native: Box<dyn NativeBackend<D::Texture>>,
    pipeline: Box<dyn ShaderPipeline<D::Texture> + Send>,
) -> Engine<D> {
    let inputs = InputManager::new(device, bridge, native);
    Engine::new(command_rx, event_tx, inputs, pipeline)
}
