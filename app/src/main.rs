//! Command-line host for the glass capture engine.
//!
//! Starts the engine on its own thread, forwards one capture request, and
//! logs the events it sends back. The shader stage is a stand-in that only
//! logs what it would render.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use glass_capture::{CaptureBridge, FrameInfo, NativeBackend, ShaderPipeline, TextureDevice};
use glass_ipc::{CaptureConfig, EngineCommand, EngineEvent, EngineState};

mod cli;

use cli::Cli;

/// Shader stage stand-in.
#[derive(Default)]
struct LogPipeline {
    content_size: (u32, u32),
    fresh_frames: u64,
}

impl<T> ShaderPipeline<T> for LogPipeline {
    fn process(&mut self, _input: &T, frame: &FrameInfo) {
        if frame.content_size != self.content_size {
            info!(
                width = frame.content_size.0,
                height = frame.content_size.1,
                "Rendering new content size"
            );
            self.content_size = frame.content_size;
        }
        if frame.fresh {
            self.fresh_frames += 1;
            if self.fresh_frames % 600 == 0 {
                debug!(frames = self.fresh_frames, ticks_ms = frame.ticks_ms, "Rendered fresh frames");
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.capture_config()?;

    info!("Starting glass");
    run_platform(&cli, config)
}

#[cfg(windows)]
fn run_platform(cli: &Cli, config: CaptureConfig) -> anyhow::Result<()> {
    use glass_capture::wgc::{D3D11Device, GpuTexture, WgcBackend};

    let device = D3D11Device::new().context("failed to create Direct3D 11 device")?;
    let native: Box<dyn NativeBackend<GpuTexture>> = Box::new(WgcBackend::new(device.clone()));
    run(cli, config, Arc::new(device), native)
}

#[cfg(not(windows))]
fn run_platform(cli: &Cli, config: CaptureConfig) -> anyhow::Result<()> {
    use glass_capture::{MemoryDevice, MemoryTexture, NoNativeCapture};

    let native: Box<dyn NativeBackend<MemoryTexture>> = Box::new(NoNativeCapture);
    run(cli, config, Arc::new(MemoryDevice::default()), native)
}

fn run<D: TextureDevice>(
    cli: &Cli,
    config: CaptureConfig,
    device: Arc<D>,
    native: Box<dyn NativeBackend<D::Texture>>,
) -> anyhow::Result<()> {
    let bridge = Arc::new(CaptureBridge::dynamic());
    if cli.no_bridge {
        bridge.disable();
    }

    // Create IPC channels
    let (command_tx, command_rx) = glass_ipc::command_channel();
    let (event_tx, event_rx) = glass_ipc::event_channel();

    let mut engine = glass_engine::create_engine(
        command_rx,
        event_tx,
        device,
        bridge,
        native,
        Box::new(LogPipeline::default()),
    );

    // Spawn engine thread
    let engine_thread = thread::Builder::new()
        .name("glass-engine".into())
        .spawn(move || {
            info!("Engine thread starting");
            engine.run();
            info!("Engine thread stopped");
        })
        .context("failed to spawn engine thread")?;

    let result = if cli.list_sources {
        list_sources(&command_tx, &event_rx)
    } else {
        capture(&command_tx, &event_rx, config, cli.duration.map(Duration::from_secs))
    };

    let _ = command_tx.send(EngineCommand::Shutdown);
    if engine_thread.join().is_err() {
        warn!("Engine thread panicked");
    }

    result
}

fn list_sources(
    command_tx: &Sender<EngineCommand>,
    event_rx: &Receiver<EngineEvent>,
) -> anyhow::Result<()> {
    command_tx
        .send(EngineCommand::GetCaptureSources)
        .context("failed to send command")?;

    loop {
        match event_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(EngineEvent::CaptureSources(sources)) => {
                if sources.is_empty() {
                    println!("No capturable sources (native capture unavailable)");
                }
                for source in sources {
                    println!(
                        "{:<24} {:>5}x{:<5} {}",
                        source.id, source.width, source.height, source.name
                    );
                }
                return Ok(());
            }
            Ok(_) => continue, // Skip other events
            Err(e) => anyhow::bail!("timeout waiting for capture sources: {}", e),
        }
    }
}

fn capture(
    command_tx: &Sender<EngineCommand>,
    event_rx: &Receiver<EngineEvent>,
    config: CaptureConfig,
    duration: Option<Duration>,
) -> anyhow::Result<()> {
    command_tx
        .send(EngineCommand::Start { config })
        .context("failed to send start command")?;

    let deadline = duration.map(|d| Instant::now() + d);

    loop {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            info!("Capture duration elapsed");
            return Ok(());
        }

        match event_rx.recv_timeout(Duration::from_millis(200)) {
            Ok(EngineEvent::StateChanged { current, .. }) => match *current {
                EngineState::Error { message, .. } => anyhow::bail!("capture failed: {}", message),
                EngineState::Stopping { reason } => info!(reason = %reason.message(), "Capture stopping"),
                state => info!(state = state.name(), "Engine state"),
            },
            Ok(EngineEvent::ContentSizeKnown { width, height }) => {
                info!(width, height, "Content size known");
            }
            Ok(EngineEvent::Metrics(metrics)) => {
                info!(
                    capture_fps = format!("{:.1}", metrics.capture_fps),
                    render_fps = format!("{:.1}", metrics.render_fps),
                    captured = metrics.frames_captured,
                    repeated = metrics.frames_repeated,
                    "Metrics"
                );
            }
            Ok(EngineEvent::Error { message, .. }) => warn!("Engine error: {}", message),
            Ok(event) => debug!(?event, "Engine event"),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => anyhow::bail!("engine stopped unexpectedly"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glass_capture::{MemoryDevice, MemoryTexture, NoNativeCapture};
    use glass_ipc::InputSource;

    fn no_native() -> Box<dyn NativeBackend<MemoryTexture>> {
        Box::new(NoNativeCapture)
    }

    #[test]
    fn test_log_pipeline_tracks_content_size() {
        let device = MemoryDevice::default();
        let texture: MemoryTexture = device.create_texture(2, 2).unwrap();
        let mut pipeline = LogPipeline::default();

        let frame = FrameInfo {
            ticks_ms: 10,
            frame_count: 1,
            content_size: (2, 2),
            fresh: true,
        };
        ShaderPipeline::<MemoryTexture>::process(&mut pipeline, &texture, &frame);
        ShaderPipeline::<MemoryTexture>::process(
            &mut pipeline,
            &texture,
            &FrameInfo {
                fresh: false,
                ..frame
            },
        );

        assert_eq!(pipeline.content_size, (2, 2));
        assert_eq!(pipeline.fresh_frames, 1);
    }

    #[test]
    fn test_image_capture_runs_for_duration() {
        let path = std::env::temp_dir().join(format!("glass-app-{}.png", std::process::id()));
        image::RgbaImage::new(4, 4).save(&path).unwrap();

        let cli = Cli::try_parse_from(["glass", "--no-bridge", "--duration", "0"]).unwrap();
        let config = CaptureConfig {
            source: InputSource::Image { path: path.clone() },
            ..Default::default()
        };
        let result = run(
            &cli,
            config,
            Arc::new(MemoryDevice::default()),
            no_native(),
        );
        std::fs::remove_file(&path).ok();

        assert!(result.is_ok());
    }

    #[test]
    fn test_capture_without_backend_fails() {
        let cli = Cli::try_parse_from(["glass", "--no-bridge", "--duration", "5"]).unwrap();
        let result = run(
            &cli,
            CaptureConfig::default(),
            Arc::new(MemoryDevice::default()),
            no_native(),
        );

        assert!(result.is_err());
    }
}
