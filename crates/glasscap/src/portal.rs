//! Desktop portal ScreenCast backend.
//!
//! A single pump thread, spawned at init and kept for the life of the
//! process, owns a tokio runtime and serialises portal work. Each start
//! runs the ScreenCast handshake (create session, select sources, start,
//! open the PipeWire remote) and then streams through GStreamer until the
//! next stop.

use std::future::Future;
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ashpd::desktop::screencast::{CursorMode, Screencast, SourceType};
use ashpd::desktop::PersistMode;
use ashpd::WindowIdentifier;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use glass_ipc::abi::BridgeStatus;

use crate::backend::{CaptureBackend, StartRequest, StatusCell};
use crate::delivery::Feed;
use crate::error::{ModuleError, ModuleResult};
use crate::pipewire::PipeWireStream;

/// How long init waits for the portal to answer.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

enum PumpCommand {
    Probe {
        reply: crossbeam_channel::Sender<ModuleResult<()>>,
    },
    Start {
        request: StartRequest,
        feed: Feed,
    },
    Stop,
}

pub struct PortalBackend {
    pump: Mutex<Option<mpsc::UnboundedSender<PumpCommand>>>,
    status: Arc<StatusCell>,
}

impl PortalBackend {
    pub fn new() -> Self {
        Self {
            pump: Mutex::new(None),
            status: Arc::new(StatusCell::new()),
        }
    }

    fn pump(&self) -> ModuleResult<mpsc::UnboundedSender<PumpCommand>> {
        let mut pump = self.pump.lock();
        if let Some(commands) = pump.as_ref() {
            return Ok(commands.clone());
        }

        let (commands, receiver) = mpsc::unbounded_channel();
        let status = Arc::clone(&self.status);
        thread::Builder::new()
            .name("glasscap-portal".into())
            .spawn(move || run_pump(receiver, status))
            .map_err(|e| ModuleError::Thread(e.to_string()))?;

        *pump = Some(commands.clone());
        Ok(commands)
    }

    fn send(&self, command: PumpCommand) -> ModuleResult<()> {
        self.pump()?
            .send(command)
            .map_err(|_| ModuleError::Thread("portal pump exited".into()))
    }
}

impl Default for PortalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for PortalBackend {
    fn name(&self) -> &'static str {
        "portal"
    }

    fn init(&self) -> ModuleResult<()> {
        let (reply, answer) = crossbeam_channel::bounded(1);
        self.send(PumpCommand::Probe { reply })?;

        answer
            .recv_timeout(PROBE_TIMEOUT)
            .map_err(|_| ModuleError::PortalUnavailable("no answer from portal".into()))?
    }

    fn start(&self, request: StartRequest, feed: Feed) -> ModuleResult<()> {
        self.status.set(BridgeStatus::Negotiating);
        if let Err(e) = self.send(PumpCommand::Start { request, feed }) {
            self.status.set(BridgeStatus::Failed);
            return Err(e);
        }
        Ok(())
    }

    fn stop(&self) {
        if let Err(e) = self.send(PumpCommand::Stop) {
            warn!("Failed to stop screen cast: {}", e);
        }
    }

    fn status(&self) -> BridgeStatus {
        self.status.get()
    }
}

fn run_pump(commands: mpsc::UnboundedReceiver<PumpCommand>, status: Arc<StatusCell>) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            warn!("Failed to build portal runtime: {}", e);
            status.set(BridgeStatus::Failed);
            return;
        }
    };

    runtime.block_on(pump_loop(commands, status, run_cast));
    debug!("Portal pump exited");
}

struct ActiveCast {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ActiveCast {
    async fn finish(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.task.await {
            warn!("Screen cast task failed: {}", e);
        }
    }
}

/// Serve pump commands, launching each screen cast with `cast`.
async fn pump_loop<C, F>(
    mut commands: mpsc::UnboundedReceiver<PumpCommand>,
    status: Arc<StatusCell>,
    cast: C,
) where
    C: Fn(StartRequest, Feed, Arc<StatusCell>, oneshot::Receiver<()>) -> F,
    F: Future<Output = ()> + Send + 'static,
{
    let mut active: Option<ActiveCast> = None;

    while let Some(command) = commands.recv().await {
        match command {
            PumpCommand::Probe { reply } => {
                let _ = reply.send(probe().await);
            }
            PumpCommand::Start { request, feed } => {
                if let Some(previous) = active.take() {
                    previous.finish().await;
                }
                // A Stop queued ahead of this start has just reported idle.
                status.set(BridgeStatus::Negotiating);

                let (stop, stopped) = oneshot::channel();
                let task = tokio::spawn(cast(request, feed, Arc::clone(&status), stopped));
                active = Some(ActiveCast { stop, task });
            }
            PumpCommand::Stop => {
                if let Some(cast) = active.take() {
                    cast.finish().await;
                }
                status.set(BridgeStatus::Idle);
            }
        }
    }
}

async fn probe() -> ModuleResult<()> {
    let proxy = Screencast::new()
        .await
        .map_err(|e| ModuleError::PortalUnavailable(e.to_string()))?;
    let offered = proxy
        .available_source_types()
        .await
        .map_err(|e| ModuleError::PortalUnavailable(e.to_string()))?;

    if offered.is_empty() {
        return Err(ModuleError::PortalUnavailable(
            "portal offers no capture sources".into(),
        ));
    }

    debug!(?offered, "Screen cast portal available");
    Ok(())
}

async fn run_cast(
    request: StartRequest,
    feed: Feed,
    status: Arc<StatusCell>,
    mut stopped: oneshot::Receiver<()>,
) {
    let proxy = match Screencast::new().await {
        Ok(proxy) => proxy,
        Err(e) => {
            warn!("Screen cast portal unavailable: {}", e);
            status.set(BridgeStatus::Failed);
            return;
        }
    };

    let negotiation = async {
        let session = proxy.create_session().await?;
        info!("Screen cast session created");

        let cursors = proxy.available_cursor_modes().await?;
        let cursor_mode = if request.want_cursor && cursors.contains(CursorMode::Embedded) {
            CursorMode::Embedded
        } else {
            CursorMode::Hidden
        };

        // The portal dialog lets the user pick monitor or window; the
        // requested kind only decides the cursor.
        let offered = proxy.available_source_types().await?;
        let wanted = SourceType::Monitor | SourceType::Window | SourceType::Virtual;
        proxy
            .select_sources(
                &session,
                cursor_mode,
                offered & wanted,
                false,
                None,
                PersistMode::DoNot,
            )
            .await?
            .response()?;

        let response = proxy
            .start(&session, &WindowIdentifier::default())
            .await?
            .response()?;

        let streams = response.streams();
        if streams.len() > 1 {
            // KDE has been seen attaching stale streams ahead of the one
            // just selected.
            warn!(count = streams.len(), "Portal returned several streams, using the last");
        }
        let node_id = streams
            .last()
            .map(|stream| stream.pipe_wire_node_id())
            .ok_or_else(|| ModuleError::Portal("portal returned no streams".into()))?;

        let fd = proxy.open_pipe_wire_remote(&session).await?;
        Ok::<_, ModuleError>((session, fd, node_id))
    };

    let negotiated = tokio::select! {
        result = negotiation => result,
        _ = &mut stopped => {
            debug!("Screen cast stopped during negotiation");
            return;
        }
    };

    let (session, fd, node_id) = match negotiated {
        Ok(negotiated) => negotiated,
        Err(e) => {
            warn!("Screen cast negotiation failed: {}", e);
            status.set(e.status());
            return;
        }
    };

    match PipeWireStream::start(fd.as_raw_fd(), node_id, feed, Arc::clone(&status)) {
        Ok(stream) => {
            status.set(BridgeStatus::Streaming);
            info!(node_id, "Screen cast streaming");

            let _ = stopped.await;
            stream.stop();
        }
        Err(e) => {
            warn!("Failed to start PipeWire stream: {}", e);
            status.set(e.status());
        }
    }

    if let Err(e) = session.close().await {
        debug!("Failed to close screen cast session: {}", e);
    }
    drop(fd);
}
