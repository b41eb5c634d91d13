//! `JacklineEngine`: session lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! JacklineEngine::new(host, sink)
//!     └─► initialize(config)  → client open, ports in_1..in_N, handler installed,
//!         │                     ring created, host activated, transfer thread spawned
//!         │                     status = Running
//!         └─► shutdown()      → host deactivated, transfer thread joined,
//!                               ports unregistered, client closed, ring destroyed
//!                               status = Stopped
//! ```
//!
//! `initialize()` is a no-op once a client is open. `shutdown()` is idempotent
//! and safe after a partially failed `initialize()`: it only releases what was
//! actually acquired.
//!
//! ## Threading
//!
//! Three contexts touch the ring: the host's real-time thread (producer), the
//! host's reconfiguration callback (resize), and the transfer thread owned by
//! this engine (consumer). The engine never creates or joins the host's
//! threads; it only joins its own transfer thread, and always after the host
//! has been deactivated and before the ring is destroyed.

pub mod cycle;
pub mod transfer;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::{
    buffering::{BlockRing, DiagnosticsSnapshot},
    config::BridgeConfig,
    error::{JacklineError, Result, SetupStage},
    host::AudioHost,
    ipc::events::{SessionStatus, SessionStatusEvent},
    sink::SinkHandle,
};

pub use cycle::CycleHandler;

/// Broadcast channel capacity for status events.
const BROADCAST_CAP: usize = 64;

/// State shared between the engine, the host callbacks and the transfer loop.
pub(crate) struct SessionShared {
    /// `true` while the transfer loop should keep draining.
    pub activated: Arc<AtomicBool>,
    /// Set when a resize failed; the session can't recover without a restart.
    pub failed: AtomicBool,
    /// Current negotiated block size.
    pub block_frames: AtomicU32,
    status: Mutex<SessionStatus>,
    status_tx: broadcast::Sender<SessionStatusEvent>,
}

impl SessionShared {
    pub fn new() -> Self {
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        Self {
            activated: Arc::new(AtomicBool::new(false)),
            failed: AtomicBool::new(false),
            block_frames: AtomicU32::new(0),
            status: Mutex::new(SessionStatus::Idle),
            status_tx,
        }
    }

    /// Reset per-session flags for a fresh `initialize()`.
    pub fn begin(&self, block_frames: u32) {
        self.failed.store(false, Ordering::Release);
        self.block_frames.store(block_frames, Ordering::Release);
    }

    pub fn set_status(&self, status: SessionStatus, detail: Option<String>) {
        *self.status.lock() = status;
        let _ = self.status_tx.send(SessionStatusEvent { status, detail });
    }

    /// Mark the session failed and tell the transfer loop to exit.
    pub fn fail(&self, detail: String) {
        self.failed.store(true, Ordering::Release);
        self.activated.store(false, Ordering::Release);
        self.set_status(SessionStatus::Failed, Some(detail));
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.lock()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionStatusEvent> {
        self.status_tx.subscribe()
    }
}

/// The top-level session handle.
///
/// Owns the host driver, the sink, the ring and the transfer thread.
/// **Not necessarily `Send`**: some host drivers (cpal) are bound to the
/// thread that created them, so create, use and drop the engine there.
pub struct JacklineEngine {
    host: Box<dyn AudioHost>,
    sink: SinkHandle,
    shared: Arc<SessionShared>,
    ring: Option<Arc<BlockRing>>,
    transfer: Option<JoinHandle<()>>,
    client_open: bool,
    ports_registered: bool,
    host_active: bool,
    /// Makes the transfer thread spawn fail, to exercise that setup step.
    #[cfg(test)]
    refuse_transfer_spawn: bool,
}

impl JacklineEngine {
    /// Create an engine. Nothing is opened until `initialize()`.
    pub fn new<H: AudioHost + 'static>(host: H, sink: SinkHandle) -> Self {
        Self {
            host: Box::new(host),
            sink,
            shared: Arc::new(SessionShared::new()),
            ring: None,
            transfer: None,
            client_open: false,
            ports_registered: false,
            host_active: false,
            #[cfg(test)]
            refuse_transfer_spawn: false,
        }
    }

    /// Open the host client, register ports and start streaming.
    ///
    /// On failure the error is logged once and returned; whatever was
    /// acquired so far stays in place for `shutdown()` to release.
    ///
    /// # Errors
    /// - `JacklineError::InvalidConfig` if `config` doesn't validate.
    /// - `JacklineError::Setup` naming the step that failed.
    /// - `JacklineError::ResourceExhausted` if the ring can't be allocated.
    pub fn initialize(&mut self, config: &BridgeConfig) -> Result<()> {
        if self.client_open {
            debug!("initialize called with a client already open");
            return Ok(());
        }
        config.validate()?;

        self.shared.set_status(SessionStatus::Starting, None);
        match self.try_initialize(config) {
            Ok(()) => {
                self.shared.set_status(SessionStatus::Running, None);
                Ok(())
            }
            Err(e) => {
                match e.stage() {
                    Some(stage) => error!(%stage, "initialize failed: {e}"),
                    None => error!("initialize failed: {e}"),
                }
                self.shared.set_status(SessionStatus::Failed, Some(e.to_string()));
                Err(e)
            }
        }
    }

    fn try_initialize(&mut self, config: &BridgeConfig) -> Result<()> {
        let info = self
            .host
            .open(config)
            .map_err(|e| JacklineError::setup(SetupStage::ClientOpen, e.to_string()))?;
        self.client_open = true;
        if info.block_frames == 0 || info.sample_rate == 0 {
            return Err(JacklineError::setup(
                SetupStage::ClientOpen,
                format!(
                    "host reported {} Hz / {} frames",
                    info.sample_rate, info.block_frames
                ),
            ));
        }
        info!(
            client = config.client_name.as_str(),
            sample_rate = info.sample_rate,
            block_frames = info.block_frames,
            "client opened"
        );

        for port in config.port_names() {
            self.ports_registered = true;
            self.host.register_input(&port).map_err(|e| {
                JacklineError::setup(SetupStage::PortRegistration, format!("{port}: {e}"))
            })?;
        }

        let ring = Arc::new(BlockRing::new(info.sample_rate, config.channels as usize));
        self.shared.begin(info.block_frames);
        self.host
            .install_handler(CycleHandler::new(Arc::clone(&ring), Arc::clone(&self.shared)))
            .map_err(|e| JacklineError::setup(SetupStage::CallbackRegistration, e.to_string()))?;

        ring.create(info.block_frames)?;
        self.ring = Some(Arc::clone(&ring));
        info!(
            items = ring.item_count(),
            frames = ring.frame_capacity(),
            channels = ring.channels(),
            "ring buffer created"
        );

        self.host
            .activate()
            .map_err(|e| JacklineError::setup(SetupStage::Activation, e.to_string()))?;
        self.host_active = true;
        self.shared.activated.store(true, Ordering::Release);

        let ctx = transfer::TransferContext {
            ring,
            sink: self.sink.clone(),
            running: Arc::clone(&self.shared.activated),
            idle_poll: config.idle_poll(),
        };
        let handle = self
            .spawn_transfer(ctx)
            .map_err(|e| JacklineError::setup(SetupStage::TransferThread, e.to_string()))?;
        self.transfer = Some(handle);

        info!("session running");
        Ok(())
    }

    fn spawn_transfer(&self, ctx: transfer::TransferContext) -> std::io::Result<JoinHandle<()>> {
        #[cfg(test)]
        if self.refuse_transfer_spawn {
            return Err(std::io::Error::new(
                std::io::ErrorKind::OutOfMemory,
                "thread limit reached",
            ));
        }
        thread::Builder::new()
            .name("jackline-transfer".into())
            .spawn(move || transfer::run(ctx))
    }

    /// Stop streaming and release everything `initialize()` acquired.
    ///
    /// Idempotent: a second call, or a call after a failed `initialize()`
    /// that never opened a client, does nothing.
    pub fn shutdown(&mut self) {
        if !self.client_open {
            return;
        }

        if self.host_active {
            if let Err(e) = self.host.deactivate() {
                warn!("host deactivate failed: {e}");
            }
            self.host_active = false;
        }
        self.shared.activated.store(false, Ordering::Release);

        // Join before the ring goes away: the transfer thread may be mid hand-off.
        if let Some(handle) = self.transfer.take() {
            if handle.join().is_err() {
                error!("transfer thread panicked");
            }
        }

        if self.ports_registered {
            self.host.unregister_inputs();
            self.ports_registered = false;
        }

        self.host.close();
        self.client_open = false;

        if let Some(ring) = self.ring.take() {
            ring.destroy();
        }

        self.shared.set_status(SessionStatus::Stopped, None);
        info!("session shut down");
    }

    /// `true` while the transfer loop is supposed to be running.
    pub fn is_active(&self) -> bool {
        self.shared.activated.load(Ordering::Acquire)
    }

    /// Current session status (snapshot).
    pub fn status(&self) -> SessionStatus {
        self.shared.status()
    }

    /// Subscribe to live status change events.
    pub fn subscribe_status(&self) -> broadcast::Receiver<SessionStatusEvent> {
        self.shared.subscribe()
    }

    /// Current negotiated block size (0 before `initialize()`).
    pub fn block_frames(&self) -> u32 {
        self.shared.block_frames.load(Ordering::Acquire)
    }

    /// The session's ring, while a session exists.
    pub fn ring(&self) -> Option<&Arc<BlockRing>> {
        self.ring.as_ref()
    }

    /// Snapshot of ring counters for observability. Zeroed without a session.
    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.ring
            .as_ref()
            .map(|r| r.diagnostics().snapshot())
            .unwrap_or_default()
    }
}

impl Drop for JacklineEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::host::ManualHost;
    use crate::sink::ChannelSink;

    #[test]
    fn transfer_thread_failure_is_reported_and_released() {
        let host = ManualHost::new(48_000, 480);
        let (sink, _rx) = ChannelSink::unbounded();
        let mut engine = JacklineEngine::new(host.clone(), SinkHandle::new(sink));
        engine.refuse_transfer_spawn = true;

        let config = BridgeConfig {
            idle_poll_ms: 1,
            ..Default::default()
        };
        let err = engine.initialize(&config).unwrap_err();
        assert_eq!(err.stage(), Some(SetupStage::TransferThread));
        assert_eq!(engine.status(), SessionStatus::Failed);
        // Everything before the spawn was acquired.
        assert!(host.is_active());
        assert!(engine.ring().is_some_and(|r| r.has_storage()));

        engine.shutdown();
        assert!(!host.is_active());
        assert!(!host.is_open());
        assert!(host.ports().is_empty());
        assert_eq!(host.close_calls(), 1);
        assert!(engine.ring().is_none());
        assert!(!engine.is_active());
        assert_eq!(engine.status(), SessionStatus::Stopped);

        engine.shutdown();
        assert_eq!(host.close_calls(), 1);
    }
}
