use crate::config::MeshConfig;
use crate::error::{MeshError, MeshResult};
use crate::media::{AudioCapture, LocalMediaSource};
use crate::mesh::observer::MeshObserver;
use crate::mesh::session::MeshSession;
use crate::mesh::session_driver::SessionDriver;
use crate::registry::PeerRegistry;
use crate::signaling::{EventHandlers, EventKind, SignalingConnector, WsSignalingConnector};
use crate::transport::{PeerConnector, RtcPeerConnector};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, info};
use voicemesh_core::RoomKey;

/// Sent by `stop()` to an in-flight start; answered once it released everything.
type CancelRequest = oneshot::Sender<()>;

enum Phase {
    Idle,
    Starting {
        generation: u64,
        cancel: oneshot::Sender<CancelRequest>,
    },
    Active(MeshSession),
}

/// Entry point of the voice mesh: one session at a time.
pub struct MeshCoordinator {
    capture: Arc<dyn AudioCapture>,
    signaling: Arc<dyn SignalingConnector>,
    peers: Arc<dyn PeerConnector>,
    phase: Mutex<Phase>,
    generation: AtomicU64,
}

impl MeshCoordinator {
    /// WebSocket signaling and WebRTC connections built from `config`.
    pub fn new(config: MeshConfig, capture: Arc<dyn AudioCapture>) -> MeshResult<Self> {
        config.validate()?;
        let signaling = WsSignalingConnector::from_config(&config)?;
        let peers = RtcPeerConnector::new(config.transport.clone());
        Ok(Self::with_components(
            capture,
            Arc::new(signaling),
            Arc::new(peers),
        ))
    }

    pub fn with_components(
        capture: Arc<dyn AudioCapture>,
        signaling: Arc<dyn SignalingConnector>,
        peers: Arc<dyn PeerConnector>,
    ) -> Self {
        Self {
            capture,
            signaling,
            peers,
            phase: Mutex::new(Phase::Idle),
            generation: AtomicU64::new(0),
        }
    }

    /// Acquires the microphone, joins the room and starts meshing.
    ///
    /// Fails with `SessionActive` while another session is starting or
    /// running, and with `Cancelled` when [`stop`](Self::stop) ran meanwhile.
    /// Nothing stays acquired when this returns an error.
    pub async fn start(
        &self,
        room_key: impl Into<String>,
        observer: Arc<dyn MeshObserver>,
    ) -> MeshResult<MeshSession> {
        let room_key = RoomKey::new(room_key)?;

        let (generation, cancel_rx) = {
            let mut phase = self.phase.lock().await;
            match &*phase {
                Phase::Starting { .. } => return Err(MeshError::SessionActive),
                Phase::Active(session) if session.is_active() => {
                    return Err(MeshError::SessionActive);
                }
                _ => {}
            }
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let (cancel, cancel_rx) = oneshot::channel();
            *phase = Phase::Starting { generation, cancel };
            (generation, cancel_rx)
        };

        let result = self.launch(room_key, observer, generation, cancel_rx).await;
        if result.is_err() {
            let mut phase = self.phase.lock().await;
            if matches!(*phase, Phase::Starting { generation: g, .. } if g == generation) {
                *phase = Phase::Idle;
            }
        }
        result
    }

    async fn launch(
        &self,
        room_key: RoomKey,
        observer: Arc<dyn MeshObserver>,
        generation: u64,
        mut cancel_rx: oneshot::Receiver<CancelRequest>,
    ) -> MeshResult<MeshSession> {
        let mut media = LocalMediaSource::new(self.capture.clone());
        let acquired = tokio::select! {
            biased;
            request = &mut cancel_rx => Err(request.ok()),
            result = media.acquire() => Ok(result),
        };
        let local_stream = match acquired {
            Ok(result) => result?,
            Err(request) => {
                debug!("Start #{} cancelled during microphone acquisition", generation);
                return Err(cancelled(&mut media, request));
            }
        };

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let handlers = EventKind::ALL
            .into_iter()
            .fold(EventHandlers::new(), |handlers, kind| {
                let tx = signal_tx.clone();
                handlers.on_event(kind, move |event| {
                    let _ = tx.send(event.clone());
                })
            });
        drop(signal_tx);

        let connected = tokio::select! {
            biased;
            request = &mut cancel_rx => Err(request.ok()),
            result = self.signaling.connect(&room_key, handlers) => Ok(result),
        };
        let signaling = match connected {
            Ok(Ok(channel)) => channel,
            Ok(Err(e)) => {
                media.release();
                return Err(e);
            }
            Err(request) => {
                debug!("Start #{} cancelled during signaling handshake", generation);
                return Err(cancelled(&mut media, request));
            }
        };

        let mut phase = self.phase.lock().await;
        if !matches!(*phase, Phase::Starting { generation: g, .. } if g == generation) {
            drop(phase);
            debug!("Start #{} cancelled after joining signaling", generation);
            signaling.disconnect().await;
            return Err(cancelled(&mut media, cancel_rx.try_recv().ok()));
        }

        let local_id = signaling.local_id().clone();
        let (transport_tx, transport_rx) = mpsc::channel(256);
        let (command_tx, command_rx) = mpsc::channel(16);

        let registry = PeerRegistry::new(
            local_id.clone(),
            local_stream.clone(),
            self.peers.clone(),
            observer.clone(),
            transport_tx,
        );
        let driver = SessionDriver::new(
            local_id.clone(),
            registry,
            signaling,
            media,
            observer,
            command_rx,
            signal_rx,
            transport_rx,
        );
        tokio::spawn(driver.run());

        let session = MeshSession::new(room_key, local_id, local_stream, command_tx);
        *phase = Phase::Active(session.clone());
        info!(
            "Voice session started in room '{}' as {}",
            session.room_key(),
            session.participant_id()
        );
        Ok(session)
    }

    /// Stops the active session, or cancels a start in flight. Idempotent.
    ///
    /// When this returns, nothing acquired by a cancelled start is held.
    pub async fn stop(&self) {
        let previous = std::mem::replace(&mut *self.phase.lock().await, Phase::Idle);
        match previous {
            Phase::Active(session) => session.stop().await,
            Phase::Starting { generation, cancel } => {
                debug!("Cancelling start #{}", generation);
                let (done, released) = oneshot::channel();
                // A start past its last await point cleans up on its own.
                if cancel.send(done).is_ok() {
                    let _ = released.await;
                }
            }
            Phase::Idle => {}
        }
    }

    /// No-op without an active session.
    pub async fn set_microphone_enabled(&self, enabled: bool) {
        if let Phase::Active(session) = &*self.phase.lock().await {
            session.set_microphone_enabled(enabled);
        }
    }

    pub async fn session(&self) -> Option<MeshSession> {
        match &*self.phase.lock().await {
            Phase::Active(session) if session.is_active() => Some(session.clone()),
            _ => None,
        }
    }
}

/// Releases the microphone, then acknowledges the pending `stop()`.
fn cancelled(media: &mut LocalMediaSource, request: Option<CancelRequest>) -> MeshError {
    media.release();
    if let Some(done) = request {
        let _ = done.send(());
    }
    MeshError::Cancelled
}
