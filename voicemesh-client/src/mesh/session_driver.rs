use crate::media::LocalMediaSource;
use crate::mesh::observer::MeshObserver;
use crate::registry::{PeerRegistry, PeerSnapshot};
use crate::signaling::{SignalingChannel, SignalingEvent};
use crate::transport::{NegotiationRole, TransportEvent};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use voicemesh_core::{NegotiationEnvelope, ParticipantId, SignalMessage};

#[derive(Debug)]
pub(crate) enum SessionCommand {
    Shutdown { done: oneshot::Sender<()> },
    Snapshot { reply: oneshot::Sender<Vec<PeerSnapshot>> },
}

/// The single task that owns the registry of one session.
pub(crate) struct SessionDriver {
    local_id: ParticipantId,
    registry: PeerRegistry,
    signaling: Box<dyn SignalingChannel>,
    media: LocalMediaSource,
    observer: Arc<dyn MeshObserver>,
    command_rx: mpsc::Receiver<SessionCommand>,
    signal_rx: mpsc::UnboundedReceiver<SignalingEvent>,
    transport_rx: mpsc::Receiver<TransportEvent>,
}

impl SessionDriver {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        local_id: ParticipantId,
        registry: PeerRegistry,
        signaling: Box<dyn SignalingChannel>,
        media: LocalMediaSource,
        observer: Arc<dyn MeshObserver>,
        command_rx: mpsc::Receiver<SessionCommand>,
        signal_rx: mpsc::UnboundedReceiver<SignalingEvent>,
        transport_rx: mpsc::Receiver<TransportEvent>,
    ) -> Self {
        Self {
            local_id,
            registry,
            signaling,
            media,
            observer,
            command_rx,
            signal_rx,
            transport_rx,
        }
    }

    pub(crate) async fn run(mut self) {
        info!("Voice session {} started", self.local_id);

        loop {
            tokio::select! {
                // Events already delivered are handled before any command.
                biased;

                Some(event) = self.signal_rx.recv() => {
                    self.handle_signaling_event(event).await;
                }

                Some(event) = self.transport_rx.recv() => {
                    self.handle_transport_event(event).await;
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(SessionCommand::Shutdown { done }) => {
                            self.shutdown().await;
                            let _ = done.send(());
                            break;
                        }
                        Some(SessionCommand::Snapshot { reply }) => {
                            let _ = reply.send(self.registry.snapshot());
                        }
                        None => {
                            info!("All session handles dropped. Shutting down.");
                            self.shutdown().await;
                            break;
                        }
                    }
                }
            }
        }

        info!("Voice session {} finished", self.local_id);
    }

    async fn handle_signaling_event(&mut self, event: SignalingEvent) {
        match event {
            SignalingEvent::Introduction(participants) => {
                info!("Room has {} other member(s)", participants.len());
                for participant in participants {
                    self.open_peer(participant, NegotiationRole::Initiator).await;
                }
            }

            SignalingEvent::PeerJoined(participant) => {
                self.open_peer(participant, NegotiationRole::Responder).await;
            }

            SignalingEvent::PeerLeft(participant) => {
                self.registry.teardown(&participant).await;
            }

            SignalingEvent::Negotiation(NegotiationEnvelope { to, from, payload }) => {
                if to != self.local_id {
                    debug!("Dropping negotiation addressed to {}", to);
                    return;
                }
                if let Err(e) = self.registry.signal(&from, payload).await {
                    warn!("{}", e);
                }
            }

            SignalingEvent::Disconnected => {
                warn!("Signaling lost; established connections are kept");
                self.observer.on_signaling_lost().await;
            }
        }
    }

    async fn open_peer(&mut self, participant: ParticipantId, role: NegotiationRole) {
        let known = self.registry.contains(&participant);
        match self.registry.ensure(&participant, role).await {
            Ok(Some(_)) if !known => self.observer.on_peer_joined(participant).await,
            Ok(_) => {}
            Err(e) => warn!("{}", e),
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Negotiation(participant, payload) => {
                if !self.registry.contains(&participant) {
                    debug!("Dropping negotiation for closed peer {}", participant);
                    return;
                }
                self.signaling
                    .send(SignalMessage::Signal(NegotiationEnvelope {
                        to: participant,
                        from: self.local_id.clone(),
                        payload,
                    }));
            }

            TransportEvent::RemoteStream(participant, stream) => {
                if self.registry.mark_connected(&participant) {
                    info!("Connected to {}", participant);
                    self.observer.on_remote_stream(participant, stream).await;
                }
            }

            TransportEvent::Failed(participant, reason) => {
                warn!("Connection to {} failed: {}", participant, reason);
                self.registry.teardown(&participant).await;
            }

            TransportEvent::Closed(participant) => {
                self.registry.teardown(&participant).await;
            }
        }
    }

    async fn shutdown(&mut self) {
        let peers = self.registry.len();
        self.registry.teardown_all().await;
        self.signaling.disconnect().await;
        self.media.release();
        info!("Voice session {} stopped ({} connection(s) closed)", self.local_id, peers);
    }
}
