use crate::error::MeshResult;
use crate::media::LocalAudioStream;
use crate::transport::transport_event::TransportEvent;
use async_trait::async_trait;
use tokio::sync::mpsc;
use voicemesh_core::{NegotiationPayload, ParticipantId};

/// Which side of a pair sends the offer.
///
/// Protocol rule: the newcomer always initiates toward the members listed in
/// its introduction, and existing members answer as responders. Two peers
/// therefore never offer to each other at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NegotiationRole {
    Initiator,
    Responder,
}

pub struct PeerLinkRequest {
    pub participant: ParticipantId,
    pub role: NegotiationRole,
    /// Attached at construction; every link shares the same tracks.
    pub local_stream: LocalAudioStream,
    pub events: mpsc::Sender<TransportEvent>,
}

/// Builds encrypted media connections.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn open(&self, request: PeerLinkRequest) -> MeshResult<Box<dyn PeerLink>>;
}

/// One point-to-point connection to a remote participant.
#[async_trait]
pub trait PeerLink: Send + Sync {
    fn participant(&self) -> &ParticipantId;

    fn role(&self) -> NegotiationRole;

    /// Queues an inbound negotiation payload. Payloads apply in arrival order.
    fn signal(&self, payload: NegotiationPayload);

    async fn close(&self);
}
