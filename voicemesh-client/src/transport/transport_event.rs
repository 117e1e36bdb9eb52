use bytes::Bytes;
use tokio::sync::mpsc;
use voicemesh_core::{NegotiationPayload, ParticipantId};

/// Events a peer connection reports back to the session that owns it.
#[derive(Debug)]
pub enum TransportEvent {
    /// Local negotiation data that must reach the remote participant.
    Negotiation(ParticipantId, NegotiationPayload),

    /// First inbound media arrived; the connection is established.
    RemoteStream(ParticipantId, RemoteAudioStream),

    /// Negotiation or the connection itself failed.
    Failed(ParticipantId, String),

    Closed(ParticipantId),
}

/// Inbound audio from one remote participant, as raw RTP payloads.
#[derive(Debug)]
pub struct RemoteAudioStream {
    pub participant: ParticipantId,
    pub mime_type: String,
    pub clock_rate: u32,
    pub frames: mpsc::Receiver<Bytes>,
}

impl RemoteAudioStream {
    /// Next payload, or `None` once the remote track ended.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.frames.recv().await
    }
}
