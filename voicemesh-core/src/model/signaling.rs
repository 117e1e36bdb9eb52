use crate::model::participant::ParticipantId;
use serde::{Deserialize, Serialize};

pub const DEFAULT_STUN_URL: &str = "stun:stun.l.google.com:19302";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl Default for IceServerConfig {
    fn default() -> Self {
        Self {
            urls: vec![DEFAULT_STUN_URL.to_owned()],
            username: None,
            credential: None,
        }
    }
}

/// Transport negotiation data exchanged between two participants.
///
/// The mesh never looks inside; only the peer connection that produced or
/// consumes it does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NegotiationPayload(pub serde_json::Value);

/// Addressed negotiation message relayed verbatim by the signaling service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationEnvelope {
    pub to: ParticipantId,
    pub from: ParticipantId,
    pub payload: NegotiationPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "d", rename_all = "snake_case")]
pub enum SignalMessage {
    /// First frame after the upgrade: the id the service assigned to us.
    Welcome { participant_id: ParticipantId },
    /// Members already present in the room, delivered once on join.
    Introduction { participants: Vec<ParticipantId> },
    PeerJoined { participant_id: ParticipantId },
    PeerLeft { participant_id: ParticipantId },
    Signal(NegotiationEnvelope),
    Error { reason: String },
}

/// Discriminant of [`SignalMessage`], used to key handler tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Welcome,
    Introduction,
    PeerJoined,
    PeerLeft,
    Signal,
    Error,
}

impl SignalMessage {
    pub fn kind(&self) -> SignalKind {
        match self {
            SignalMessage::Welcome { .. } => SignalKind::Welcome,
            SignalMessage::Introduction { .. } => SignalKind::Introduction,
            SignalMessage::PeerJoined { .. } => SignalKind::PeerJoined,
            SignalMessage::PeerLeft { .. } => SignalKind::PeerLeft,
            SignalMessage::Signal(_) => SignalKind::Signal,
            SignalMessage::Error { .. } => SignalKind::Error,
        }
    }
}
