use voicemesh_core::{InvalidRoomKey, ParticipantId};

#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    /// Microphone permission denied or no input device.
    #[error("microphone unavailable: {0}")]
    MediaAcquisition(String),

    #[error("signaling service unavailable: {0}")]
    SignalingUnavailable(String),

    /// Failure confined to a single peer connection.
    #[error("negotiation with {participant} failed: {reason}")]
    PeerNegotiation {
        participant: ParticipantId,
        reason: String,
    },

    #[error(transparent)]
    InvalidRoomKey(#[from] InvalidRoomKey),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("a voice session is already starting or active")]
    SessionActive,

    #[error("session start was cancelled by stop()")]
    Cancelled,
}

impl MeshError {
    pub(crate) fn negotiation(participant: &ParticipantId, err: anyhow::Error) -> Self {
        MeshError::PeerNegotiation {
            participant: participant.clone(),
            reason: format!("{err:#}"),
        }
    }
}

pub type MeshResult<T> = Result<T, MeshError>;
