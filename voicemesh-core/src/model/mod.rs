mod participant;
mod room;
mod signaling;

pub use participant::ParticipantId;
pub use room::{InvalidRoomKey, RoomKey};
pub use signaling::{
    DEFAULT_STUN_URL, IceServerConfig, NegotiationEnvelope, NegotiationPayload, SignalKind,
    SignalMessage,
};
