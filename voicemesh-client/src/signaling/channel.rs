use crate::error::MeshResult;
use crate::signaling::events::{EventHandler, EventHandlers, EventKind};
use async_trait::async_trait;
use voicemesh_core::{ParticipantId, RoomKey, SignalMessage};

/// Opens room-scoped signaling channels.
#[async_trait]
pub trait SignalingConnector: Send + Sync {
    /// Resolves once the handshake completed and the service assigned us an id.
    ///
    /// `handlers` are installed before the first event is dispatched.
    async fn connect(
        &self,
        room_key: &RoomKey,
        handlers: EventHandlers,
    ) -> MeshResult<Box<dyn SignalingChannel>>;
}

#[async_trait]
pub trait SignalingChannel: Send + Sync {
    fn room_key(&self) -> &RoomKey;

    /// Id the service assigned to this connection.
    fn local_id(&self) -> &ParticipantId;

    /// Must not be called from inside a handler.
    fn on_event(&self, kind: EventKind, handler: EventHandler);

    /// Fire-and-forget.
    fn send(&self, message: SignalMessage);

    fn is_connected(&self) -> bool;

    /// Closes the transport and drops all handlers. Idempotent.
    async fn disconnect(&self);
}
