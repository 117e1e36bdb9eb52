use std::collections::HashMap;
use voicemesh_core::{NegotiationEnvelope, ParticipantId, SignalMessage};

/// What the signaling channel reports to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingEvent {
    /// Members already in the room, delivered once right after joining.
    Introduction(Vec<ParticipantId>),
    PeerJoined(ParticipantId),
    PeerLeft(ParticipantId),
    Negotiation(NegotiationEnvelope),
    /// The transport dropped after a successful handshake. Fires at most once.
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Introduction,
    PeerJoined,
    PeerLeft,
    Negotiation,
    Disconnected,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Introduction,
        EventKind::PeerJoined,
        EventKind::PeerLeft,
        EventKind::Negotiation,
        EventKind::Disconnected,
    ];
}

impl SignalingEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SignalingEvent::Introduction(_) => EventKind::Introduction,
            SignalingEvent::PeerJoined(_) => EventKind::PeerJoined,
            SignalingEvent::PeerLeft(_) => EventKind::PeerLeft,
            SignalingEvent::Negotiation(_) => EventKind::Negotiation,
            SignalingEvent::Disconnected => EventKind::Disconnected,
        }
    }

    /// Service frames that carry no room event (`welcome`, `error`) map to `None`.
    pub fn from_message(message: SignalMessage) -> Option<Self> {
        match message {
            SignalMessage::Introduction { participants } => {
                Some(SignalingEvent::Introduction(participants))
            }
            SignalMessage::PeerJoined { participant_id } => {
                Some(SignalingEvent::PeerJoined(participant_id))
            }
            SignalMessage::PeerLeft { participant_id } => {
                Some(SignalingEvent::PeerLeft(participant_id))
            }
            SignalMessage::Signal(envelope) => Some(SignalingEvent::Negotiation(envelope)),
            SignalMessage::Welcome { .. } | SignalMessage::Error { .. } => None,
        }
    }
}

pub type EventHandler = Box<dyn Fn(&SignalingEvent) + Send + Sync>;

/// Ordered handler lists, one per event kind.
#[derive(Default)]
pub struct EventHandlers {
    table: HashMap<EventKind, Vec<EventHandler>>,
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_event(
        mut self,
        kind: EventKind,
        handler: impl Fn(&SignalingEvent) + Send + Sync + 'static,
    ) -> Self {
        self.add(kind, Box::new(handler));
        self
    }

    pub fn add(&mut self, kind: EventKind, handler: EventHandler) {
        self.table.entry(kind).or_default().push(handler);
    }

    /// Calls every handler registered for the event's kind, in registration
    /// order. Returns how many ran.
    pub fn dispatch(&self, event: &SignalingEvent) -> usize {
        let Some(handlers) = self.table.get(&event.kind()) else {
            return 0;
        };
        for handler in handlers {
            handler(event);
        }
        handlers.len()
    }

    pub fn clear(&mut self) {
        self.table.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.table.values().all(Vec::is_empty)
    }
}
