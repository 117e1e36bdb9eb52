use crate::error::MeshResult;
use crate::media::LocalAudioStream;
use crate::mesh::MeshObserver;
use crate::transport::{NegotiationRole, PeerConnector, PeerLink, PeerLinkRequest, TransportEvent};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use voicemesh_core::{NegotiationPayload, ParticipantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Negotiating,
    /// First inbound media frame arrived.
    Connected,
    /// Terminal for that connection, which leaves the registry immediately.
    /// A later connection to the same participant starts in `Negotiating`.
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSnapshot {
    pub participant: ParticipantId,
    pub role: NegotiationRole,
    pub state: PeerState,
}

struct PeerEntry {
    link: Box<dyn PeerLink>,
    state: PeerState,
}

/// Owns every peer connection of one session, at most one per participant.
pub struct PeerRegistry {
    local_id: ParticipantId,
    local_stream: LocalAudioStream,
    connector: Arc<dyn PeerConnector>,
    observer: Arc<dyn MeshObserver>,
    events_tx: mpsc::Sender<TransportEvent>,
    peers: HashMap<ParticipantId, PeerEntry>,
    /// Torn down and not reopened since. Only feeds [`PeerRegistry::state`].
    closed: HashSet<ParticipantId>,
}

impl PeerRegistry {
    pub fn new(
        local_id: ParticipantId,
        local_stream: LocalAudioStream,
        connector: Arc<dyn PeerConnector>,
        observer: Arc<dyn MeshObserver>,
        events_tx: mpsc::Sender<TransportEvent>,
    ) -> Self {
        Self {
            local_id,
            local_stream,
            connector,
            observer,
            events_tx,
            peers: HashMap::new(),
            closed: HashSet::new(),
        }
    }

    /// Returns the connection to `participant`, creating it in `role` if needed.
    ///
    /// `Ok(None)` for our own id. A participant whose connection was torn
    /// down gets a fresh one. A connection that fails to open fires
    /// `on_peer_left`.
    pub async fn ensure(
        &mut self,
        participant: &ParticipantId,
        role: NegotiationRole,
    ) -> MeshResult<Option<&dyn PeerLink>> {
        if self.peers.contains_key(participant) {
            return Ok(self.peers.get(participant).map(|e| e.link.as_ref()));
        }
        if *participant == self.local_id {
            debug!("Ignoring our own id {}", participant);
            return Ok(None);
        }

        let request = PeerLinkRequest {
            participant: participant.clone(),
            role,
            local_stream: self.local_stream.clone(),
            events: self.events_tx.clone(),
        };
        let link = match self.connector.open(request).await {
            Ok(link) => link,
            Err(e) => {
                warn!("Could not open connection to {}: {}", participant, e);
                self.observer.on_peer_left(participant.clone()).await;
                return Err(e);
            }
        };

        info!("Opened {:?} connection to {}", role, participant);
        self.closed.remove(participant);
        self.peers.insert(
            participant.clone(),
            PeerEntry {
                link,
                state: PeerState::Negotiating,
            },
        );
        Ok(self.peers.get(participant).map(|e| e.link.as_ref()))
    }

    /// Forwards an inbound payload, answering as responder for unknown ids.
    pub async fn signal(
        &mut self,
        participant: &ParticipantId,
        payload: NegotiationPayload,
    ) -> MeshResult<()> {
        if let Some(link) = self.ensure(participant, NegotiationRole::Responder).await? {
            link.signal(payload);
        }
        Ok(())
    }

    /// Returns `true` on the transition into `Connected`.
    pub fn mark_connected(&mut self, participant: &ParticipantId) -> bool {
        match self.peers.get_mut(participant) {
            Some(entry) if entry.state == PeerState::Negotiating => {
                entry.state = PeerState::Connected;
                true
            }
            _ => false,
        }
    }

    /// Closes and forgets one connection. Returns whether one existed.
    pub async fn teardown(&mut self, participant: &ParticipantId) -> bool {
        let Some(entry) = self.peers.remove(participant) else {
            return false;
        };
        self.closed.insert(participant.clone());

        entry.link.close().await;
        info!("Closed connection to {}", participant);
        self.observer.on_peer_left(participant.clone()).await;
        true
    }

    /// Session shutdown. Observers are not notified.
    pub async fn teardown_all(&mut self) {
        for (participant, entry) in self.peers.drain() {
            entry.link.close().await;
            self.closed.insert(participant);
        }
    }

    pub fn snapshot(&self) -> Vec<PeerSnapshot> {
        let mut peers: Vec<PeerSnapshot> = self
            .peers
            .iter()
            .map(|(participant, entry)| PeerSnapshot {
                participant: participant.clone(),
                role: entry.link.role(),
                state: entry.state,
            })
            .collect();
        peers.sort_by(|a, b| a.participant.cmp(&b.participant));
        peers
    }

    /// `None` for participants this session has not dealt with yet.
    pub fn state(&self, participant: &ParticipantId) -> Option<PeerState> {
        match self.peers.get(participant) {
            Some(entry) => Some(entry.state),
            None if self.closed.contains(participant) => Some(PeerState::Closed),
            None => None,
        }
    }

    pub fn contains(&self, participant: &ParticipantId) -> bool {
        self.peers.contains_key(participant)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
