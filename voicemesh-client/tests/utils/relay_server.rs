use axum::Router;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tracing::{info, warn};
use voicemesh_core::{ParticipantId, SignalMessage};

type Members = DashMap<ParticipantId, mpsc::UnboundedSender<Message>>;

struct RelayInner {
    rooms: DashMap<String, Arc<Members>>,
    reject_reason: Option<String>,
    connections: AtomicUsize,
}

/// Minimal signaling service speaking the client's JSON protocol.
#[derive(Clone)]
pub struct TestRelay {
    inner: Arc<RelayInner>,
    pub addr: SocketAddr,
}

impl TestRelay {
    pub async fn start() -> Self {
        Self::spawn(None).await
    }

    /// Every connection gets an `error` frame with `reason` and is closed.
    pub async fn rejecting(reason: &str) -> Self {
        Self::spawn(Some(reason.to_owned())).await
    }

    async fn spawn(reject_reason: Option<String>) -> Self {
        let inner = Arc::new(RelayInner {
            rooms: DashMap::new(),
            reject_reason,
            connections: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/voice", get(ws_handler))
            .with_state(inner.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind relay");
        let addr = listener.local_addr().expect("relay addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { inner, addr }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/voice", self.addr)
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.load(Ordering::SeqCst)
    }

    pub fn members(&self, room: &str) -> Vec<ParticipantId> {
        let mut members: Vec<ParticipantId> = self
            .inner
            .rooms
            .get(room)
            .map(|m| m.iter().map(|e| e.key().clone()).collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    /// Sends an arbitrary frame to one member.
    pub fn push(&self, room: &str, to: &ParticipantId, message: &SignalMessage) {
        if let Some(members) = self.inner.rooms.get(room) {
            send(&members, to, message);
        }
    }

    /// Closes every socket from the service side.
    pub fn drop_all(&self) {
        for room in self.inner.rooms.iter() {
            for member in room.value().iter() {
                let _ = member.value().send(Message::Close(None));
            }
        }
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(relay): State<Arc<RelayInner>>,
) -> impl IntoResponse {
    let room = params.get("roomKey").cloned().unwrap_or_default();
    ws.on_upgrade(move |socket| handle_socket(socket, room, relay))
}

async fn handle_socket(socket: WebSocket, room: String, relay: Arc<RelayInner>) {
    relay.connections.fetch_add(1, Ordering::SeqCst);
    let (mut sender, mut receiver) = socket.split();

    if let Some(reason) = &relay.reject_reason {
        let error = SignalMessage::Error {
            reason: reason.clone(),
        };
        if let Ok(json) = serde_json::to_string(&error) {
            let _ = sender.send(Message::Text(json.into())).await;
        }
        let _ = sender
            .send(Message::Close(Some(CloseFrame {
                code: 1008,
                reason: reason.clone().into(),
            })))
            .await;
        return;
    }

    let participant = ParticipantId::random();
    let members = relay
        .rooms
        .entry(room.clone())
        .or_insert_with(|| Arc::new(DashMap::new()))
        .clone();
    info!("[TestRelay] {} joined '{}'", participant, room);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let existing: Vec<ParticipantId> = members.iter().map(|e| e.key().clone()).collect();

    send_to(&tx, &SignalMessage::Welcome {
        participant_id: participant.clone(),
    });
    send_to(&tx, &SignalMessage::Introduction {
        participants: existing.clone(),
    });
    for other in &existing {
        send(&members, other, &SignalMessage::PeerJoined {
            participant_id: participant.clone(),
        });
    }
    members.insert(participant.clone(), tx);

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let is_close = matches!(msg, Message::Close(_));
            if sender.send(msg).await.is_err() || is_close {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn({
        let members = members.clone();
        let participant = participant.clone();

        async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => match serde_json::from_str::<SignalMessage>(&text) {
                        Ok(SignalMessage::Signal(envelope)) => {
                            let to = envelope.to.clone();
                            send(&members, &to, &SignalMessage::Signal(envelope));
                        }
                        Ok(other) => warn!("[TestRelay] unexpected {:?} from {}", other.kind(), participant),
                        Err(e) => warn!("[TestRelay] invalid frame from {}: {}", participant, e),
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    members.remove(&participant);
    for other in members.iter() {
        send_to(other.value(), &SignalMessage::PeerLeft {
            participant_id: participant.clone(),
        });
    }
    info!("[TestRelay] {} left '{}'", participant, room);
}

fn send(members: &Members, to: &ParticipantId, message: &SignalMessage) {
    if let Some(member) = members.get(to) {
        send_to(member.value(), message);
    }
}

fn send_to(tx: &mpsc::UnboundedSender<Message>, message: &SignalMessage) {
    if let Ok(json) = serde_json::to_string(message) {
        let _ = tx.send(Message::Text(json.into()));
    }
}
