use crate::config::{MeshConfig, parse_signaling_url};
use crate::error::{MeshError, MeshResult};
use crate::signaling::channel::{SignalingChannel, SignalingConnector};
use crate::signaling::events::{EventHandler, EventHandlers, EventKind, SignalingEvent};
use async_trait::async_trait;
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};
use voicemesh_core::{ParticipantId, RoomKey, SignalMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Reason fragment the service uses when its verification backend is down.
pub const AUTH_UNAVAILABLE: &str = "auth-unavailable";

/// WebSocket client for the JSON signaling protocol.
#[derive(Debug, Clone)]
pub struct WsSignalingConnector {
    base_url: String,
    handshake_timeout: Duration,
    connect_attempts: u32,
    reconnect_delay: Duration,
}

enum AttemptError {
    /// Retrying cannot help.
    Fatal(String),
    Retry(String),
}

struct Handshake {
    ws: WsStream,
    local_id: ParticipantId,
    early: Vec<SignalMessage>,
}

impl WsSignalingConnector {
    pub fn new(base_url: impl Into<String>) -> Self {
        let defaults = MeshConfig::default();
        Self {
            base_url: base_url.into(),
            handshake_timeout: defaults.handshake_timeout,
            connect_attempts: defaults.connect_attempts,
            reconnect_delay: defaults.reconnect_delay,
        }
    }

    pub fn from_config(config: &MeshConfig) -> MeshResult<Self> {
        Ok(Self::new(config.signaling_url()?)
            .with_handshake_timeout(config.handshake_timeout)
            .with_retry(config.connect_attempts, config.reconnect_delay))
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.connect_attempts = attempts.max(1);
        self.reconnect_delay = delay;
        self
    }

    async fn handshake(url: &str) -> Result<Handshake, AttemptError> {
        let (mut ws, _) = connect_async(url)
            .await
            .map_err(|e| AttemptError::Retry(format!("connect failed: {e}")))?;

        let mut early = Vec::new();
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    let message = match serde_json::from_str::<SignalMessage>(&text) {
                        Ok(m) => m,
                        Err(e) => {
                            debug!("Skipping malformed frame during handshake: {}", e);
                            continue;
                        }
                    };
                    match message {
                        SignalMessage::Welcome { participant_id } => {
                            return Ok(Handshake {
                                ws,
                                local_id: participant_id,
                                early,
                            });
                        }
                        SignalMessage::Error { reason } => return Err(rejection(reason)),
                        other => early.push(other),
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.as_str().to_owned())
                        .unwrap_or_else(|| "closed before welcome".to_owned());
                    return Err(rejection(reason));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(AttemptError::Retry(format!("handshake failed: {e}"))),
                None => return Err(AttemptError::Retry("closed before welcome".to_owned())),
            }
        }
    }
}

fn rejection(reason: String) -> AttemptError {
    if reason.contains(AUTH_UNAVAILABLE) {
        AttemptError::Fatal(reason)
    } else {
        AttemptError::Retry(reason)
    }
}

#[async_trait]
impl SignalingConnector for WsSignalingConnector {
    async fn connect(
        &self,
        room_key: &RoomKey,
        handlers: EventHandlers,
    ) -> MeshResult<Box<dyn SignalingChannel>> {
        let url = room_url(&self.base_url, room_key)?;
        let mut last_error = String::new();

        for attempt in 1..=self.connect_attempts {
            debug!("Signaling connect attempt {}/{} to {}", attempt, self.connect_attempts, url);

            match tokio::time::timeout(self.handshake_timeout, Self::handshake(&url)).await {
                Ok(Ok(handshake)) => {
                    info!(
                        "Joined signaling room '{}' as {}",
                        room_key, handshake.local_id
                    );
                    let channel = WsSignalingChannel::spawn(room_key.clone(), handshake, handlers);
                    return Ok(Box::new(channel));
                }
                Ok(Err(AttemptError::Fatal(reason))) => {
                    error!("Signaling service refused the connection: {}", reason);
                    return Err(MeshError::SignalingUnavailable(reason));
                }
                Ok(Err(AttemptError::Retry(reason))) => last_error = reason,
                Err(_) => {
                    last_error = format!("handshake timed out after {:?}", self.handshake_timeout)
                }
            }

            warn!(
                "Signaling connect attempt {}/{} failed: {}",
                attempt, self.connect_attempts, last_error
            );
            if attempt < self.connect_attempts {
                tokio::time::sleep(self.reconnect_delay).await;
            }
        }

        Err(MeshError::SignalingUnavailable(format!(
            "gave up after {} attempts: {}",
            self.connect_attempts, last_error
        )))
    }
}

pub struct WsSignalingChannel {
    room_key: RoomKey,
    local_id: ParticipantId,
    handlers: Arc<Mutex<EventHandlers>>,
    outbound: mpsc::UnboundedSender<Message>,
    connected: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl WsSignalingChannel {
    fn spawn(room_key: RoomKey, handshake: Handshake, handlers: EventHandlers) -> Self {
        let Handshake {
            ws,
            local_id,
            early,
        } = handshake;
        let (mut write, read) = ws.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let is_close = matches!(message, Message::Close(_));
                if let Err(e) = write.send(message).await {
                    debug!("Signaling write failed: {}", e);
                    break;
                }
                if is_close {
                    break;
                }
            }
        });

        let handlers = Arc::new(Mutex::new(handlers));
        let connected = Arc::new(AtomicBool::new(true));
        let closing = Arc::new(AtomicBool::new(false));

        let reader = tokio::spawn(read_loop(
            read,
            early,
            handlers.clone(),
            connected.clone(),
            closing.clone(),
        ));

        Self {
            room_key,
            local_id,
            handlers,
            outbound,
            connected,
            closing,
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
        }
    }
}

async fn read_loop(
    mut read: SplitStream<WsStream>,
    early: Vec<SignalMessage>,
    handlers: Arc<Mutex<EventHandlers>>,
    connected: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
) {
    let dispatch = |message: SignalMessage| {
        if let SignalMessage::Error { reason } = &message {
            warn!("Signaling service error: {}", reason);
            return;
        }
        let Some(event) = SignalingEvent::from_message(message) else {
            return;
        };
        debug!("Signaling event {:?}", event.kind());
        handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .dispatch(&event);
    };

    for message in early {
        dispatch(message);
    }

    while let Some(frame) = read.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<SignalMessage>(&text) {
                Ok(message) => dispatch(message),
                Err(e) => debug!("Skipping malformed signaling frame: {}", e),
            },
            Ok(Message::Close(frame)) => {
                debug!("Signaling closed by service: {:?}", frame);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Signaling transport error: {}", e);
                break;
            }
        }
    }

    connected.store(false, Ordering::SeqCst);
    if !closing.load(Ordering::SeqCst) {
        warn!("Signaling connection lost");
        handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .dispatch(&SignalingEvent::Disconnected);
    }
}

#[async_trait]
impl SignalingChannel for WsSignalingChannel {
    fn room_key(&self) -> &RoomKey {
        &self.room_key
    }

    fn local_id(&self) -> &ParticipantId {
        &self.local_id
    }

    fn on_event(&self, kind: EventKind, handler: EventHandler) {
        self.handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .add(kind, handler);
    }

    fn send(&self, message: SignalMessage) {
        let json = match serde_json::to_string(&message) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to encode {:?}: {}", message.kind(), e);
                return;
            }
        };
        if self.outbound.send(Message::Text(json.into())).is_err() {
            debug!("Signaling closed, dropped {:?}", message.kind());
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.outbound.send(Message::Close(None));

        let writer = self.writer.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(writer) = writer {
            if tokio::time::timeout(Duration::from_secs(1), writer).await.is_err() {
                debug!("Signaling close frame not flushed in time");
            }
        }
        let reader = self.reader.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(reader) = reader {
            reader.abort();
        }

        self.handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        info!("Left signaling room '{}'", self.room_key);
    }
}

impl Drop for WsSignalingChannel {
    fn drop(&mut self) {
        self.closing.store(true, Ordering::SeqCst);
        for task in [&self.reader, &self.writer] {
            if let Some(task) = task.lock().unwrap_or_else(|e| e.into_inner()).take() {
                task.abort();
            }
        }
    }
}

/// Appends the room key as the `roomKey` query parameter.
pub fn room_url(base_url: &str, room_key: &RoomKey) -> MeshResult<String> {
    let mut url = parse_signaling_url(base_url)?;
    url.query_pairs_mut().append_pair("roomKey", room_key.as_str());
    Ok(url.into())
}
