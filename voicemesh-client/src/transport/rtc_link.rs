use crate::error::{MeshError, MeshResult};
use crate::transport::peer_link::{NegotiationRole, PeerConnector, PeerLink, PeerLinkRequest};
use crate::transport::transport_config::TransportConfig;
use crate::transport::transport_event::{RemoteAudioStream, TransportEvent};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use voicemesh_core::{NegotiationPayload, ParticipantId};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// Opens real WebRTC connections with non-trickle negotiation: each side
/// sends one complete description once ICE gathering is done.
#[derive(Debug, Clone, Default)]
pub struct RtcPeerConnector {
    config: TransportConfig,
}

impl RtcPeerConnector {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PeerConnector for RtcPeerConnector {
    async fn open(&self, request: PeerLinkRequest) -> MeshResult<Box<dyn PeerLink>> {
        let participant = request.participant.clone();
        let link = RtcPeerLink::new(request, &self.config)
            .await
            .map_err(|e| MeshError::negotiation(&participant, e))?;
        Ok(Box::new(link))
    }
}

pub struct RtcPeerLink {
    participant: ParticipantId,
    role: NegotiationRole,
    peer_connection: Arc<RTCPeerConnection>,
    inbox: mpsc::UnboundedSender<NegotiationPayload>,
    driver: JoinHandle<()>,
    /// Set by `close()`; the state changes it causes are not reported.
    closing: Arc<AtomicBool>,
}

impl RtcPeerLink {
    async fn new(request: PeerLinkRequest, config: &TransportConfig) -> Result<Self> {
        let PeerLinkRequest {
            participant,
            role,
            local_stream,
            events,
        } = request;

        let mut m = MediaEngine::default();
        m.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut m)?;
        let api = APIBuilder::new()
            .with_media_engine(m)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: config.rtc_ice_servers(),
            ..Default::default()
        };
        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await?);

        for track in local_stream.tracks() {
            let sender = peer_connection
                .add_track(track.rtc_track() as Arc<dyn TrackLocal + Send + Sync>)
                .await
                .context("failed to attach local audio")?;
            // RTCP has to be read for the interceptors to work.
            tokio::spawn(async move {
                let mut buf = vec![0u8; 1500];
                while sender.read(&mut buf).await.is_ok() {}
            });
        }

        let closing = Arc::new(AtomicBool::new(false));
        let state_tx = events.clone();
        let uid_state = participant.clone();
        let closing_state = closing.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let tx = state_tx.clone();
                let uid = uid_state.clone();
                let closing = closing_state.clone();

                Box::pin(async move {
                    info!("Peer connection state for {}: {}", uid, s);
                    if closing.load(Ordering::SeqCst) {
                        return;
                    }
                    match s {
                        // ICE may recover from `Disconnected` on its own.
                        RTCPeerConnectionState::Disconnected => {
                            warn!("Connection to {} interrupted, waiting for ICE", uid);
                        }
                        RTCPeerConnectionState::Failed => {
                            let _ = tx
                                .send(TransportEvent::Failed(uid, format!("connection {s}")))
                                .await;
                        }
                        RTCPeerConnectionState::Closed => {
                            let _ = tx.send(TransportEvent::Closed(uid)).await;
                        }
                        _ => {}
                    }
                })
            },
        ));

        let track_tx = events.clone();
        let uid_track = participant.clone();
        peer_connection.on_track(Box::new(move |track, _receiver, _transceiver| {
            let tx = track_tx.clone();
            let uid = uid_track.clone();

            Box::pin(async move {
                if track.kind() != RTPCodecType::Audio {
                    debug!("Ignoring non-audio track from {}", uid);
                    return;
                }
                tokio::spawn(forward_remote_audio(uid, track, tx));
            })
        }));

        let (inbox, inbox_rx) = mpsc::unbounded_channel();
        let driver = tokio::spawn(drive(
            peer_connection.clone(),
            participant.clone(),
            role,
            inbox_rx,
            events,
        ));

        Ok(Self {
            participant,
            role,
            peer_connection,
            inbox,
            driver,
            closing,
        })
    }
}

#[async_trait]
impl PeerLink for RtcPeerLink {
    fn participant(&self) -> &ParticipantId {
        &self.participant
    }

    fn role(&self) -> NegotiationRole {
        self.role
    }

    fn signal(&self, payload: NegotiationPayload) {
        if self.inbox.send(payload).is_err() {
            debug!("Negotiation with {} already finished", self.participant);
        }
    }

    async fn close(&self) {
        self.closing.store(true, Ordering::SeqCst);
        self.driver.abort();
        if let Err(e) = self.peer_connection.close().await {
            warn!("Failed to close connection to {}: {}", self.participant, e);
        }
    }
}

/// Applies negotiation for one pair strictly in order.
async fn drive(
    pc: Arc<RTCPeerConnection>,
    participant: ParticipantId,
    role: NegotiationRole,
    mut inbox: mpsc::UnboundedReceiver<NegotiationPayload>,
    events: mpsc::Sender<TransportEvent>,
) {
    if role == NegotiationRole::Initiator {
        if let Err(e) = create_offer(&pc).await {
            fail(&participant, &events, e).await;
            return;
        }
        debug!("Offer ready for {}", participant);
        if events
            .send(TransportEvent::Negotiation(participant.clone(), local_payload(&pc).await))
            .await
            .is_err()
        {
            return;
        }
    }

    while let Some(payload) = inbox.recv().await {
        match apply(&pc, &participant, payload).await {
            Ok(Some(reply)) => {
                if events
                    .send(TransportEvent::Negotiation(participant.clone(), reply))
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => {
                fail(&participant, &events, e).await;
                return;
            }
        }
    }
}

/// Returns the payload to send back, if any.
async fn apply(
    pc: &RTCPeerConnection,
    participant: &ParticipantId,
    payload: NegotiationPayload,
) -> Result<Option<NegotiationPayload>> {
    let value = payload.0;
    match value.get("type").and_then(Value::as_str) {
        Some("offer") => {
            debug!("Applying offer from {}", participant);
            let offer = RTCSessionDescription::offer(sdp_of(&value)?)?;
            pc.set_remote_description(offer)
                .await
                .context("remote offer rejected")?;
            let answer = pc.create_answer(None).await?;
            publish_local(pc, answer).await?;
            Ok(Some(local_payload(pc).await))
        }
        Some("answer") => {
            debug!("Applying answer from {}", participant);
            let answer = RTCSessionDescription::answer(sdp_of(&value)?)?;
            pc.set_remote_description(answer)
                .await
                .context("remote answer rejected")?;
            Ok(None)
        }
        Some("candidate") => {
            let init: RTCIceCandidateInit =
                serde_json::from_value(value.get("candidate").cloned().unwrap_or_default())
                    .context("failed to parse ICE candidate")?;
            pc.add_ice_candidate(init).await?;
            Ok(None)
        }
        other => {
            debug!("Ignoring negotiation payload {:?} from {}", other, participant);
            Ok(None)
        }
    }
}

async fn create_offer(pc: &RTCPeerConnection) -> Result<()> {
    let offer = pc
        .create_offer(None)
        .await
        .context("failed to create offer")?;
    publish_local(pc, offer).await
}

/// Sets the local description and waits until it carries every candidate.
async fn publish_local(pc: &RTCPeerConnection, desc: RTCSessionDescription) -> Result<()> {
    let mut gathered = pc.gathering_complete_promise().await;
    pc.set_local_description(desc).await?;
    let _ = gathered.recv().await;
    Ok(())
}

async fn local_payload(pc: &RTCPeerConnection) -> NegotiationPayload {
    let payload = match pc.local_description().await {
        Some(desc) => json!({ "type": desc.sdp_type.to_string(), "sdp": desc.sdp }),
        None => Value::Null,
    };
    NegotiationPayload(payload)
}

fn sdp_of(value: &Value) -> Result<String> {
    value
        .get("sdp")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| anyhow!("session description without sdp"))
}

async fn fail(
    participant: &ParticipantId,
    events: &mpsc::Sender<TransportEvent>,
    err: anyhow::Error,
) {
    warn!("Negotiation with {} failed: {:#}", participant, err);
    let _ = events
        .send(TransportEvent::Failed(participant.clone(), format!("{err:#}")))
        .await;
}

async fn forward_remote_audio(
    participant: ParticipantId,
    track: Arc<TrackRemote>,
    events: mpsc::Sender<TransportEvent>,
) {
    let codec = track.codec();
    let (frames_tx, frames_rx) = mpsc::channel(64);
    let mut pending = Some(RemoteAudioStream {
        participant: participant.clone(),
        mime_type: codec.capability.mime_type.clone(),
        clock_rate: codec.capability.clock_rate,
        frames: frames_rx,
    });

    loop {
        let packet = match track.read_rtp().await {
            Ok((packet, _attributes)) => packet,
            Err(e) => {
                debug!("Remote audio from {} ended: {}", participant, e);
                break;
            }
        };

        if let Some(stream) = pending.take() {
            info!(
                "Remote audio from {} started ({} @ {} Hz)",
                participant, stream.mime_type, stream.clock_rate
            );
            if events
                .send(TransportEvent::RemoteStream(participant.clone(), stream))
                .await
                .is_err()
            {
                break;
            }
        }

        if !packet.payload.is_empty() {
            let _ = frames_tx.try_send(packet.payload);
        }
    }
}
