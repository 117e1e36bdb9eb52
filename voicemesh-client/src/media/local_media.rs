use crate::error::{MeshError, MeshResult};
use crate::media::capture::{AudioCapture, CaptureGuard, CaptureStream};
use crate::media::mulaw::{FRAME_DURATION, SAMPLE_RATE, silence_frame};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;
use webrtc::api::media_engine::MIME_TYPE_PCMU;
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// One captured audio track, shared by every outgoing connection.
pub struct LocalAudioTrack {
    id: String,
    label: String,
    enabled: Arc<AtomicBool>,
    rtc_track: Arc<TrackLocalStaticSample>,
    live: Mutex<Option<(CaptureGuard, JoinHandle<()>)>>,
}

impl LocalAudioTrack {
    fn start(stream_id: &str, capture: CaptureStream) -> Self {
        let id = format!("{stream_id}-audio");
        let rtc_track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_PCMU.to_owned(),
                clock_rate: SAMPLE_RATE,
                channels: 1,
                ..Default::default()
            },
            id.clone(),
            stream_id.to_owned(),
        ));
        let enabled = Arc::new(AtomicBool::new(true));

        let CaptureStream {
            label,
            mut frames,
            guard,
        } = capture;
        let pump_track = rtc_track.clone();
        let pump_enabled = enabled.clone();
        let pump = tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                let data = if pump_enabled.load(Ordering::Relaxed) {
                    frame
                } else {
                    silence_frame()
                };
                let sample = Sample {
                    data,
                    duration: FRAME_DURATION,
                    ..Default::default()
                };
                if let Err(e) = pump_track.write_sample(&sample).await {
                    debug!("Dropped outgoing frame: {}", e);
                }
            }
        });

        Self {
            id,
            label,
            enabled,
            rtc_track,
            live: Mutex::new(Some((guard, pump))),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// The track handed to peer connections.
    pub fn rtc_track(&self) -> Arc<TrackLocalStaticSample> {
        self.rtc_track.clone()
    }

    pub fn is_live(&self) -> bool {
        self.live
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    pub fn stop(&self) {
        let live = self.live.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some((guard, pump)) = live {
            pump.abort();
            drop(guard);
        }
    }
}

impl std::fmt::Debug for LocalAudioTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalAudioTrack")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("enabled", &self.is_enabled())
            .field("live", &self.is_live())
            .finish()
    }
}

struct StreamInner {
    id: String,
    tracks: Vec<LocalAudioTrack>,
}

/// Handle to the local capture stream. Clones share the same tracks.
#[derive(Clone)]
pub struct LocalAudioStream {
    inner: Arc<StreamInner>,
}

impl LocalAudioStream {
    fn new(capture: CaptureStream) -> Self {
        let id = format!("voicemesh-{}", Uuid::new_v4().simple());
        let track = LocalAudioTrack::start(&id, capture);
        Self {
            inner: Arc::new(StreamInner {
                id,
                tracks: vec![track],
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn tracks(&self) -> &[LocalAudioTrack] {
        &self.inner.tracks
    }

    /// Enabled when every track is; an empty stream counts as muted.
    pub fn is_enabled(&self) -> bool {
        !self.inner.tracks.is_empty() && self.inner.tracks.iter().all(|t| t.is_enabled())
    }

    pub fn set_enabled(&self, enabled: bool) {
        for track in &self.inner.tracks {
            track.set_enabled(enabled);
        }
    }

    pub fn is_live(&self) -> bool {
        self.inner.tracks.iter().any(|t| t.is_live())
    }

    fn stop(&self) {
        for track in &self.inner.tracks {
            track.stop();
        }
    }
}

impl std::fmt::Debug for LocalAudioStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalAudioStream")
            .field("id", &self.inner.id)
            .field("tracks", &self.inner.tracks)
            .finish()
    }
}

/// Owns the microphone for one call.
pub struct LocalMediaSource {
    capture: Arc<dyn AudioCapture>,
    stream: Option<LocalAudioStream>,
}

impl LocalMediaSource {
    pub fn new(capture: Arc<dyn AudioCapture>) -> Self {
        Self {
            capture,
            stream: None,
        }
    }

    /// Opens the capture device, or returns the stream already held.
    pub async fn acquire(&mut self) -> MeshResult<LocalAudioStream> {
        if let Some(stream) = &self.stream {
            return Ok(stream.clone());
        }

        let capture = self
            .capture
            .open()
            .await
            .map_err(|e| MeshError::MediaAcquisition(format!("{e:#}")))?;

        let stream = LocalAudioStream::new(capture);
        info!(
            "Local audio acquired: stream={} device='{}'",
            stream.id(),
            stream.tracks()[0].label()
        );
        self.stream = Some(stream.clone());
        Ok(stream)
    }

    pub fn release(&mut self) {
        let Some(stream) = self.stream.take() else {
            return;
        };
        stream.stop();
        info!("Local audio released: stream={}", stream.id());
    }

    /// Mutes or unmutes without stopping capture. No-op when nothing is held.
    pub fn set_enabled(&self, enabled: bool) {
        if let Some(stream) = &self.stream {
            stream.set_enabled(enabled);
        }
    }

    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    pub fn stream(&self) -> Option<&LocalAudioStream> {
        self.stream.as_ref()
    }
}

impl Drop for LocalMediaSource {
    fn drop(&mut self) {
        self.release();
    }
}
