use crate::media::LocalAudioStream;
use crate::mesh::session_driver::SessionCommand;
use crate::registry::PeerSnapshot;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, oneshot};
use voicemesh_core::{ParticipantId, RoomKey};

struct SessionInner {
    room_key: RoomKey,
    participant_id: ParticipantId,
    local_stream: LocalAudioStream,
    commands: mpsc::Sender<SessionCommand>,
    stopped: AtomicBool,
}

/// Handle to a running voice session. Clones refer to the same session.
#[derive(Clone)]
pub struct MeshSession {
    inner: Arc<SessionInner>,
}

impl MeshSession {
    pub(crate) fn new(
        room_key: RoomKey,
        participant_id: ParticipantId,
        local_stream: LocalAudioStream,
        commands: mpsc::Sender<SessionCommand>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                room_key,
                participant_id,
                local_stream,
                commands,
                stopped: AtomicBool::new(false),
            }),
        }
    }

    pub fn room_key(&self) -> &RoomKey {
        &self.inner.room_key
    }

    /// Id the signaling service assigned to us for this session.
    pub fn participant_id(&self) -> &ParticipantId {
        &self.inner.participant_id
    }

    pub fn local_stream(&self) -> &LocalAudioStream {
        &self.inner.local_stream
    }

    /// Applies to every current and future connection of this session.
    pub fn set_microphone_enabled(&self, enabled: bool) {
        if self.is_active() {
            self.inner.local_stream.set_enabled(enabled);
        }
    }

    pub fn is_microphone_enabled(&self) -> bool {
        self.inner.local_stream.is_enabled()
    }

    pub fn is_active(&self) -> bool {
        !self.inner.stopped.load(Ordering::SeqCst) && !self.inner.commands.is_closed()
    }

    /// Current connections, sorted by participant id. Empty once stopped.
    pub async fn peers(&self) -> Vec<PeerSnapshot> {
        let (reply, rx) = oneshot::channel();
        if self
            .inner
            .commands
            .send(SessionCommand::Snapshot { reply })
            .await
            .is_err()
        {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Tears down every connection, leaves the room and releases the
    /// microphone. Returns once all of that is done. Idempotent.
    pub async fn stop(&self) {
        if self.inner.stopped.load(Ordering::SeqCst) {
            return;
        }
        let (done, rx) = oneshot::channel();
        if self
            .inner
            .commands
            .send(SessionCommand::Shutdown { done })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
        self.inner.stopped.store(true, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for MeshSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshSession")
            .field("room_key", &self.inner.room_key)
            .field("participant_id", &self.inner.participant_id)
            .field("active", &self.is_active())
            .finish()
    }
}
