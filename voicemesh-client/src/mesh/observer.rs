use crate::transport::RemoteAudioStream;
use async_trait::async_trait;
use voicemesh_core::ParticipantId;

/// UI callbacks of one voice session. Called from the session task, in order.
///
/// The session task waits for each callback to return before it handles
/// anything else. Awaiting [`MeshSession::stop`](crate::MeshSession::stop),
/// [`MeshSession::peers`](crate::MeshSession::peers) or
/// [`MeshCoordinator::stop`](crate::MeshCoordinator::stop) inside a callback
/// therefore never completes. Spawn such calls onto their own task instead.
#[async_trait]
pub trait MeshObserver: Send + Sync + 'static {
    /// A connection delivered its first inbound audio.
    async fn on_remote_stream(&self, participant: ParticipantId, stream: RemoteAudioStream);

    /// Fires exactly once per connection that was torn down while the
    /// session ran, and for connections that failed to open.
    async fn on_peer_left(&self, participant: ParticipantId);

    /// A connection was created for an introduced or newly joined member.
    async fn on_peer_joined(&self, _participant: ParticipantId) {}

    /// The signaling transport dropped. Established connections stay up but no
    /// new participants can be reached until the session is restarted.
    async fn on_signaling_lost(&self) {}
}
