pub mod lifecycle_tests;
pub mod session_tests;

use serde_json::{Value, json};
use std::sync::Arc;
use tracing::Level;

use voicemesh_client::{MeshCoordinator, MeshResult, MeshSession};
use voicemesh_core::{NegotiationEnvelope, NegotiationPayload};

use crate::utils::{MockCapture, MockPeerConnector, MockSignalingConnector, RecordingObserver};

/// Id the mock signaling service assigns to the local session.
pub const LOCAL_ID: &str = "local";

/// Upper bound for anything that crosses the session task.
pub const EVENT_TIMEOUT_MS: u64 = 2000;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// A coordinator wired to mocks, plus handles to inspect them.
pub struct TestMesh {
    pub coordinator: Arc<MeshCoordinator>,
    pub signaling: MockSignalingConnector,
    pub peers: MockPeerConnector,
    pub capture: MockCapture,
    pub observer: RecordingObserver,
}

impl TestMesh {
    pub fn new() -> Self {
        Self::with_capture(MockCapture::new())
    }

    pub fn with_capture(capture: MockCapture) -> Self {
        let signaling = MockSignalingConnector::new(LOCAL_ID);
        let peers = MockPeerConnector::new();
        let coordinator = MeshCoordinator::with_components(
            Arc::new(capture.clone()),
            Arc::new(signaling.clone()),
            Arc::new(peers.clone()),
        );

        Self {
            coordinator: Arc::new(coordinator),
            signaling,
            peers,
            capture,
            observer: RecordingObserver::new(),
        }
    }

    pub async fn start(&self, room: &str) -> MeshResult<MeshSession> {
        self.coordinator
            .start(room, Arc::new(self.observer.clone()))
            .await
    }

    /// Waits until the mock connector opened `count` links in total.
    pub async fn wait_for_opened(&self, count: usize) -> bool {
        let peers = self.peers.clone();
        crate::utils::wait_until(EVENT_TIMEOUT_MS, move || peers.opened().len() >= count).await
    }
}

pub fn envelope(from: &str, to: &str, payload: Value) -> NegotiationEnvelope {
    NegotiationEnvelope {
        to: to.into(),
        from: from.into(),
        payload: NegotiationPayload(payload),
    }
}

pub fn offer(sdp: &str) -> Value {
    json!({ "type": "offer", "sdp": sdp })
}

pub fn answer(sdp: &str) -> Value {
    json!({ "type": "answer", "sdp": sdp })
}
