use voicemesh_client::MeshError;

use crate::integration::{TestMesh, init_tracing};
use crate::utils::MockCapture;

#[tokio::test]
async fn test_denied_microphone_fails_before_signaling() {
    init_tracing();

    let mesh = TestMesh::with_capture(MockCapture::denying());
    let err = mesh.start("standup").await.unwrap_err();

    assert!(matches!(err, MeshError::MediaAcquisition(_)), "{err}");
    assert_eq!(mesh.signaling.connect_count(), 0);
    assert!(mesh.coordinator.session().await.is_none());
}

#[tokio::test]
async fn test_signaling_failure_releases_microphone() {
    init_tracing();

    let mesh = TestMesh::new();
    mesh.signaling.fail_with("handshake timed out");

    let err = mesh.start("standup").await.unwrap_err();
    assert!(matches!(err, MeshError::SignalingUnavailable(_)), "{err}");
    assert_eq!(mesh.capture.open_count(), 1);
    assert!(!mesh.capture.is_active());

    // No automatic retry; a later start is allowed.
    assert_eq!(mesh.signaling.connect_count(), 1);
    assert!(mesh.coordinator.session().await.is_none());
}

#[tokio::test]
async fn test_blank_room_key_is_rejected() {
    init_tracing();

    let mesh = TestMesh::new();
    let err = mesh.start("   ").await.unwrap_err();

    assert!(matches!(err, MeshError::InvalidRoomKey(_)));
    assert_eq!(mesh.capture.open_count(), 0);
}

#[tokio::test]
async fn test_second_start_is_refused_while_active() {
    init_tracing();

    let mesh = TestMesh::new();
    let session = mesh.start("standup").await.expect("start failed");

    let err = mesh.start("other").await.unwrap_err();
    assert!(matches!(err, MeshError::SessionActive));
    assert_eq!(mesh.capture.active_count(), 1);

    session.stop().await;
    let again = mesh.start("other").await.expect("restart after stop");
    assert_eq!(again.room_key().as_str(), "other");
    assert_eq!(mesh.capture.active_count(), 1);

    mesh.coordinator.stop().await;
    assert!(!mesh.capture.is_active());
}
