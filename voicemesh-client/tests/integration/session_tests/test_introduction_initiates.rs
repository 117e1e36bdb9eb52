use voicemesh_client::transport::NegotiationRole;
use voicemesh_core::ParticipantId;

use crate::integration::{EVENT_TIMEOUT_MS, LOCAL_ID, TestMesh, init_tracing};

#[tokio::test]
async fn test_introduction_opens_initiator_links() {
    init_tracing();

    let mesh = TestMesh::new();
    let session = mesh.start("standup").await.expect("start failed");
    assert_eq!(session.participant_id().as_str(), LOCAL_ID);
    assert_eq!(session.room_key().as_str(), "standup");
    assert_eq!(mesh.signaling.rooms()[0].as_str(), "standup");

    mesh.signaling.introduce(&["p1", "p2"]);
    assert!(mesh.wait_for_opened(2).await, "two links expected");

    let opened = mesh.peers.opened();
    assert_eq!(opened.len(), 2);
    assert!(opened.iter().all(|o| o.role == NegotiationRole::Initiator));

    assert!(mesh.observer.wait_for_events(2, EVENT_TIMEOUT_MS).await);
    assert!(mesh.observer.has_joined(&"p1".into()).await);
    assert!(mesh.observer.has_joined(&"p2".into()).await);

    let snapshot = session.peers().await;
    let ids: Vec<ParticipantId> = snapshot.iter().map(|p| p.participant.clone()).collect();
    assert_eq!(ids, vec![ParticipantId::from("p1"), ParticipantId::from("p2")]);

    session.stop().await;
}

#[tokio::test]
async fn test_introduction_skips_own_id() {
    init_tracing();

    let mesh = TestMesh::new();
    let session = mesh.start("standup").await.expect("start failed");

    mesh.signaling.introduce(&[LOCAL_ID, "p1"]);
    assert!(mesh.wait_for_opened(1).await);

    assert_eq!(mesh.peers.open_count(LOCAL_ID), 0);
    assert_eq!(session.peers().await.len(), 1);

    session.stop().await;
}
