use serde_json::json;
use voicemesh_client::signaling::SignalingEvent;
use voicemesh_core::{NegotiationEnvelope, NegotiationPayload, SignalMessage};

use super::{count, join};
use crate::integration::{EVENT_TIMEOUT_MS, init_tracing};
use crate::utils::{TestRelay, wait_until};

#[tokio::test]
async fn test_first_member_gets_empty_introduction() {
    init_tracing();
    let relay = TestRelay::start().await;

    let (channel, log) = join(&relay, "lobby").await;

    assert!(channel.is_connected());
    assert_eq!(channel.room_key().as_str(), "lobby");
    assert_eq!(relay.members("lobby"), vec![channel.local_id().clone()]);

    let log_c = log.clone();
    assert!(wait_until(EVENT_TIMEOUT_MS, move || !log_c.lock().unwrap().is_empty()).await);
    assert_eq!(log.lock().unwrap()[0], SignalingEvent::Introduction(vec![]));

    channel.disconnect().await;
}

#[tokio::test]
async fn test_members_see_each_other_and_relay_signals() {
    init_tracing();
    let relay = TestRelay::start().await;

    let (alice, alice_log) = join(&relay, "standup").await;
    let (bob, bob_log) = join(&relay, "standup").await;
    let alice_id = alice.local_id().clone();
    let bob_id = bob.local_id().clone();

    let log = bob_log.clone();
    let expected = alice_id.clone();
    assert!(
        wait_until(EVENT_TIMEOUT_MS, move || {
            count(&log, |e| *e == SignalingEvent::Introduction(vec![expected.clone()])) == 1
        })
        .await,
        "newcomer is introduced to the existing member"
    );

    let log = alice_log.clone();
    let joined = bob_id.clone();
    assert!(
        wait_until(EVENT_TIMEOUT_MS, move || {
            count(&log, |e| *e == SignalingEvent::PeerJoined(joined.clone())) == 1
        })
        .await
    );

    let envelope = NegotiationEnvelope {
        to: alice_id.clone(),
        from: bob_id.clone(),
        payload: NegotiationPayload(json!({ "type": "offer", "sdp": "v=0" })),
    };
    bob.send(SignalMessage::Signal(envelope.clone()));

    let log = alice_log.clone();
    assert!(
        wait_until(EVENT_TIMEOUT_MS, move || {
            count(&log, |e| *e == SignalingEvent::Negotiation(envelope.clone())) == 1
        })
        .await,
        "signal relayed verbatim to its addressee"
    );
    assert_eq!(
        count(&bob_log, |e| matches!(e, SignalingEvent::Negotiation(_))),
        0
    );

    bob.disconnect().await;

    let log = alice_log.clone();
    let left = bob_id.clone();
    assert!(
        wait_until(EVENT_TIMEOUT_MS, move || {
            count(&log, |e| *e == SignalingEvent::PeerLeft(left.clone())) == 1
        })
        .await
    );
    assert_eq!(
        count(&bob_log, |e| *e == SignalingEvent::Disconnected),
        0,
        "a deliberate leave is not a lost connection"
    );

    alice.disconnect().await;
}

#[tokio::test]
async fn test_service_drop_reports_disconnected_once() {
    init_tracing();
    let relay = TestRelay::start().await;
    let (channel, log) = join(&relay, "lobby").await;

    relay.drop_all();

    let log_c = log.clone();
    assert!(
        wait_until(EVENT_TIMEOUT_MS, move || {
            count(&log_c, |e| *e == SignalingEvent::Disconnected) >= 1
        })
        .await
    );
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    assert_eq!(count(&log, |e| *e == SignalingEvent::Disconnected), 1);
    assert!(!channel.is_connected());

    channel.disconnect().await;
    assert_eq!(count(&log, |e| *e == SignalingEvent::Disconnected), 1);
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    init_tracing();
    let relay = TestRelay::start().await;
    let (channel, log) = join(&relay, "lobby").await;

    channel.disconnect().await;
    channel.disconnect().await;

    assert!(!channel.is_connected());
    let relay_c = relay.clone();
    assert!(wait_until(EVENT_TIMEOUT_MS, move || relay_c.members("lobby").is_empty()).await);
    assert_eq!(count(&log, |e| *e == SignalingEvent::Disconnected), 0);

    // Sends after leaving are dropped quietly.
    channel.send(SignalMessage::Error {
        reason: "late".to_owned(),
    });
}
