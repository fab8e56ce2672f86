use classmesh_client::{ParticipantId, RoomId, SessionDescription, SignalEvent};

use crate::utils::{RelayClient, init_tracing, spawn_relay};

#[tokio::test]
async fn test_join_and_route_offer() {
    init_tracing();

    let (addr, hub) = spawn_relay(vec![]).await.expect("Failed to start relay");

    let mut a = RelayClient::connect(addr, "a", "token-a")
        .await
        .expect("Client a failed to connect");
    let mut b = RelayClient::connect(addr, "b", "token-b")
        .await
        .expect("Client b failed to connect");

    a.join("physics").unwrap();
    let first = a.next_event().await.unwrap();
    assert_eq!(first, SignalEvent::ParticipantsList(vec![]));

    b.join("physics").unwrap();
    let SignalEvent::ParticipantsList(list) = b.next_event().await.unwrap() else {
        panic!("b should receive the roster first");
    };
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].id, a.id);

    let SignalEvent::ParticipantJoined(joined) = a.next_event().await.unwrap() else {
        panic!("a should hear about b");
    };
    assert_eq!(joined.id, b.id);
    assert_eq!(joined.initiator(), &b.id);
    assert_eq!(hub.members(&RoomId::from("physics")).len(), 2);

    let offer = SignalEvent::WebrtcOffer {
        room_id: RoomId::from("physics"),
        to: a.id.clone(),
        from: b.id.clone(),
        offer: SessionDescription::offer("v=0 mock"),
    };
    b.transport.emit(&offer).unwrap();

    let received = a
        .wait_for(|e| matches!(e, SignalEvent::WebrtcOffer { .. }))
        .await
        .expect("Offer was not relayed");
    assert_eq!(received, offer);

    // Addressed to someone absent: dropped by the relay.
    let stray = SignalEvent::WebrtcOffer {
        room_id: RoomId::from("physics"),
        to: ParticipantId::from("nobody"),
        from: b.id.clone(),
        offer: SessionDescription::offer("v=0 stray"),
    };
    b.transport.emit(&stray).unwrap();
    assert!(a.next_event().await.is_err());
}
