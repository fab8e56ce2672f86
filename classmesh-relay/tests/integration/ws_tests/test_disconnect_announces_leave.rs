use classmesh_client::{RoomId, SignalEvent};

use crate::utils::{RelayClient, init_tracing, spawn_relay};

#[tokio::test]
async fn test_disconnect_announces_leave() {
    init_tracing();

    let (addr, hub) = spawn_relay(vec![]).await.expect("Failed to start relay");

    let mut a = RelayClient::connect(addr, "a", "t").await.unwrap();
    let mut b = RelayClient::connect(addr, "b", "t").await.unwrap();
    a.join("history").unwrap();
    a.next_event().await.unwrap();
    b.join("history").unwrap();
    b.next_event().await.unwrap();

    b.transport.disconnect();

    let left = a
        .wait_for(|e| matches!(e, SignalEvent::ParticipantLeft { .. }))
        .await
        .expect("a should see b leave");
    assert_eq!(left, SignalEvent::ParticipantLeft { id: b.id.clone() });
    assert_eq!(hub.members(&RoomId::from("history")).len(), 1);

    a.transport.disconnect();
    for _ in 0..50 {
        if hub.room_count() == 0 {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    panic!("Empty room was not removed");
}
