use anyhow::Result;
use classmesh_client::{Error, RoomId, SessionEvent};
use classmesh_relay::RelayHub;

use crate::utils::{
    MockNetwork, TestParticipant, init_tracing, join_class, wait_for_event, wait_until,
};

#[tokio::test]
async fn test_participant_left() -> Result<()> {
    init_tracing();

    let hub = RelayHub::default();
    let network = MockNetwork::new();
    let mut a = TestParticipant::new("a", &hub, &network);
    let b = TestParticipant::new("b", &hub, &network);
    let mut c = TestParticipant::new("c", &hub, &network);
    join_class("algebra", &[&a, &b, &c]).await?;

    c.coordinator.leave().await?;

    wait_for_event(&mut a.events, |e| {
        matches!(e, SessionEvent::ParticipantLeft(id) if id.as_str() == "c")
    })
    .await?;

    let states = a.coordinator.peer_states().await;
    assert_eq!(states.len(), 1);
    assert!(states.keys().all(|id| id.as_str() == "b"));
    assert!(
        a.coordinator
            .remote_streams()
            .await
            .keys()
            .all(|id| id.as_str() != "c")
    );

    let network = &network;
    wait_until("every connection to c is closed", || async move {
        network.live("a", "c").is_empty()
            && network.live("b", "c").is_empty()
            && network.live("c", "a").is_empty()
            && network.live("c", "b").is_empty()
    })
    .await?;

    // The leaver is fully torn down.
    wait_for_event(&mut c.events, |e| matches!(e, SessionEvent::Left { .. })).await?;
    assert!(!c.coordinator.is_joined());
    assert!(c.coordinator.local_stream().audio.is_none());
    assert!(c.coordinator.local_stream().video.is_none());
    assert!(c.coordinator.participants().await.is_empty());
    assert!(matches!(c.coordinator.leave().await, Err(Error::NotJoined)));

    assert_eq!(hub.members(&RoomId::from("algebra")).len(), 2);
    b.wait_connected(1).await?;
    Ok(())
}
