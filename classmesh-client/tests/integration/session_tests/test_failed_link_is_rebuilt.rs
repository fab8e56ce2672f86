use anyhow::Result;
use classmesh_client::{LinkState, SessionEvent};
use classmesh_relay::RelayHub;

use crate::utils::{
    MockNetwork, TestParticipant, init_tracing, join_class, test_config, wait_for_event,
    wait_until,
};

fn failed_with_b(e: &SessionEvent) -> bool {
    matches!(
        e,
        SessionEvent::PeerStateChanged {
            participant,
            state: LinkState::Failed,
        } if participant.as_str() == "b"
    )
}

#[tokio::test]
async fn test_failed_link_is_rebuilt() -> Result<()> {
    init_tracing();

    let hub = RelayHub::default();
    let network = MockNetwork::new();
    let mut a = TestParticipant::new("a", &hub, &network);
    let b = TestParticipant::new("b", &hub, &network);
    join_class("algebra", &[&a, &b]).await?;

    network.latest("a", "b").unwrap().fail();
    wait_for_event(&mut a.events, failed_with_b).await?;

    // a has the smaller id, so it offers again and b answers on a fresh link.
    wait_for_event(&mut a.events, |e| {
        matches!(
            e,
            SessionEvent::PeerStateChanged {
                participant,
                state: LinkState::Connected,
            } if participant.as_str() == "b"
        )
    })
    .await?;

    let network = &network;
    wait_until("both sides rebuilt their connection", || async move {
        network.between("a", "b").len() == 2
            && network.between("b", "a").len() == 2
            && network.live("a", "b").len() == 1
            && network.live("b", "a").len() == 1
            && network.latest("b", "a").is_some_and(|pc| pc.is_connected())
    })
    .await?;
    a.wait_connected(1).await?;
    b.wait_connected(1).await?;
    Ok(())
}

#[tokio::test]
async fn test_link_gives_up_without_retries() -> Result<()> {
    init_tracing();

    let hub = RelayHub::default();
    let network = MockNetwork::new();
    let mut config = test_config();
    config.peer.negotiation_retries = 0;
    let mut a = TestParticipant::with_config("a", &hub, &network, config);
    let b = TestParticipant::new("b", &hub, &network);
    join_class("algebra", &[&a, &b]).await?;

    network.latest("a", "b").unwrap().fail();
    wait_for_event(&mut a.events, |e| {
        matches!(e, SessionEvent::PeerFailed { participant } if participant.as_str() == "b")
    })
    .await?;

    let states = a.coordinator.peer_states().await;
    assert_eq!(states.values().collect::<Vec<_>>(), [&LinkState::Failed]);
    assert_eq!(network.between("a", "b").len(), 1);

    // b stays in the roster; only the media link is gone.
    let participants = a.coordinator.participants().await;
    assert_eq!(participants.len(), 1);
    assert_eq!(participants[0].connection, LinkState::Failed);
    Ok(())
}
