use anyhow::Result;
use classmesh_client::{Error, ParticipantInfo, RoomId};
use classmesh_relay::RelayHub;

use crate::utils::{MockNetwork, TestParticipant, init_tracing, wait_until};

fn ids(members: &[ParticipantInfo]) -> Vec<&str> {
    let mut ids: Vec<&str> = members.iter().map(|m| m.id.as_str()).collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn test_three_participant_mesh() -> Result<()> {
    init_tracing();

    let hub = RelayHub::default();
    let network = MockNetwork::new();
    let a = TestParticipant::new("a", &hub, &network);
    let b = TestParticipant::new("b", &hub, &network);
    let c = TestParticipant::new("c", &hub, &network);

    assert!(a.join("algebra").await?.is_empty());
    assert_eq!(ids(&b.join("algebra").await?), ["a"]);
    assert_eq!(ids(&c.join("algebra").await?), ["a", "b"]);

    for p in [&a, &b, &c] {
        p.wait_connected(2).await?;
    }

    // Newcomers offer: b to a, c to a and b.
    assert_eq!(network.offers_created(), 3);
    let network = &network;
    wait_until("one live connection per ordered pair", || async move {
        [("a", "b"), ("a", "c"), ("b", "a"), ("b", "c"), ("c", "a"), ("c", "b")]
            .iter()
            .all(|(x, y)| network.live(x, y).len() == 1)
    })
    .await?;

    for p in [&a, &b, &c] {
        wait_until("two remote streams with audio and video", || async move {
            let streams = p.coordinator.remote_streams().await;
            streams.len() == 2 && streams.values().all(|tracks| tracks.len() == 2)
        })
        .await?;
        assert_eq!(p.coordinator.participants().await.len(), 2);
    }

    assert_eq!(hub.members(&RoomId::from("algebra")).len(), 3);
    let again = a
        .coordinator
        .join(RoomId::from("algebra"), a.info.clone())
        .await;
    assert!(matches!(again, Err(Error::AlreadyJoined(_))));
    Ok(())
}
