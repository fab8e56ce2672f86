use classmesh_client::{IceCandidate, LinkState, SessionDescription};
use futures::future::join_all;

use crate::utils::{MockNetwork, init_tracing, spawn_test_link, wait_for_link};

/// Remote candidates reach the connection in arrival order no matter where
/// the offer falls among them.
#[tokio::test]
async fn test_candidates_around_offer() {
    init_tracing();

    for offer_at in 0..=3 {
        let network = MockNetwork::new();
        let t = spawn_test_link(&network, "a", "b");

        let mut pending = Vec::new();
        for step in 0..=3 {
            if step == offer_at {
                let offer = SessionDescription::offer("mock-Offer b->a tracks=audio,video");
                pending.push(t.link.accept_offer(offer));
            }
            if step < 3 {
                let candidate = IceCandidate::new(format!("candidate:{}", step));
                pending.push(t.link.add_remote_ice_candidate(candidate));
            }
        }

        for (i, result) in join_all(pending).await.into_iter().enumerate() {
            assert!(result.is_ok(), "offer at {}: op {} failed: {:?}", offer_at, i, result);
        }

        let pc = network.latest("a", "b").unwrap();
        assert!(pc.remote_description().is_some());
        assert_eq!(
            pc.candidates(),
            ["candidate:0", "candidate:1", "candidate:2"],
            "offer at {}",
            offer_at
        );
        assert_eq!(t.signaling.answers().await.len(), 1);
        wait_for_link(&t.link, LinkState::Connected).await.unwrap();

        t.link.close();
    }
}
