use classmesh_client::{Error, LinkEventKind, LinkState};
use std::time::Duration;

use crate::utils::{MockNetwork, init_tracing, spawn_test_link, wait_until};

/// Closing while an offer is still being created abandons it: the caller
/// sees `LinkClosed` and nothing is signaled once the offer completes.
#[tokio::test]
async fn test_close_mid_negotiation() {
    init_tracing();

    let network = MockNetwork::new();
    let gate = network.hold_offers();
    let mut a = spawn_test_link(&network, "a", "b");

    let pending = a.link.initiate();
    {
        let network = &network;
        wait_until("the offer is in flight", || async move {
            network.latest("a", "b").is_some_and(|pc| pc.held_offers() == 1)
        })
        .await
        .unwrap();
    }

    a.link.close();
    assert!(matches!(pending.await, Err(Error::LinkClosed)));
    assert_eq!(a.link.state(), LinkState::Closed);

    gate.add_permits(1);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let pc = network.latest("a", "b").unwrap();
    assert_eq!(pc.offers(), 0);
    assert!(pc.is_closed());
    assert_eq!(a.signaling.offers().await, 0);
    assert!(a.signals.try_recv().is_err());
    assert_eq!(a.link.state(), LinkState::Closed);

    let mut states = Vec::new();
    while let Ok(event) = a.events.try_recv() {
        if let LinkEventKind::StateChanged(state) = event.kind {
            states.push(state);
        }
    }
    assert_eq!(states, [LinkState::Closed]);
}
