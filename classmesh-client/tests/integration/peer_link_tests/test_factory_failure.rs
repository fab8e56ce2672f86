use classmesh_client::{Error, LinkEventKind, LinkState};

use crate::utils::{MockNetwork, init_tracing, spawn_test_link, wait_for_link};

#[tokio::test]
async fn test_factory_failure() {
    init_tracing();

    let network = MockNetwork::new();
    let mut t = spawn_test_link(&network, "a", "b");
    // The link task has not run yet on this single-threaded runtime.
    t.factory.fail_create(true);

    wait_for_link(&t.link, LinkState::Failed).await.unwrap();

    let first = t.events.recv().await.unwrap();
    assert!(matches!(
        first.kind,
        LinkEventKind::Error(Error::PeerConnection(_))
    ));
    let second = t.events.recv().await.unwrap();
    assert!(matches!(
        second.kind,
        LinkEventKind::StateChanged(LinkState::Failed)
    ));

    assert!(network.latest("a", "b").is_none());
    assert!(matches!(t.link.initiate().await, Err(Error::LinkClosed)));
}
