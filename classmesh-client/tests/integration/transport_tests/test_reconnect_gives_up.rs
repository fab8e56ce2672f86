use classmesh_client::{
    Credential, ReconnectPolicy, SignalingTransport, TransportConfig, TransportEvent,
    TransportState,
};
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;

use crate::utils::{Outcome, ScriptedConnector, init_tracing};

#[tokio::test(start_paused = true)]
async fn test_reconnect_gives_up() {
    init_tracing();

    // One good socket, then every attempt is refused.
    let (connector, mut relays) = ScriptedConnector::new([Outcome::Accept]);
    let transport = SignalingTransport::new(
        connector.clone(),
        TransportConfig {
            url: "mock://relay".into(),
            reconnect: ReconnectPolicy::default(),
        },
    );
    let mut events = transport.events();

    transport.connect(Credential::bearer("t")).await.unwrap();
    let relay = relays.recv().await.unwrap();

    let dropped_at = tokio::time::Instant::now();
    relay.drop_connection(vec![]);

    let mut errors = 0;
    loop {
        match events.recv().await.unwrap() {
            TransportEvent::Error(_) => errors += 1,
            TransportEvent::Disconnected => break,
            TransportEvent::Connected { .. } => {}
        }
    }

    // 1 initial connect + 5 reconnect attempts, 1s apart.
    assert_eq!(connector.attempts(), 6);
    assert!(dropped_at.elapsed() >= Duration::from_secs(5));
    assert_eq!(errors, 1 + 5);
    assert_eq!(transport.state(), TransportState::Disconnected);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(connector.attempts(), 6);
}
