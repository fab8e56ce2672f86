use classmesh_client::{
    Credential, Delivery, ReconnectPolicy, SignalingTransport, TransportConfig, TransportEvent,
};
use serde_json::json;
use std::time::Duration;

use crate::utils::{Outcome, ScriptedConnector, init_tracing};

#[tokio::test(start_paused = true)]
async fn test_unsent_messages_requeued() {
    init_tracing();

    let (connector, mut relays) = ScriptedConnector::new([Outcome::Accept, Outcome::Accept]);
    let transport = SignalingTransport::new(
        connector.clone(),
        TransportConfig {
            url: "mock://relay".into(),
            reconnect: ReconnectPolicy::fixed(3, Duration::from_millis(500)),
        },
    );
    let mut events = transport.events();

    transport.connect(Credential::bearer("t")).await.unwrap();
    let mut relay = relays.recv().await.unwrap();

    assert_eq!(transport.send("chat-message", json!({ "n": 1 })), Delivery::Sent);
    // The socket accepted M1 but dies before writing it.
    let accepted = relay.written();
    assert_eq!(accepted.len(), 1);
    relay.drop_connection(accepted);

    loop {
        match events.recv().await.unwrap() {
            TransportEvent::Error(reason) if reason == "connection lost" => break,
            _ => continue,
        }
    }
    assert_eq!(transport.queued(), 1);
    assert_eq!(transport.send("chat-message", json!({ "n": 2 })), Delivery::Queued);

    loop {
        if let TransportEvent::Connected { resumed, flushed } = events.recv().await.unwrap() {
            assert!(resumed);
            assert_eq!(flushed, 2);
            break;
        }
    }

    let mut second = relays.recv().await.unwrap();
    let order: Vec<_> = second
        .written()
        .iter()
        .map(|e| e.payload["n"].clone())
        .collect();
    assert_eq!(order, [json!(1), json!(2)]);
}
