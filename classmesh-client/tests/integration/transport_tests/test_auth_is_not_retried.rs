use classmesh_client::{
    Credential, Delivery, Error, SignalingTransport, TransportConfig, TransportState,
};
use serde_json::json;

use crate::utils::{Outcome, ScriptedConnector, init_tracing};

#[tokio::test(start_paused = true)]
async fn test_auth_is_not_retried() {
    init_tracing();

    let (connector, mut relays) =
        ScriptedConnector::new([Outcome::RejectCredential, Outcome::Accept]);
    let transport = SignalingTransport::new(connector.clone(), TransportConfig::default());

    assert_eq!(transport.send("chat-message", json!({})), Delivery::Queued);

    let err = transport
        .connect(Credential::bearer("expired"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Auth(_)), "got {:?}", err);
    assert!(!err.is_retryable());
    assert_eq!(connector.attempts(), 1);
    assert_eq!(transport.state(), TransportState::Idle);
    assert_eq!(transport.queued(), 1);

    // A fresh credential connects and flushes what was queued.
    transport.connect(Credential::bearer("fresh")).await.unwrap();
    let mut relay = relays.recv().await.unwrap();
    assert_eq!(relay.written().len(), 1);
}
