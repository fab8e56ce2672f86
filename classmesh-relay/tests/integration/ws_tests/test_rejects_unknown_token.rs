use classmesh_client::{Credential, Error, TransportState};

use crate::utils::{RelayClient, init_tracing, spawn_relay};

#[tokio::test]
async fn test_rejects_unknown_token() {
    init_tracing();

    let (addr, _hub) = spawn_relay(vec!["class-secret".into()])
        .await
        .expect("Failed to start relay");

    let client = RelayClient::new(addr, "intruder");
    let err = client
        .transport
        .connect(Credential::bearer("guess"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Auth(_)), "got {:?}", err);
    assert_eq!(client.transport.state(), TransportState::Idle);

    client
        .transport
        .connect(Credential::bearer("class-secret"))
        .await
        .expect("Accepted token should connect");
    assert_eq!(client.transport.state(), TransportState::Connected);
}
