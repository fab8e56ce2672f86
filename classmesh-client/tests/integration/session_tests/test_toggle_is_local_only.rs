use anyhow::Result;
use classmesh_client::{MediaKind, SessionEvent};
use classmesh_relay::RelayHub;
use std::time::Duration;

use crate::utils::{MockNetwork, TestParticipant, init_tracing, join_class, wait_for_event};

#[tokio::test]
async fn test_toggle_is_local_only() -> Result<()> {
    init_tracing();

    let hub = RelayHub::default();
    let network = MockNetwork::new();
    let mut a = TestParticipant::new("a", &hub, &network);
    let b = TestParticipant::new("b", &hub, &network);
    join_class("algebra", &[&a, &b]).await?;

    // Let in-flight candidates reach the relay.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let sent = a.connector.sent().len();
    let offers = network.offers_created();

    assert!(!a.coordinator.toggle_audio().await?);
    wait_for_event(&mut a.events, |e| {
        matches!(
            e,
            SessionEvent::LocalMediaChanged {
                kind: MediaKind::Audio,
                enabled: false
            }
        )
    })
    .await?;
    assert!(!a.coordinator.local_flags().await.audio_on);

    assert!(a.coordinator.toggle_audio().await?);
    wait_for_event(&mut a.events, |e| {
        matches!(
            e,
            SessionEvent::LocalMediaChanged {
                kind: MediaKind::Audio,
                enabled: true
            }
        )
    })
    .await?;
    assert!(a.coordinator.local_flags().await.audio_on);
    assert!(a.coordinator.local_stream().audio.unwrap().is_enabled());

    assert!(!a.coordinator.set_local_video(false).await?);
    assert!(!a.coordinator.local_stream().video.unwrap().is_enabled());

    assert_eq!(a.connector.sent().len(), sent);
    assert_eq!(network.offers_created(), offers);
    b.wait_connected(1).await?;
    Ok(())
}
