use anyhow::Result;
use classmesh_client::{MediaKind, SessionEvent, TrackSource};
use classmesh_relay::RelayHub;

use crate::utils::{MockNetwork, TestParticipant, init_tracing, join_class, wait_for_event};

#[tokio::test]
async fn test_screen_share_fanout() -> Result<()> {
    init_tracing();

    let hub = RelayHub::default();
    let network = MockNetwork::new();
    let mut a = TestParticipant::new("a", &hub, &network);
    let b = TestParticipant::new("b", &hub, &network);
    let c = TestParticipant::new("c", &hub, &network);
    join_class("algebra", &[&a, &b, &c]).await?;

    let offers = network.offers_created();
    let audio = a.coordinator.local_stream().audio.unwrap();

    let report = a.coordinator.start_screen_share().await?;
    assert!(report.is_complete());
    assert_eq!(report.replaced.len(), 2);

    let stream = a.coordinator.local_stream();
    assert!(stream.screen_sharing);
    let screen = stream.video.unwrap();
    assert_eq!(screen.source(), TrackSource::Display);

    for remote in ["b", "c"] {
        let pc = network.latest("a", remote).unwrap();
        assert_eq!(pc.sender_track(MediaKind::Video).as_deref(), Some(screen.id()));
        assert_eq!(pc.sender_track(MediaKind::Audio).as_deref(), Some(audio.id()));
    }
    assert_eq!(network.offers_created(), offers);
    wait_for_event(&mut a.events, |e| {
        matches!(e, SessionEvent::ScreenShareChanged { active: true })
    })
    .await?;

    let report = a.coordinator.stop_screen_share().await?;
    assert_eq!(report.replaced.len(), 2);
    assert!(screen.is_ended());

    let camera = a.coordinator.local_stream().video.unwrap();
    assert_eq!(camera.source(), TrackSource::Camera);
    for remote in ["b", "c"] {
        let pc = network.latest("a", remote).unwrap();
        assert_eq!(pc.sender_track(MediaKind::Video).as_deref(), Some(camera.id()));
    }
    assert_eq!(network.offers_created(), offers);
    Ok(())
}

#[tokio::test]
async fn test_screen_share_stopped_externally() -> Result<()> {
    init_tracing();

    let hub = RelayHub::default();
    let network = MockNetwork::new();
    let mut a = TestParticipant::new("a", &hub, &network);
    let b = TestParticipant::new("b", &hub, &network);
    join_class("algebra", &[&a, &b]).await?;

    a.coordinator.start_screen_share().await?;
    let screen = a.coordinator.local_stream().video.unwrap();

    // The user hits the browser's "stop sharing" button.
    screen.stop();

    wait_for_event(&mut a.events, |e| {
        matches!(e, SessionEvent::ScreenShareChanged { active: false })
    })
    .await?;

    assert!(!a.media.is_screen_sharing());
    let camera = a.coordinator.local_stream().video.unwrap();
    assert_eq!(camera.source(), TrackSource::Camera);
    let pc = network.latest("a", "b").unwrap();
    assert_eq!(pc.sender_track(MediaKind::Video).as_deref(), Some(camera.id()));

    // Nothing left to stop.
    let report = a.coordinator.stop_screen_share().await?;
    assert!(report.replaced.is_empty());
    Ok(())
}
