use anyhow::Result;
use classmesh_client::SessionEvent;
use classmesh_relay::RelayHub;

use crate::utils::{MockNetwork, TestParticipant, init_tracing, wait_for_event, wait_until};

#[tokio::test]
async fn test_chat_and_hand_raise() -> Result<()> {
    init_tracing();

    let hub = RelayHub::default();
    let network = MockNetwork::new();
    let mut a = TestParticipant::new("a", &hub, &network);
    let mut b = TestParticipant::new("b", &hub, &network);
    a.join("algebra").await?;
    b.join("algebra").await?;

    a.coordinator.send_chat("page 42, exercise 3").await?;
    let event = wait_for_event(&mut b.events, |e| matches!(e, SessionEvent::Chat(_))).await?;
    let SessionEvent::Chat(message) = event else {
        unreachable!()
    };
    assert_eq!(message.from.as_str(), "a");
    assert_eq!(message.text, "page 42, exercise 3");
    assert!(message.timestamp > 0);

    b.coordinator.raise_hand(true).await?;
    wait_for_event(&mut a.events, |e| {
        matches!(
            e,
            SessionEvent::HandRaised { participant, raised: true } if participant.as_str() == "b"
        )
    })
    .await?;
    assert!(b.coordinator.local_flags().await.hand_raised);

    let coordinator = &a.coordinator;
    wait_until("a sees b's raised hand", || async move {
        coordinator
            .participants()
            .await
            .iter()
            .any(|p| p.info.id.as_str() == "b" && p.media.hand_raised)
    })
    .await?;

    assert_eq!(a.connector.sent_count("chat-message"), 1);
    assert_eq!(b.connector.sent_count("hand-raise"), 1);
    Ok(())
}
