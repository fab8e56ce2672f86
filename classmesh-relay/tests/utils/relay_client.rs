use anyhow::{Context, Result, anyhow};
use classmesh_client::{
    Credential, ParticipantId, ReconnectPolicy, Role, RoomId, SignalEvent, SignalingTransport,
    TransportConfig, event_names,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;

/// Timeout for a relayed frame to arrive (ms).
pub const FRAME_TIMEOUT_MS: u64 = 3000;

/// A signaling transport over a real WebSocket that records every event the
/// relay sends it.
pub struct RelayClient {
    pub id: ParticipantId,
    pub transport: SignalingTransport,
    received: mpsc::UnboundedReceiver<SignalEvent>,
}

impl RelayClient {
    pub fn new(addr: SocketAddr, id: &str) -> Self {
        let config = TransportConfig {
            url: format!("ws://{}/ws", addr),
            reconnect: ReconnectPolicy::fixed(2, Duration::from_millis(50)),
        };
        let transport = SignalingTransport::websocket(config);

        let (tx, received) = mpsc::unbounded_channel();
        for &name in event_names::INCOMING {
            let tx = tx.clone();
            transport.subscribe(name, move |payload| {
                let event = SignalEvent::from_parts(name, payload)?;
                tx.send(event).map_err(|_| anyhow!("test client dropped"))?;
                Ok(())
            });
        }

        Self {
            id: ParticipantId::from(id),
            transport,
            received,
        }
    }

    pub async fn connect(addr: SocketAddr, id: &str, token: &str) -> Result<Self> {
        let client = Self::new(addr, id);
        client
            .transport
            .connect(Credential::bearer(token))
            .await
            .context("Failed to connect to relay")?;
        Ok(client)
    }

    pub fn join(&self, room: &str) -> Result<()> {
        self.transport.emit(&SignalEvent::JoinRoom {
            room_id: RoomId::from(room),
            participant_id: self.id.clone(),
            display_name: self.id.to_string(),
            role: Role::Student,
        })?;
        Ok(())
    }

    pub async fn next_event(&mut self) -> Result<SignalEvent> {
        tokio::time::timeout(
            Duration::from_millis(FRAME_TIMEOUT_MS),
            self.received.recv(),
        )
        .await
        .context("Timeout waiting for relayed event")?
        .context("Event channel closed")
    }

    /// Skips events until one matches.
    pub async fn wait_for<F>(&mut self, mut matches: F) -> Result<SignalEvent>
    where
        F: FnMut(&SignalEvent) -> bool,
    {
        loop {
            let event = self.next_event().await?;
            if matches(&event) {
                return Ok(event);
            }
            tracing::debug!("[RelayClient] skipping {}", event.name());
        }
    }
}
