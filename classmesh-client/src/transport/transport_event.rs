#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Never connected, or explicitly disconnected.
    Idle,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    /// Reconnect budget exhausted. Only an explicit `connect` leaves this state.
    Disconnected,
}

impl TransportState {
    pub fn is_connected(&self) -> bool {
        matches!(self, TransportState::Connected)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A socket is up and the outbound queue was flushed into it.
    Connected { resumed: bool, flushed: usize },
    /// Non-fatal: a connection attempt failed or an established socket dropped.
    Error(String),
    /// Fatal: all attempts failed. Emitted once per exhaustion.
    Disconnected,
}

/// Outcome of `SignalingTransport::send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Queued,
}
