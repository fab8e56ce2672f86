use crate::error::Error;
use crate::peer::connection::RemoteTrack;
use classmesh_core::ParticipantId;

/// `New → Negotiating → Connected`, `Negotiating | Connected → Failed`,
/// anything `→ Closed`. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    New,
    Negotiating,
    Connected,
    Failed,
    Closed,
}

impl LinkState {
    pub fn is_closed(&self) -> bool {
        matches!(self, LinkState::Closed)
    }
}

/// Reported by a link worker to its owner.
#[derive(Debug, Clone)]
pub struct LinkEvent {
    pub remote: ParticipantId,
    /// Distinguishes a replaced link's late events from the current one's.
    pub link_id: u64,
    pub kind: LinkEventKind,
}

#[derive(Debug, Clone)]
pub enum LinkEventKind {
    StateChanged(LinkState),
    RemoteTrack(RemoteTrack),
    Error(Error),
    /// Both sides offered at once; `yielded` is true if this side dropped its offer.
    Glare { yielded: bool },
}
