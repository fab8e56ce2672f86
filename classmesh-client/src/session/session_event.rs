use crate::error::Error;
use crate::media::MediaKind;
use crate::peer::{LinkState, RemoteTrack};
use classmesh_core::{ParticipantId, ParticipantInfo, RoomId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub from: ParticipantId,
    pub text: String,
    /// Milliseconds since the Unix epoch, as stamped by the sender.
    pub timestamp: u64,
}

/// Everything observable about a joined session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Joined {
        room_id: RoomId,
        participants: Vec<ParticipantInfo>,
    },
    ParticipantJoined(ParticipantInfo),
    ParticipantLeft(ParticipantId),
    PeerStateChanged {
        participant: ParticipantId,
        state: LinkState,
    },
    RemoteTrackAdded {
        participant: ParticipantId,
        track: RemoteTrack,
    },
    RemoteStreamRemoved {
        participant: ParticipantId,
    },
    /// Negotiation or track replacement towards one participant failed.
    PeerError {
        participant: ParticipantId,
        error: Error,
    },
    /// The link stays failed; no more rebuilds will be attempted.
    PeerFailed {
        participant: ParticipantId,
    },
    GlareResolved {
        participant: ParticipantId,
        yielded: bool,
    },
    LocalMediaChanged {
        kind: MediaKind,
        enabled: bool,
    },
    ScreenShareChanged {
        active: bool,
    },
    HandRaised {
        participant: ParticipantId,
        raised: bool,
    },
    Chat(ChatMessage),
    /// The signaling transport gave up reconnecting. Established media keeps flowing.
    TransportLost,
    Left {
        room_id: RoomId,
    },
}

/// Outcome of pushing one track to every link.
#[derive(Debug, Clone, Default)]
pub struct FanoutReport {
    pub replaced: Vec<ParticipantId>,
    pub failed: Vec<(ParticipantId, Error)>,
}

impl FanoutReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
