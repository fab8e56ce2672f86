use crate::error::Result;
use crate::media::MediaKind;
use crate::peer::{LinkState, RemoteTrack};
use crate::session::roster::Participant;
use crate::session::session_event::FanoutReport;
use classmesh_core::{MediaFlags, ParticipantId};
use std::collections::HashMap;
use tokio::sync::oneshot;

#[derive(Debug, Clone, Default)]
pub(crate) struct SessionSnapshot {
    pub local: MediaFlags,
    pub participants: Vec<Participant>,
    pub peer_states: HashMap<ParticipantId, LinkState>,
    pub remote_streams: HashMap<ParticipantId, Vec<RemoteTrack>>,
}

pub(crate) enum SessionCommand {
    /// `enabled: None` toggles.
    SetMedia {
        kind: MediaKind,
        enabled: Option<bool>,
        reply: oneshot::Sender<Result<bool>>,
    },
    StartScreenShare {
        reply: oneshot::Sender<Result<FanoutReport>>,
    },
    StopScreenShare {
        reply: oneshot::Sender<Result<FanoutReport>>,
    },
    RaiseHand {
        raised: bool,
        reply: oneshot::Sender<Result<()>>,
    },
    SendChat {
        text: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Leave {
        reply: oneshot::Sender<()>,
    },
}
