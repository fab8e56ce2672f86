use crate::peer::LinkState;
use classmesh_core::{ParticipantId, RoomId};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The relay refused the credential.
    #[error("Authentication rejected: {0}")]
    Auth(String),

    /// Transport connect/send failure.
    #[error("Network error: {0}")]
    Network(String),

    #[error("Media permission denied: {0}")]
    PermissionDenied(String),

    #[error("Media device unavailable: {0}")]
    DeviceUnavailable(String),

    /// ICE or SDP negotiation with one remote participant failed.
    #[error("Negotiation with {peer} failed: {reason}")]
    Negotiation { peer: ParticipantId, reason: String },

    #[error("{operation} is not valid while the link is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: LinkState,
    },

    #[error("Peer link is closed")]
    LinkClosed,

    #[error("Session has not joined a room")]
    NotJoined,

    #[error("Session already joined room {0}")]
    AlreadyJoined(RoomId),

    #[error("Operation timeout: {0}")]
    Timeout(String),

    /// The transport exhausted its reconnect budget.
    #[error("Signaling transport disconnected")]
    Disconnected,

    #[error("Malformed signaling payload: {0}")]
    Protocol(String),

    #[error("Peer connection error: {0}")]
    PeerConnection(String),
}

impl Error {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Timeout(_))
    }

    /// Errors that must abort `join` before anything is announced.
    pub fn is_media_error(&self) -> bool {
        matches!(self, Error::PermissionDenied(_) | Error::DeviceUnavailable(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Protocol(e.to_string())
    }
}

impl From<webrtc::Error> for Error {
    fn from(e: webrtc::Error) -> Self {
        Error::PeerConnection(e.to_string())
    }
}
