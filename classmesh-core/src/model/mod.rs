mod envelope;
mod participant;
mod room;
mod signaling;

pub use envelope::Envelope;
pub use participant::{MediaFlags, ParticipantId, ParticipantInfo, Role};
pub use room::RoomId;
pub use signaling::{
    IceCandidate, IceServerConfig, ParticipantJoined, SdpType, SessionDescription, SignalEvent,
    event_names,
};
