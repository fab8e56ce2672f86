use crate::model::envelope::Envelope;
use crate::model::participant::{ParticipantId, ParticipantInfo, Role};
use crate::model::room::RoomId;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub mod event_names {
    pub const JOIN_ROOM: &str = "join-room";
    pub const LEAVE_ROOM: &str = "leave-room";
    pub const PARTICIPANTS_LIST: &str = "participants-list";
    pub const PARTICIPANT_JOINED: &str = "participant-joined";
    pub const PARTICIPANT_LEFT: &str = "participant-left";
    pub const WEBRTC_OFFER: &str = "webrtc-offer";
    pub const WEBRTC_ANSWER: &str = "webrtc-answer";
    pub const WEBRTC_ICE_CANDIDATE: &str = "webrtc-ice-candidate";
    pub const CHAT_MESSAGE: &str = "chat-message";
    pub const HAND_RAISE: &str = "hand-raise";

    /// Events a joined client listens for.
    pub const INCOMING: &[&str] = &[
        PARTICIPANTS_LIST,
        PARTICIPANT_JOINED,
        PARTICIPANT_LEFT,
        WEBRTC_OFFER,
        WEBRTC_ANSWER,
        WEBRTC_ICE_CANDIDATE,
        CHAT_MESSAGE,
        HAND_RAISE,
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Same shape as the browser's `RTCIceCandidateInit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        default,
        rename = "sdpMLineIndex",
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_m_line_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
            username_fragment: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantJoined {
    pub id: ParticipantId,
    pub name: String,
    #[serde(default)]
    pub role: Role,
    /// Which side of the new pair calls `initiate()`. Absent means the newcomer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiator: Option<ParticipantId>,
}

impl ParticipantJoined {
    pub fn initiator(&self) -> &ParticipantId {
        self.initiator.as_ref().unwrap_or(&self.id)
    }

    pub fn info(&self) -> ParticipantInfo {
        ParticipantInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            role: self.role,
        }
    }
}

impl From<ParticipantInfo> for ParticipantJoined {
    fn from(info: ParticipantInfo) -> Self {
        Self {
            initiator: Some(info.id.clone()),
            id: info.id,
            name: info.name,
            role: info.role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum SignalEvent {
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        room_id: RoomId,
        participant_id: ParticipantId,
        display_name: String,
        role: Role,
    },
    #[serde(rename_all = "camelCase")]
    LeaveRoom {
        room_id: RoomId,
        participant_id: ParticipantId,
    },
    ParticipantsList(Vec<ParticipantInfo>),
    ParticipantJoined(ParticipantJoined),
    ParticipantLeft {
        id: ParticipantId,
    },
    #[serde(rename_all = "camelCase")]
    WebrtcOffer {
        room_id: RoomId,
        to: ParticipantId,
        from: ParticipantId,
        offer: SessionDescription,
    },
    #[serde(rename_all = "camelCase")]
    WebrtcAnswer {
        room_id: RoomId,
        to: ParticipantId,
        from: ParticipantId,
        answer: SessionDescription,
    },
    #[serde(rename_all = "camelCase")]
    WebrtcIceCandidate {
        room_id: RoomId,
        to: ParticipantId,
        from: ParticipantId,
        candidate: IceCandidate,
    },
    #[serde(rename_all = "camelCase")]
    ChatMessage {
        room_id: RoomId,
        from: ParticipantId,
        text: String,
        timestamp: u64,
    },
    #[serde(rename_all = "camelCase")]
    HandRaise {
        room_id: RoomId,
        from: ParticipantId,
        is_raised: bool,
    },
}

impl SignalEvent {
    pub fn name(&self) -> &'static str {
        use event_names::*;
        match self {
            SignalEvent::JoinRoom { .. } => JOIN_ROOM,
            SignalEvent::LeaveRoom { .. } => LEAVE_ROOM,
            SignalEvent::ParticipantsList(_) => PARTICIPANTS_LIST,
            SignalEvent::ParticipantJoined(_) => PARTICIPANT_JOINED,
            SignalEvent::ParticipantLeft { .. } => PARTICIPANT_LEFT,
            SignalEvent::WebrtcOffer { .. } => WEBRTC_OFFER,
            SignalEvent::WebrtcAnswer { .. } => WEBRTC_ANSWER,
            SignalEvent::WebrtcIceCandidate { .. } => WEBRTC_ICE_CANDIDATE,
            SignalEvent::ChatMessage { .. } => CHAT_MESSAGE,
            SignalEvent::HandRaise { .. } => HAND_RAISE,
        }
    }

    /// Room the event is scoped to, if it carries one.
    pub fn room_id(&self) -> Option<&RoomId> {
        match self {
            SignalEvent::JoinRoom { room_id, .. }
            | SignalEvent::LeaveRoom { room_id, .. }
            | SignalEvent::WebrtcOffer { room_id, .. }
            | SignalEvent::WebrtcAnswer { room_id, .. }
            | SignalEvent::WebrtcIceCandidate { room_id, .. }
            | SignalEvent::ChatMessage { room_id, .. }
            | SignalEvent::HandRaise { room_id, .. } => Some(room_id),
            _ => None,
        }
    }

    /// Addressee of peer-to-peer negotiation messages.
    pub fn target(&self) -> Option<&ParticipantId> {
        match self {
            SignalEvent::WebrtcOffer { to, .. }
            | SignalEvent::WebrtcAnswer { to, .. }
            | SignalEvent::WebrtcIceCandidate { to, .. } => Some(to),
            _ => None,
        }
    }

    pub fn to_envelope(&self) -> Result<Envelope, serde_json::Error> {
        serde_json::from_value(serde_json::to_value(self)?)
    }

    pub fn from_parts(event: &str, payload: &serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(json!({ "event": event, "payload": payload }))
    }
}

impl TryFrom<&Envelope> for SignalEvent {
    type Error = serde_json::Error;

    fn try_from(envelope: &Envelope) -> Result<Self, Self::Error> {
        Self::from_parts(&envelope.event, &envelope.payload)
    }
}
