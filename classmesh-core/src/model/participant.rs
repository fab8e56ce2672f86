use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Participant ids are opaque strings issued by the enclosing application.
/// Their lexicographic order decides glare (the larger id yields).
#[derive(Debug, Serialize, Deserialize, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for ParticipantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, Hash, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    #[default]
    Student,
    Observer,
}

/// Roster entry as it travels on the wire (`participants-list`, `participant-joined`).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ParticipantInfo {
    pub id: ParticipantId,
    pub name: String,
    #[serde(default)]
    pub role: Role,
}

impl ParticipantInfo {
    pub fn new(id: impl Into<ParticipantId>, name: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MediaFlags {
    pub video_on: bool,
    pub audio_on: bool,
    pub hand_raised: bool,
}

impl Default for MediaFlags {
    fn default() -> Self {
        Self {
            video_on: true,
            audio_on: true,
            hand_raised: false,
        }
    }
}
