use crate::peer::LinkState;
use classmesh_core::{MediaFlags, ParticipantId, ParticipantInfo};
use std::collections::BTreeMap;

/// A remote member of the room as seen by this session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub info: ParticipantInfo,
    pub media: MediaFlags,
    pub connection: LinkState,
}

#[derive(Debug, Default)]
pub(crate) struct Roster {
    members: BTreeMap<ParticipantId, Participant>,
}

impl Roster {
    /// Returns `true` if the participant was not known before.
    pub(crate) fn insert(&mut self, info: ParticipantInfo) -> bool {
        match self.members.get_mut(&info.id) {
            Some(existing) => {
                existing.info = info;
                false
            }
            None => {
                self.members.insert(
                    info.id.clone(),
                    Participant {
                        info,
                        media: MediaFlags::default(),
                        connection: LinkState::New,
                    },
                );
                true
            }
        }
    }

    pub(crate) fn remove(&mut self, id: &ParticipantId) -> Option<Participant> {
        self.members.remove(id)
    }

    pub(crate) fn contains(&self, id: &ParticipantId) -> bool {
        self.members.contains_key(id)
    }

    pub(crate) fn ids(&self) -> Vec<ParticipantId> {
        self.members.keys().cloned().collect()
    }

    pub(crate) fn set_connection(&mut self, id: &ParticipantId, state: LinkState) {
        if let Some(member) = self.members.get_mut(id) {
            member.connection = state;
        }
    }

    pub(crate) fn set_hand_raised(&mut self, id: &ParticipantId, raised: bool) {
        if let Some(member) = self.members.get_mut(id) {
            member.media.hand_raised = raised;
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<Participant> {
        self.members.values().cloned().collect()
    }

    pub(crate) fn clear(&mut self) {
        self.members.clear();
    }
}
