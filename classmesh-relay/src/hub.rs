use classmesh_core::{
    Envelope, ParticipantId, ParticipantInfo, ParticipantJoined, RoomId, SignalEvent,
};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Connection {
    outbound: mpsc::UnboundedSender<Envelope>,
    membership: Option<(RoomId, ParticipantId)>,
}

#[derive(Clone)]
struct Member {
    info: ParticipantInfo,
    connection: ConnectionId,
}

struct HubInner {
    next_id: AtomicU64,
    connections: DashMap<ConnectionId, Connection>,
    /// Members in join order.
    rooms: DashMap<RoomId, Vec<Member>>,
    tokens: Vec<String>,
}

/// Room registry and router of the signaling relay.
///
/// Independent of the socket type: a connection is attached with the channel
/// its frames should be written to, and every frame it reads is passed to
/// [`RelayHub::handle`].
#[derive(Clone)]
pub struct RelayHub {
    inner: Arc<HubInner>,
}

impl Default for RelayHub {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl RelayHub {
    /// With no tokens, every credential is accepted.
    pub fn new(tokens: Vec<String>) -> Self {
        Self {
            inner: Arc::new(HubInner {
                next_id: AtomicU64::new(1),
                connections: DashMap::new(),
                rooms: DashMap::new(),
                tokens,
            }),
        }
    }

    pub fn accepts(&self, token: Option<&str>) -> bool {
        self.inner.tokens.is_empty()
            || token.is_some_and(|token| self.inner.tokens.iter().any(|t| t == token))
    }

    pub fn attach(&self, outbound: mpsc::UnboundedSender<Envelope>) -> ConnectionId {
        let id = ConnectionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.connections.insert(
            id,
            Connection {
                outbound,
                membership: None,
            },
        );
        debug!("Connection {} attached", id);
        id
    }

    /// Drops the connection and announces its departure to its room.
    pub fn detach(&self, id: ConnectionId) {
        let Some((_, connection)) = self.inner.connections.remove(&id) else {
            return;
        };
        if let Some((room_id, participant)) = connection.membership {
            info!("{} dropped out of room {}", participant, room_id);
            self.remove_member(&room_id, &participant, id);
        }
        debug!("Connection {} detached", id);
    }

    pub fn handle(&self, id: ConnectionId, envelope: Envelope) {
        let event = match SignalEvent::try_from(&envelope) {
            Ok(event) => event,
            Err(e) => {
                debug!("Ignoring '{}' from {}: {}", envelope.event, id, e);
                return;
            }
        };

        match event {
            SignalEvent::JoinRoom {
                room_id,
                participant_id,
                display_name,
                role,
            } => {
                let info = ParticipantInfo::new(participant_id, display_name, role);
                self.join(id, room_id, info);
            }

            SignalEvent::LeaveRoom {
                room_id,
                participant_id,
            } => self.leave(id, &room_id, &participant_id),

            SignalEvent::WebrtcOffer { room_id, to, .. }
            | SignalEvent::WebrtcAnswer { room_id, to, .. }
            | SignalEvent::WebrtcIceCandidate { room_id, to, .. } => {
                self.forward(id, &room_id, &to, envelope);
            }

            SignalEvent::ChatMessage { room_id, .. } | SignalEvent::HandRaise { room_id, .. } => {
                self.broadcast_from(id, &room_id, envelope);
            }

            SignalEvent::ParticipantsList(_)
            | SignalEvent::ParticipantJoined(_)
            | SignalEvent::ParticipantLeft { .. } => {
                debug!("Ignoring relay-to-client '{}' from {}", envelope.event, id);
            }
        }
    }

    /// Current members of `room_id`, in join order.
    pub fn members(&self, room_id: &RoomId) -> Vec<ParticipantInfo> {
        self.inner
            .rooms
            .get(room_id)
            .map(|members| members.iter().map(|m| m.info.clone()).collect())
            .unwrap_or_default()
    }

    pub fn room_count(&self) -> usize {
        self.inner.rooms.len()
    }

    fn membership(&self, id: ConnectionId) -> Option<(RoomId, ParticipantId)> {
        self.inner
            .connections
            .get(&id)
            .and_then(|connection| connection.membership.clone())
    }

    fn join(&self, id: ConnectionId, room_id: RoomId, info: ParticipantInfo) {
        let previous = match self.inner.connections.get_mut(&id) {
            Some(mut connection) => connection
                .membership
                .replace((room_id.clone(), info.id.clone())),
            None => {
                warn!("join-room from unknown connection {}", id);
                return;
            }
        };
        if let Some((room, participant)) = previous
            && (room != room_id || participant != info.id)
        {
            self.remove_member(&room, &participant, id);
        }

        let (others, displaced) = {
            let mut members = self.inner.rooms.entry(room_id.clone()).or_default();
            let displaced = members
                .iter()
                .position(|m| m.info.id == info.id)
                .map(|index| members.remove(index));
            let others = members.clone();
            members.push(Member {
                info: info.clone(),
                connection: id,
            });
            (others, displaced)
        };

        if let Some(old) = displaced
            && old.connection != id
        {
            info!("{} re-registered in room {} from {}", info.id, room_id, id);
            if let Some(mut connection) = self.inner.connections.get_mut(&old.connection) {
                connection.membership = None;
            }
        }
        info!(
            "{} joined room {} ({} already there)",
            info.id,
            room_id,
            others.len()
        );

        let roster = others.iter().map(|m| m.info.clone()).collect();
        self.send_event(id, &SignalEvent::ParticipantsList(roster));

        let joined = SignalEvent::ParticipantJoined(ParticipantJoined::from(info));
        for member in &others {
            self.send_event(member.connection, &joined);
        }
    }

    fn leave(&self, id: ConnectionId, room_id: &RoomId, participant: &ParticipantId) {
        let registered = self.inner.connections.get_mut(&id).is_some_and(|mut connection| {
            let matches = connection
                .membership
                .as_ref()
                .is_some_and(|(room, who)| room == room_id && who == participant);
            if matches {
                connection.membership = None;
            }
            matches
        });

        if !registered {
            warn!("{} cannot leave room {} it is not in", id, room_id);
            return;
        }
        info!("{} left room {}", participant, room_id);
        self.remove_member(room_id, participant, id);
    }

    fn remove_member(&self, room_id: &RoomId, participant: &ParticipantId, id: ConnectionId) {
        let remaining = {
            let Some(mut members) = self.inner.rooms.get_mut(room_id) else {
                return;
            };
            let Some(index) = members
                .iter()
                .position(|m| m.info.id == *participant && m.connection == id)
            else {
                return;
            };
            members.remove(index);
            members.clone()
        };

        if remaining.is_empty() {
            self.inner.rooms.remove_if(room_id, |_, members| members.is_empty());
            info!("Room {} is empty, removed", room_id);
            return;
        }

        let left = SignalEvent::ParticipantLeft {
            id: participant.clone(),
        };
        for member in &remaining {
            self.send_event(member.connection, &left);
        }
    }

    fn forward(&self, id: ConnectionId, room_id: &RoomId, to: &ParticipantId, envelope: Envelope) {
        if !self.is_member(id, room_id) {
            warn!("{} sent '{}' to room {} without joining", id, envelope.event, room_id);
            return;
        }

        let target = self.inner.rooms.get(room_id).and_then(|members| {
            members
                .iter()
                .find(|m| m.info.id == *to)
                .map(|m| m.connection)
        });
        match target {
            Some(target) => self.deliver(target, envelope),
            None => warn!("Dropping '{}': {} is not in room {}", envelope.event, to, room_id),
        }
    }

    fn broadcast_from(&self, id: ConnectionId, room_id: &RoomId, envelope: Envelope) {
        if !self.is_member(id, room_id) {
            warn!("{} sent '{}' to room {} without joining", id, envelope.event, room_id);
            return;
        }

        let targets: Vec<ConnectionId> = self
            .inner
            .rooms
            .get(room_id)
            .map(|members| {
                members
                    .iter()
                    .map(|m| m.connection)
                    .filter(|c| *c != id)
                    .collect()
            })
            .unwrap_or_default();
        for target in targets {
            self.deliver(target, envelope.clone());
        }
    }

    fn is_member(&self, id: ConnectionId, room_id: &RoomId) -> bool {
        self.membership(id)
            .is_some_and(|(room, _)| room == *room_id)
    }

    fn send_event(&self, id: ConnectionId, event: &SignalEvent) {
        match event.to_envelope() {
            Ok(envelope) => self.deliver(id, envelope),
            Err(e) => warn!("Failed to encode {}: {}", event.name(), e),
        }
    }

    fn deliver(&self, id: ConnectionId, envelope: Envelope) {
        let Some(connection) = self.inner.connections.get(&id) else {
            debug!("Dropping '{}' for closed connection {}", envelope.event, id);
            return;
        };
        if connection.outbound.send(envelope).is_err() {
            debug!("Connection {} is going away", id);
        }
    }
}
