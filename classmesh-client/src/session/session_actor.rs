use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::media::{LocalMediaSource, LocalTrack, MediaEvent, MediaKind};
use crate::peer::{LinkContext, LinkEvent, LinkEventKind, LinkState, PeerLink, RemoteTrack};
use crate::session::roster::Roster;
use crate::session::session_command::{SessionCommand, SessionSnapshot};
use crate::session::session_event::{ChatMessage, FanoutReport, SessionEvent};
use crate::transport::{SignalingTransport, SubscriptionId, TransportEvent};
use classmesh_core::{
    IceCandidate, MediaFlags, ParticipantId, ParticipantInfo, RoomId, SessionDescription,
    SignalEvent,
};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Channels the actor is driven by.
pub(crate) struct SessionInputs {
    pub commands: mpsc::UnboundedReceiver<SessionCommand>,
    pub signals: mpsc::UnboundedReceiver<SignalEvent>,
    pub link_events: mpsc::UnboundedReceiver<LinkEvent>,
    pub media_events: broadcast::Receiver<MediaEvent>,
    pub transport_events: broadcast::Receiver<TransportEvent>,
}

/// Owns the roster and every peer link of one joined room. All state
/// changes happen on this task, one event at a time.
pub(crate) struct SessionActor {
    room_id: RoomId,
    local: ParticipantInfo,
    local_flags: MediaFlags,
    config: SessionConfig,
    transport: SignalingTransport,
    media: Arc<LocalMediaSource>,
    link_ctx: LinkContext,
    roster: Roster,
    links: HashMap<ParticipantId, PeerLink>,
    orphan_candidates: HashMap<ParticipantId, Vec<IceCandidate>>,
    remote_tracks: HashMap<ParticipantId, Vec<RemoteTrack>>,
    rebuilds: HashMap<ParticipantId, u32>,
    subscriptions: Vec<(&'static str, SubscriptionId)>,
    events_tx: broadcast::Sender<SessionEvent>,
    joined_tx: Option<oneshot::Sender<Vec<ParticipantInfo>>>,
}

impl SessionActor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        room_id: RoomId,
        local: ParticipantInfo,
        config: SessionConfig,
        transport: SignalingTransport,
        media: Arc<LocalMediaSource>,
        link_ctx: LinkContext,
        subscriptions: Vec<(&'static str, SubscriptionId)>,
        events_tx: broadcast::Sender<SessionEvent>,
        joined_tx: oneshot::Sender<Vec<ParticipantInfo>>,
    ) -> Self {
        let local_flags = MediaFlags {
            video_on: media.is_enabled(MediaKind::Video),
            audio_on: media.is_enabled(MediaKind::Audio),
            hand_raised: false,
        };

        Self {
            room_id,
            local,
            local_flags,
            config,
            transport,
            media,
            link_ctx,
            roster: Roster::default(),
            links: HashMap::new(),
            orphan_candidates: HashMap::new(),
            remote_tracks: HashMap::new(),
            rebuilds: HashMap::new(),
            subscriptions,
            events_tx,
            joined_tx: Some(joined_tx),
        }
    }

    pub(crate) async fn run(mut self, mut inputs: SessionInputs) {
        info!("Session {} in room {} started", self.local.id, self.room_id);
        self.announce();

        loop {
            tokio::select! {
                command = inputs.commands.recv() => match command {
                    Some(SessionCommand::Leave { reply }) => {
                        self.leave();
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        info!("Coordinator dropped, leaving room {}", self.room_id);
                        self.leave();
                        break;
                    }
                },

                Some(signal) = inputs.signals.recv() => self.handle_signal(signal).await,

                Some(event) = inputs.link_events.recv() => self.handle_link_event(event),

                media = inputs.media_events.recv() => match media {
                    Ok(event) => self.handle_media_event(event).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Missed {} local media events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {}
                },

                Ok(event) = inputs.transport_events.recv() => self.handle_transport_event(event),
            }
        }

        info!("Session {} in room {} finished", self.local.id, self.room_id);
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events_tx.send(event);
    }

    fn send(&self, event: SignalEvent) {
        if let Err(e) = self.transport.emit(&event) {
            error!("Failed to encode {}: {}", event.name(), e);
        }
    }

    fn announce(&self) {
        self.send(SignalEvent::JoinRoom {
            room_id: self.room_id.clone(),
            participant_id: self.local.id.clone(),
            display_name: self.local.name.clone(),
            role: self.local.role,
        });
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::SetMedia {
                kind,
                enabled,
                reply,
            } => {
                let result = match enabled {
                    Some(enabled) => self.media.set_enabled(kind, enabled),
                    None => self.media.toggle(kind),
                };
                let _ = reply.send(result);
            }

            SessionCommand::StartScreenShare { reply } => {
                let result = match self.media.start_screen_share().await {
                    Ok(screen) => {
                        let report = self.fan_out(screen).await;
                        self.emit(SessionEvent::ScreenShareChanged { active: true });
                        Ok(report)
                    }
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }

            SessionCommand::StopScreenShare { reply } => {
                let _ = reply.send(self.stop_screen_share().await);
            }

            SessionCommand::RaiseHand { raised, reply } => {
                self.local_flags.hand_raised = raised;
                let event = SignalEvent::HandRaise {
                    room_id: self.room_id.clone(),
                    from: self.local.id.clone(),
                    is_raised: raised,
                };
                let _ = reply.send(self.transport.emit(&event).map(|_| ()));
            }

            SessionCommand::SendChat { text, reply } => {
                let timestamp = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_millis() as u64)
                    .unwrap_or_default();
                let event = SignalEvent::ChatMessage {
                    room_id: self.room_id.clone(),
                    from: self.local.id.clone(),
                    text,
                    timestamp,
                };
                let _ = reply.send(self.transport.emit(&event).map(|_| ()));
            }

            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }

            SessionCommand::Leave { reply } => {
                // Handled by `run`.
                let _ = reply.send(());
            }
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            local: self.local_flags,
            participants: self.roster.snapshot(),
            peer_states: self
                .links
                .iter()
                .map(|(id, link)| (id.clone(), link.state()))
                .collect(),
            remote_streams: self.remote_tracks.clone(),
        }
    }

    async fn stop_screen_share(&mut self) -> Result<FanoutReport> {
        let Some(camera) = self.media.stop_screen_share().await? else {
            return Ok(FanoutReport::default());
        };
        let report = self.fan_out(camera).await;
        self.emit(SessionEvent::ScreenShareChanged { active: false });
        Ok(report)
    }

    /// Replaces the outbound track on every open link, concurrently. Each link
    /// gets one retry; links are not rolled back when another one fails.
    async fn fan_out(&self, track: Arc<LocalTrack>) -> FanoutReport {
        let attempts = self
            .links
            .values()
            .filter(|link| !link.state().is_closed())
            .map(|link| {
                let track = track.clone();
                async move {
                    let mut result = link.replace_track(track.clone()).await;
                    if matches!(&result, Err(e) if !matches!(e, Error::LinkClosed)) {
                        debug!("Retrying track replacement towards {}", link.remote());
                        result = link.replace_track(track).await;
                    }
                    (link.remote().clone(), result)
                }
            });

        let mut report = FanoutReport::default();
        for (participant, result) in join_all(attempts).await {
            match result {
                Ok(()) => report.replaced.push(participant),
                Err(e) => {
                    warn!("Track replacement towards {} failed: {}", participant, e);
                    self.emit(SessionEvent::PeerError {
                        participant: participant.clone(),
                        error: e.clone(),
                    });
                    report.failed.push((participant, e));
                }
            }
        }
        info!(
            "{:?} track swapped on {} links ({} failed)",
            track.source(),
            report.replaced.len(),
            report.failed.len()
        );
        report
    }

    async fn handle_signal(&mut self, signal: SignalEvent) {
        if signal.room_id().is_some_and(|room| *room != self.room_id) {
            debug!("Ignoring {} for another room", signal.name());
            return;
        }
        if signal.target().is_some_and(|to| *to != self.local.id) {
            debug!("Ignoring {} addressed to someone else", signal.name());
            return;
        }

        match signal {
            SignalEvent::ParticipantsList(list) => self.on_participants_list(list),

            SignalEvent::ParticipantJoined(joined) => {
                if joined.id == self.local.id {
                    return;
                }
                let initiate = *joined.initiator() == self.local.id;
                let info = joined.info();
                info!("{} joined room {}", info.id, self.room_id);
                if self.roster.insert(info.clone()) {
                    self.emit(SessionEvent::ParticipantJoined(info.clone()));
                }
                self.open_link(&info.id, initiate);
            }

            SignalEvent::ParticipantLeft { id } => {
                info!("{} left room {}", id, self.room_id);
                self.remove_participant(&id);
            }

            SignalEvent::WebrtcOffer { from, offer, .. } => self.on_offer(from, offer),

            SignalEvent::WebrtcAnswer { from, answer, .. } => match self.links.get(&from) {
                Some(link) => drop(link.accept_answer(answer)),
                None => warn!("Answer from {} without a link", from),
            },

            SignalEvent::WebrtcIceCandidate {
                from, candidate, ..
            } => match self.links.get(&from) {
                Some(link) => drop(link.add_remote_ice_candidate(candidate)),
                None => {
                    debug!("Holding candidate from {} until its link exists", from);
                    self.orphan_candidates
                        .entry(from)
                        .or_default()
                        .push(candidate);
                }
            },

            SignalEvent::ChatMessage {
                from,
                text,
                timestamp,
                ..
            } => {
                self.emit(SessionEvent::Chat(ChatMessage {
                    from,
                    text,
                    timestamp,
                }));
            }

            SignalEvent::HandRaise {
                from, is_raised, ..
            } => {
                self.roster.set_hand_raised(&from, is_raised);
                self.emit(SessionEvent::HandRaised {
                    participant: from,
                    raised: is_raised,
                });
            }

            SignalEvent::JoinRoom { .. } | SignalEvent::LeaveRoom { .. } => {
                debug!("Ignoring client-to-relay event");
            }
        }
    }

    /// The first list completes `join`; a later one (after signaling came
    /// back) replaces every link, since the others saw us leave.
    fn on_participants_list(&mut self, list: Vec<ParticipantInfo>) {
        let members: Vec<ParticipantInfo> = list
            .into_iter()
            .filter(|info| info.id != self.local.id)
            .collect();

        let first = self.joined_tx.is_some();
        if !first {
            info!("Rejoined room {} with {} members", self.room_id, members.len());
            for id in self.roster.ids() {
                if !members.iter().any(|m| m.id == id) {
                    self.remove_participant(&id);
                }
            }
        }

        for info in &members {
            if self.roster.insert(info.clone()) && !first {
                self.emit(SessionEvent::ParticipantJoined(info.clone()));
            }
            self.open_link(&info.id, true);
        }

        if let Some(joined_tx) = self.joined_tx.take() {
            info!(
                "Joined room {} with {} members",
                self.room_id,
                members.len()
            );
            self.emit(SessionEvent::Joined {
                room_id: self.room_id.clone(),
                participants: members.clone(),
            });
            let _ = joined_tx.send(members);
        }
    }

    fn on_offer(&mut self, from: ParticipantId, offer: SessionDescription) {
        if !self.roster.contains(&from) {
            warn!("Offer from {} before it was announced", from);
            let info = ParticipantInfo::new(from.clone(), from.to_string(), Default::default());
            self.roster.insert(info.clone());
            self.emit(SessionEvent::ParticipantJoined(info));
        }

        let state = self.links.get(&from).map(|link| link.state());
        match state {
            Some(LinkState::New | LinkState::Negotiating) => {}
            // The remote rebuilt its side; start over as the answering side.
            _ => self.open_link(&from, false),
        }
        if let Some(link) = self.links.get(&from) {
            drop(link.accept_offer(offer));
        }
    }

    /// Creates a fresh link to `remote`, closing any previous one.
    fn open_link(&mut self, remote: &ParticipantId, initiate: bool) {
        if let Some(previous) = self.links.remove(remote) {
            debug!("Replacing link #{} to {}", previous.id(), remote);
            previous.close();
        }
        self.drop_remote_stream(remote);

        let link = PeerLink::spawn(&self.link_ctx, remote.clone(), self.media.outbound_tracks());
        if initiate {
            drop(link.initiate());
        }
        if let Some(candidates) = self.orphan_candidates.remove(remote) {
            for candidate in candidates {
                drop(link.add_remote_ice_candidate(candidate));
            }
        }

        self.roster.set_connection(remote, LinkState::New);
        self.links.insert(remote.clone(), link);
    }

    fn remove_participant(&mut self, id: &ParticipantId) {
        if let Some(link) = self.links.remove(id) {
            link.close();
        }
        self.drop_remote_stream(id);
        self.orphan_candidates.remove(id);
        self.rebuilds.remove(id);
        if self.roster.remove(id).is_some() {
            self.emit(SessionEvent::ParticipantLeft(id.clone()));
        }
    }

    fn drop_remote_stream(&mut self, id: &ParticipantId) {
        if self.remote_tracks.remove(id).is_some() {
            self.emit(SessionEvent::RemoteStreamRemoved {
                participant: id.clone(),
            });
        }
    }

    fn handle_link_event(&mut self, event: LinkEvent) {
        let current = self.links.get(&event.remote).map(|link| link.id());
        if current != Some(event.link_id) {
            debug!("Dropping event from replaced link #{}", event.link_id);
            return;
        }
        let participant = event.remote;

        match event.kind {
            LinkEventKind::StateChanged(state) => {
                self.roster.set_connection(&participant, state);
                self.emit(SessionEvent::PeerStateChanged {
                    participant: participant.clone(),
                    state,
                });
                match state {
                    LinkState::Connected => {
                        self.rebuilds.remove(&participant);
                    }
                    LinkState::Failed => self.on_link_failed(&participant),
                    _ => {}
                }
            }

            LinkEventKind::RemoteTrack(track) => {
                info!("Remote {:?} track from {}", track.kind, participant);
                self.remote_tracks
                    .entry(participant.clone())
                    .or_default()
                    .push(track.clone());
                self.emit(SessionEvent::RemoteTrackAdded { participant, track });
            }

            LinkEventKind::Error(error) => {
                self.emit(SessionEvent::PeerError { participant, error });
            }

            LinkEventKind::Glare { yielded } => {
                info!(
                    "Glare with {} resolved ({})",
                    participant,
                    if yielded { "we answer" } else { "they answer" }
                );
                self.emit(SessionEvent::GlareResolved {
                    participant,
                    yielded,
                });
            }
        }
    }

    /// Rebuilds a failed link up to `negotiation_retries` times. The smaller
    /// id offers again, the larger waits for it.
    fn on_link_failed(&mut self, participant: &ParticipantId) {
        let used = self.rebuilds.get(participant).copied().unwrap_or(0);
        if used >= self.config.peer.negotiation_retries {
            warn!("Giving up on {} after {} rebuilds", participant, used);
            self.emit(SessionEvent::PeerFailed {
                participant: participant.clone(),
            });
            return;
        }

        self.rebuilds.insert(participant.clone(), used + 1);
        let initiate = self.local.id < *participant;
        info!(
            "Rebuilding link to {} (attempt {}, {})",
            participant,
            used + 1,
            if initiate { "offering" } else { "waiting" }
        );
        self.open_link(participant, initiate);
    }

    async fn handle_media_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::TrackEnabled { kind, enabled } => {
                match kind {
                    MediaKind::Audio => self.local_flags.audio_on = enabled,
                    MediaKind::Video => self.local_flags.video_on = enabled,
                }
                self.emit(SessionEvent::LocalMediaChanged { kind, enabled });
            }
            MediaEvent::ScreenShareEnded { track_id } => {
                info!("Screen share {} ended outside the session", track_id);
                if let Err(e) = self.stop_screen_share().await {
                    warn!("Could not restore the camera: {}", e);
                }
            }
        }
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            // Every new socket starts without room membership on the relay.
            TransportEvent::Connected { resumed, .. } => {
                info!(
                    "Signaling {}, re-announcing in room {}",
                    if resumed { "resumed" } else { "reconnected" },
                    self.room_id
                );
                self.announce();
            }
            TransportEvent::Error(reason) => debug!("Signaling hiccup: {}", reason),
            TransportEvent::Disconnected => {
                warn!("Signaling lost for room {}", self.room_id);
                self.emit(SessionEvent::TransportLost);
            }
        }
    }

    fn leave(&mut self) {
        for (_, link) in self.links.drain() {
            link.close();
        }
        self.send(SignalEvent::LeaveRoom {
            room_id: self.room_id.clone(),
            participant_id: self.local.id.clone(),
        });
        for (event, id) in self.subscriptions.drain(..) {
            self.transport.unsubscribe(event, id);
        }
        self.media.release();
        self.roster.clear();
        self.remote_tracks.clear();
        self.orphan_candidates.clear();

        info!("Left room {}", self.room_id);
        self.emit(SessionEvent::Left {
            room_id: self.room_id.clone(),
        });
    }
}
