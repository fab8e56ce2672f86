use crate::error::{Error, Result};
use crate::media::{LocalTrack, MediaKind};
use crate::peer::connection::{
    ConnectionEvent, PeerConnection, PeerConnectionFactory, PeerConnectionState,
};
use crate::peer::link_event::{LinkEvent, LinkEventKind, LinkState};
use crate::signaling::{Route, SignalingOutput};
use classmesh_core::{IceCandidate, ParticipantId, RoomId, SessionDescription};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

static NEXT_LINK_ID: AtomicU64 = AtomicU64::new(1);

/// Everything a link needs from the session that owns it.
#[derive(Clone)]
pub struct LinkContext {
    pub local: ParticipantId,
    pub room_id: RoomId,
    pub factory: Arc<dyn PeerConnectionFactory>,
    pub signaling: Arc<dyn SignalingOutput>,
    pub events: mpsc::UnboundedSender<LinkEvent>,
}

type Reply = oneshot::Sender<Result<()>>;

enum LinkCommand {
    Initiate(Reply),
    AcceptOffer(SessionDescription, Reply),
    AcceptAnswer(SessionDescription, Reply),
    RemoteCandidate(IceCandidate, Reply),
    ReplaceTrack(Arc<LocalTrack>, Reply),
}

/// Completion of a queued link operation. Dropping it does not cancel the
/// operation; a link closed before the operation ran resolves to
/// `Error::LinkClosed`.
pub struct Pending(oneshot::Receiver<Result<()>>);

impl Future for Pending {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0)
            .poll(cx)
            .map(|reply| reply.unwrap_or(Err(Error::LinkClosed)))
    }
}

/// Connection to one remote participant.
///
/// Operations are queued and executed one at a time by the link's own task,
/// so descriptions and candidates are applied in the order they were
/// submitted. Remote candidates that arrive before the remote description
/// are buffered and applied, in arrival order, right after it is set.
pub struct PeerLink {
    id: u64,
    local: ParticipantId,
    remote: ParticipantId,
    commands: mpsc::UnboundedSender<LinkCommand>,
    state: Arc<watch::Sender<LinkState>>,
}

impl PeerLink {
    /// Starts a link in `New`. `tracks` become its outbound senders.
    pub fn spawn(ctx: &LinkContext, remote: ParticipantId, tracks: Vec<Arc<LocalTrack>>) -> Self {
        let id = NEXT_LINK_ID.fetch_add(1, Ordering::Relaxed);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(LinkState::New);
        let state = Arc::new(state_tx);

        debug!("Spawning link #{} {} -> {}", id, ctx.local, remote);
        tokio::spawn(run_link(
            ctx.clone(),
            id,
            remote.clone(),
            tracks,
            commands_rx,
            state.clone(),
        ));

        Self {
            id,
            local: ctx.local.clone(),
            remote,
            commands: commands_tx,
            state,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn local(&self) -> &ParticipantId {
        &self.local
    }

    pub fn remote(&self) -> &ParticipantId {
        &self.remote
    }

    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    /// Waits until the link reaches `target`. Fails with `LinkClosed` if the
    /// link closes first.
    pub async fn wait_for_state(&self, target: LinkState) -> Result<()> {
        let mut rx = self.state.subscribe();
        let reached = rx
            .wait_for(|s| *s == target || s.is_closed())
            .await
            .map(|s| *s);
        match reached {
            Ok(state) if state == target => Ok(()),
            _ => Err(Error::LinkClosed),
        }
    }

    /// Creates and sends an offer. Valid only from `New`.
    pub fn initiate(&self) -> Pending {
        self.submit(LinkCommand::Initiate)
    }

    /// Answers `offer`. Valid from `New` and `Negotiating`. When both sides
    /// offered at once the larger id yields; an offer arriving after the
    /// exchange progressed means the remote started over, and the link
    /// answers it on a fresh connection.
    pub fn accept_offer(&self, offer: SessionDescription) -> Pending {
        self.submit(|reply| LinkCommand::AcceptOffer(offer, reply))
    }

    /// Valid only on the offering side while `Negotiating`.
    pub fn accept_answer(&self, answer: SessionDescription) -> Pending {
        self.submit(|reply| LinkCommand::AcceptAnswer(answer, reply))
    }

    pub fn add_remote_ice_candidate(&self, candidate: IceCandidate) -> Pending {
        self.submit(|reply| LinkCommand::RemoteCandidate(candidate, reply))
    }

    /// Swaps the outbound track of the same kind without renegotiating.
    pub fn replace_track(&self, track: Arc<LocalTrack>) -> Pending {
        self.submit(|reply| LinkCommand::ReplaceTrack(track, reply))
    }

    /// Closes the link. In-flight operations are abandoned. Idempotent.
    pub fn close(&self) {
        let changed = self.state.send_if_modified(|state| {
            if state.is_closed() {
                return false;
            }
            *state = LinkState::Closed;
            true
        });
        if changed {
            info!("Closing link to {}", self.remote);
        }
    }

    fn submit(&self, command: impl FnOnce(Reply) -> LinkCommand) -> Pending {
        let (reply_tx, reply_rx) = oneshot::channel();
        // A stopped worker drops the command and with it the reply sender.
        let _ = self.commands.send(command(reply_tx));
        Pending(reply_rx)
    }
}

async fn closed(state: &watch::Sender<LinkState>) {
    let mut rx = state.subscribe();
    let _ = rx.wait_for(|s| s.is_closed()).await;
}

type Opened = (Arc<dyn PeerConnection>, mpsc::UnboundedReceiver<ConnectionEvent>);

async fn open_connection(
    factory: &dyn PeerConnectionFactory,
    remote: &ParticipantId,
    tracks: &BTreeMap<MediaKind, Arc<LocalTrack>>,
) -> Result<Opened> {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let pc = factory.create(remote, events_tx).await?;

    for track in tracks.values() {
        if let Err(e) = pc.attach_track(track.clone()).await {
            let _ = pc.close().await;
            return Err(e);
        }
    }
    Ok((pc, events_rx))
}

async fn run_link(
    ctx: LinkContext,
    link_id: u64,
    remote: ParticipantId,
    tracks: Vec<Arc<LocalTrack>>,
    commands: mpsc::UnboundedReceiver<LinkCommand>,
    state: Arc<watch::Sender<LinkState>>,
) {
    let tracks: BTreeMap<_, _> = tracks.into_iter().map(|t| (t.kind(), t)).collect();

    let opened = tokio::select! {
        biased;
        _ = closed(&state) => return,
        opened = open_connection(ctx.factory.as_ref(), &remote, &tracks) => opened,
    };

    let route = Route {
        room_id: ctx.room_id.clone(),
        from: ctx.local.clone(),
        to: remote,
    };

    match opened {
        Ok((pc, pc_events)) => {
            let worker = LinkWorker {
                ctx,
                link_id,
                route,
                state,
                commands,
                tracks,
                pc,
                pc_events,
                offered: false,
                remote_set: false,
                stale_candidates: false,
                pending_candidates: Vec::new(),
            };
            worker.run().await;
        }
        Err(e) => {
            warn!("Cannot create peer connection to {}: {}", route.to, e);
            let failed = state.send_if_modified(|s| {
                if s.is_closed() {
                    return false;
                }
                *s = LinkState::Failed;
                true
            });
            let event = |kind| LinkEvent {
                remote: route.to.clone(),
                link_id,
                kind,
            };
            let _ = ctx.events.send(event(LinkEventKind::Error(e)));
            if failed {
                let _ = ctx
                    .events
                    .send(event(LinkEventKind::StateChanged(LinkState::Failed)));
            }
        }
    }
}

struct LinkWorker {
    ctx: LinkContext,
    link_id: u64,
    route: Route,
    state: Arc<watch::Sender<LinkState>>,
    commands: mpsc::UnboundedReceiver<LinkCommand>,
    tracks: BTreeMap<MediaKind, Arc<LocalTrack>>,
    pc: Arc<dyn PeerConnection>,
    pc_events: mpsc::UnboundedReceiver<ConnectionEvent>,
    /// Our offer is outstanding or was answered.
    offered: bool,
    remote_set: bool,
    /// Set while glare has us waiting for the answer to our kept offer.
    stale_candidates: bool,
    pending_candidates: Vec<IceCandidate>,
}

impl LinkWorker {
    async fn run(mut self) {
        let state = self.state.clone();

        loop {
            tokio::select! {
                biased;
                _ = closed(&state) => break,

                command = self.commands.recv() => {
                    let Some(command) = command else { break };
                    tokio::select! {
                        biased;
                        _ = closed(&state) => break,
                        _ = self.handle_command(command) => {}
                    }
                }

                Some(event) = self.pc_events.recv() => {
                    self.handle_connection_event(event).await;
                }
            }
        }

        self.shutdown().await;
    }

    async fn handle_command(&mut self, command: LinkCommand) {
        let (result, reply, report) = match command {
            LinkCommand::Initiate(reply) => (self.initiate().await, reply, true),
            LinkCommand::AcceptOffer(offer, reply) => (self.accept_offer(offer).await, reply, true),
            LinkCommand::AcceptAnswer(answer, reply) => {
                (self.accept_answer(answer).await, reply, true)
            }
            LinkCommand::RemoteCandidate(candidate, reply) => {
                (self.add_remote_candidate(candidate).await, reply, true)
            }
            // Fan-out reports its own failures.
            LinkCommand::ReplaceTrack(track, reply) => {
                (self.replace_track(track).await, reply, false)
            }
        };

        if let Err(e) = &result {
            warn!("Link to {}: {}", self.route.to, e);
            if matches!(e, Error::Negotiation { .. }) {
                self.transition(LinkState::Failed);
            }
            if report {
                self.emit(LinkEventKind::Error(e.clone()));
            }
        }
        let _ = reply.send(result);
    }

    async fn initiate(&mut self) -> Result<()> {
        self.expect_state("initiate", LinkState::New)?;

        let offer = self
            .pc
            .create_offer()
            .await
            .map_err(|e| self.negotiation_error(e))?;
        self.offered = true;
        self.transition(LinkState::Negotiating);

        info!("Sending offer to {}", self.route.to);
        self.ctx.signaling.send_offer(&self.route, offer).await;
        Ok(())
    }

    async fn accept_offer(&mut self, offer: SessionDescription) -> Result<()> {
        match self.current() {
            LinkState::New => {}
            LinkState::Negotiating if self.offered && !self.remote_set => {
                if self.route.from > self.route.to {
                    info!("Glare with {}: dropping our offer", self.route.to);
                    self.emit(LinkEventKind::Glare { yielded: true });
                    self.rebuild().await.map_err(|e| self.negotiation_error(e))?;
                } else {
                    info!("Glare with {}: keeping our offer", self.route.to);
                    self.emit(LinkEventKind::Glare { yielded: false });
                    // Whatever the peer sends before its answer belongs to
                    // the connection it is discarding.
                    self.pending_candidates.clear();
                    self.stale_candidates = true;
                    return Ok(());
                }
            }
            LinkState::Negotiating => {
                // The remote gave up on the exchange in progress and started over.
                info!("{} restarted negotiation", self.route.to);
                self.rebuild().await.map_err(|e| self.negotiation_error(e))?;
            }
            state => {
                return Err(Error::InvalidState {
                    operation: "accept_offer",
                    state,
                });
            }
        }

        self.apply_remote(offer).await?;
        let answer = self
            .pc
            .create_answer()
            .await
            .map_err(|e| self.negotiation_error(e))?;
        self.transition(LinkState::Negotiating);

        info!("Sending answer to {}", self.route.to);
        self.ctx.signaling.send_answer(&self.route, answer).await;
        Ok(())
    }

    async fn accept_answer(&mut self, answer: SessionDescription) -> Result<()> {
        let state = self.current();
        if state != LinkState::Negotiating || !self.offered || self.remote_set {
            return Err(Error::InvalidState {
                operation: "accept_answer",
                state,
            });
        }
        self.apply_remote(answer).await
    }

    async fn add_remote_candidate(&mut self, candidate: IceCandidate) -> Result<()> {
        if !self.remote_set {
            if self.stale_candidates {
                debug!("Dropping candidate from {}'s abandoned offer", self.route.to);
                return Ok(());
            }
            self.pending_candidates.push(candidate);
            debug!(
                "Buffered candidate from {} ({} waiting)",
                self.route.to,
                self.pending_candidates.len()
            );
            return Ok(());
        }
        self.pc.add_ice_candidate(candidate).await
    }

    async fn replace_track(&mut self, track: Arc<LocalTrack>) -> Result<()> {
        let kind = track.kind();
        self.tracks.insert(kind, track.clone());
        self.pc.replace_track(kind, track).await
    }

    async fn apply_remote(&mut self, description: SessionDescription) -> Result<()> {
        self.pc
            .set_remote_description(description)
            .await
            .map_err(|e| self.negotiation_error(e))?;
        self.remote_set = true;
        self.stale_candidates = false;

        let buffered = std::mem::take(&mut self.pending_candidates);
        if !buffered.is_empty() {
            debug!(
                "Applying {} buffered candidates from {}",
                buffered.len(),
                self.route.to
            );
        }
        for candidate in buffered {
            if let Err(e) = self.pc.add_ice_candidate(candidate).await {
                warn!("Buffered candidate from {} rejected: {}", self.route.to, e);
            }
        }
        Ok(())
    }

    /// Replaces the underlying connection, keeping tracks and buffered candidates.
    async fn rebuild(&mut self) -> Result<()> {
        let _ = self.pc.close().await;
        let (pc, pc_events) =
            open_connection(self.ctx.factory.as_ref(), &self.route.to, &self.tracks).await?;
        self.pc = pc;
        self.pc_events = pc_events;
        self.offered = false;
        self.remote_set = false;
        Ok(())
    }

    async fn handle_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::LocalCandidate(candidate) => {
                self.ctx.signaling.send_ice(&self.route, candidate).await;
            }
            ConnectionEvent::StateChanged(PeerConnectionState::Connected) => {
                if self.current() == LinkState::Negotiating {
                    self.transition(LinkState::Connected);
                }
            }
            ConnectionEvent::StateChanged(PeerConnectionState::Failed) => {
                if matches!(self.current(), LinkState::Negotiating | LinkState::Connected) {
                    warn!("ICE with {} failed", self.route.to);
                    self.transition(LinkState::Failed);
                }
            }
            ConnectionEvent::StateChanged(other) => {
                debug!("Connection to {} is {:?}", self.route.to, other);
            }
            ConnectionEvent::RemoteTrack(track) => {
                self.emit(LinkEventKind::RemoteTrack(track));
            }
        }
    }

    async fn shutdown(self) {
        self.state.send_if_modified(|s| {
            if s.is_closed() {
                return false;
            }
            *s = LinkState::Closed;
            true
        });
        if let Err(e) = self.pc.close().await {
            debug!("Closing connection to {}: {}", self.route.to, e);
        }
        self.emit(LinkEventKind::StateChanged(LinkState::Closed));
        debug!("Link #{} to {} stopped", self.link_id, self.route.to);
    }

    fn current(&self) -> LinkState {
        *self.state.borrow()
    }

    fn expect_state(&self, operation: &'static str, expected: LinkState) -> Result<()> {
        let state = self.current();
        if state != expected {
            return Err(Error::InvalidState { operation, state });
        }
        Ok(())
    }

    fn negotiation_error(&self, e: Error) -> Error {
        Error::Negotiation {
            peer: self.route.to.clone(),
            reason: e.to_string(),
        }
    }

    fn transition(&self, next: LinkState) -> bool {
        let changed = self.state.send_if_modified(|s| {
            if s.is_closed() || *s == next {
                return false;
            }
            *s = next;
            true
        });
        if changed {
            debug!("Link to {} is {:?}", self.route.to, next);
            self.emit(LinkEventKind::StateChanged(next));
        }
        changed
    }

    fn emit(&self, kind: LinkEventKind) {
        let _ = self.ctx.events.send(LinkEvent {
            remote: self.route.to.clone(),
            link_id: self.link_id,
            kind,
        });
    }
}
