use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::media::{LocalMediaSource, LocalStream, MediaKind};
use crate::peer::{LinkContext, LinkState, PeerConnectionFactory, RemoteTrack};
use crate::session::roster::Participant;
use crate::session::session_actor::{SessionActor, SessionInputs};
use crate::session::session_command::{SessionCommand, SessionSnapshot};
use crate::session::session_event::{FanoutReport, SessionEvent};
use crate::signaling::SignalingOutput;
use crate::transport::{Credential, SignalingTransport};
use classmesh_core::{
    MediaFlags, ParticipantId, ParticipantInfo, RoomId, SignalEvent, event_names,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

const EVENT_CAPACITY: usize = 256;

struct ActiveSession {
    room_id: RoomId,
    local: ParticipantId,
    commands: mpsc::UnboundedSender<SessionCommand>,
    task: JoinHandle<()>,
}

/// Per-room controller: joins through the signaling transport, keeps one
/// peer link per remote participant and fans local media changes out to
/// all of them.
///
/// The transport, media source and connection factory are injected and may
/// outlive the session.
pub struct SessionCoordinator {
    transport: SignalingTransport,
    media: Arc<LocalMediaSource>,
    factory: Arc<dyn PeerConnectionFactory>,
    credential: Credential,
    config: SessionConfig,
    events_tx: broadcast::Sender<SessionEvent>,
    active: Mutex<Option<ActiveSession>>,
    join_lock: tokio::sync::Mutex<()>,
}

impl SessionCoordinator {
    pub fn new(
        transport: SignalingTransport,
        media: Arc<LocalMediaSource>,
        factory: Arc<dyn PeerConnectionFactory>,
        credential: Credential,
        config: SessionConfig,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            transport,
            media,
            factory,
            credential,
            config,
            events_tx,
            active: Mutex::new(None),
            join_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn room_id(&self) -> Option<RoomId> {
        self.lock_active().as_ref().map(|s| s.room_id.clone())
    }

    pub fn local_id(&self) -> Option<ParticipantId> {
        self.lock_active().as_ref().map(|s| s.local.clone())
    }

    pub fn is_joined(&self) -> bool {
        self.lock_active().is_some()
    }

    /// Acquires local media, connects the transport, announces presence and
    /// returns the members already in the room, to each of which a link is
    /// being initiated.
    ///
    /// Media failure aborts before anything is sent. If no roster arrives
    /// within the configured timeout the join fails with `Timeout` and local
    /// media is released.
    pub async fn join(
        &self,
        room_id: RoomId,
        local: ParticipantInfo,
    ) -> Result<Vec<ParticipantInfo>> {
        let _join = self.join_lock.lock().await;
        if let Some(active) = self.lock_active().as_ref() {
            return Err(Error::AlreadyJoined(active.room_id.clone()));
        }

        info!("{} joining room {}", local.id, room_id);
        if let Err(e) = self.media.acquire(self.config.media).await {
            if e.is_media_error() {
                warn!("{} cannot join {} without local media: {}", local.id, room_id, e);
            }
            return Err(e);
        }

        if let Err(e) = self.transport.connect(self.credential.clone()).await {
            warn!("Cannot reach signaling for room {}: {}", room_id, e);
            self.media.release();
            return Err(e);
        }

        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let subscriptions = event_names::INCOMING
            .iter()
            .map(|&name| {
                let signals_tx = signals_tx.clone();
                let id = self.transport.subscribe(name, move |payload| {
                    let signal = SignalEvent::from_parts(name, payload)?;
                    signals_tx
                        .send(signal)
                        .map_err(|_| anyhow::anyhow!("session is no longer running"))?;
                    Ok(())
                });
                (name, id)
            })
            .collect();

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (link_events_tx, link_events_rx) = mpsc::unbounded_channel();
        let (joined_tx, joined_rx) = oneshot::channel();

        let link_ctx = LinkContext {
            local: local.id.clone(),
            room_id: room_id.clone(),
            factory: self.factory.clone(),
            signaling: Arc::new(self.transport.clone()) as Arc<dyn SignalingOutput>,
            events: link_events_tx,
        };
        let inputs = SessionInputs {
            commands: commands_rx,
            signals: signals_rx,
            link_events: link_events_rx,
            media_events: self.media.events(),
            transport_events: self.transport.events(),
        };
        let actor = SessionActor::new(
            room_id.clone(),
            local.clone(),
            self.config.clone(),
            self.transport.clone(),
            self.media.clone(),
            link_ctx,
            subscriptions,
            self.events_tx.clone(),
            joined_tx,
        );
        let task = tokio::spawn(actor.run(inputs));

        let members = match tokio::time::timeout(self.config.join_timeout(), joined_rx).await {
            Ok(Ok(members)) => members,
            outcome => {
                let (reply_tx, reply_rx) = oneshot::channel();
                if commands_tx.send(SessionCommand::Leave { reply: reply_tx }).is_ok() {
                    let _ = reply_rx.await;
                }
                let _ = task.await;
                return Err(match outcome {
                    Err(_) => {
                        warn!("No roster for room {} in time", room_id);
                        Error::Timeout(format!("joining room {}", room_id))
                    }
                    Ok(_) => Error::Disconnected,
                });
            }
        };

        *self.lock_active() = Some(ActiveSession {
            room_id,
            local: local.id,
            commands: commands_tx,
            task,
        });
        Ok(members)
    }

    /// Closes every link, announces departure and releases local media. The
    /// transport stays connected.
    pub async fn leave(&self) -> Result<()> {
        let active = self.lock_active().take().ok_or(Error::NotJoined)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        if active
            .commands
            .send(SessionCommand::Leave { reply: reply_tx })
            .is_ok()
        {
            let _ = reply_rx.await;
        }
        let _ = active.task.await;
        Ok(())
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand) -> Result<T> {
        let commands = self
            .lock_active()
            .as_ref()
            .map(|s| s.commands.clone())
            .ok_or(Error::NotJoined)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        commands
            .send(command(reply_tx))
            .map_err(|_| Error::NotJoined)?;
        reply_rx.await.map_err(|_| Error::NotJoined)
    }

    async fn set_media(&self, kind: MediaKind, enabled: Option<bool>) -> Result<bool> {
        self.request(|reply| SessionCommand::SetMedia {
            kind,
            enabled,
            reply,
        })
        .await?
    }

    /// Mutes or unmutes the camera (or the shared screen). No signaling is sent.
    pub async fn set_local_video(&self, enabled: bool) -> Result<bool> {
        self.set_media(MediaKind::Video, Some(enabled)).await
    }

    pub async fn set_local_audio(&self, enabled: bool) -> Result<bool> {
        self.set_media(MediaKind::Audio, Some(enabled)).await
    }

    pub async fn toggle_video(&self) -> Result<bool> {
        self.set_media(MediaKind::Video, None).await
    }

    pub async fn toggle_audio(&self) -> Result<bool> {
        self.set_media(MediaKind::Audio, None).await
    }

    /// Shares the screen on every link by track replacement.
    pub async fn start_screen_share(&self) -> Result<FanoutReport> {
        self.request(|reply| SessionCommand::StartScreenShare { reply })
            .await?
    }

    pub async fn stop_screen_share(&self) -> Result<FanoutReport> {
        self.request(|reply| SessionCommand::StopScreenShare { reply })
            .await?
    }

    pub async fn raise_hand(&self, raised: bool) -> Result<()> {
        self.request(|reply| SessionCommand::RaiseHand { raised, reply })
            .await?
    }

    pub async fn send_chat(&self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        self.request(|reply| SessionCommand::SendChat { text, reply })
            .await?
    }

    async fn snapshot(&self) -> SessionSnapshot {
        self.request(|reply| SessionCommand::Snapshot { reply })
            .await
            .unwrap_or_default()
    }

    /// Remote members; empty when not joined.
    pub async fn participants(&self) -> Vec<Participant> {
        self.snapshot().await.participants
    }

    pub async fn peer_states(&self) -> HashMap<ParticipantId, LinkState> {
        self.snapshot().await.peer_states
    }

    pub async fn remote_streams(&self) -> HashMap<ParticipantId, Vec<RemoteTrack>> {
        self.snapshot().await.remote_streams
    }

    pub async fn local_flags(&self) -> MediaFlags {
        self.snapshot().await.local
    }

    pub fn local_stream(&self) -> LocalStream {
        self.media.local_stream()
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        // Dropping the command sender makes the actor leave.
        self.lock_active().take();
    }
}
