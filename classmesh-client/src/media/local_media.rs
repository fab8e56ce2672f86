use crate::config::MediaConstraints;
use crate::error::{Error, Result};
use crate::media::devices::MediaDevices;
use crate::media::track::{LocalTrack, MediaKind, TrackSource};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    TrackEnabled { kind: MediaKind, enabled: bool },
    /// The display track ended without `stop_screen_share` being called.
    ScreenShareEnded { track_id: String },
}

/// Snapshot of what this participant currently sends.
#[derive(Debug, Clone, Default)]
pub struct LocalStream {
    pub audio: Option<Arc<LocalTrack>>,
    pub video: Option<Arc<LocalTrack>>,
    pub screen_sharing: bool,
}

#[derive(Default)]
struct Tracks {
    audio: Option<Arc<LocalTrack>>,
    camera: Option<Arc<LocalTrack>>,
    screen: Option<Arc<LocalTrack>>,
    screen_watcher: Option<JoinHandle<()>>,
}

impl Tracks {
    fn outbound(&self, kind: MediaKind) -> Option<Arc<LocalTrack>> {
        match kind {
            MediaKind::Audio => self.audio.clone(),
            MediaKind::Video => self.screen.clone().or_else(|| self.camera.clone()),
        }
    }

    fn unwatch_screen(&mut self) {
        if let Some(watcher) = self.screen_watcher.take() {
            watcher.abort();
        }
    }
}

/// Owns the local camera, microphone and screen-capture tracks. At most one
/// track per source is live; the outbound video track is the screen while
/// sharing, the camera otherwise.
pub struct LocalMediaSource {
    devices: Arc<dyn MediaDevices>,
    tracks: Mutex<Tracks>,
    events_tx: broadcast::Sender<MediaEvent>,
}

impl LocalMediaSource {
    pub fn new(devices: Arc<dyn MediaDevices>) -> Self {
        let (events_tx, _) = broadcast::channel(32);
        Self {
            devices,
            tracks: Mutex::new(Tracks::default()),
            events_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tracks> {
        self.tracks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> broadcast::Receiver<MediaEvent> {
        self.events_tx.subscribe()
    }

    /// Opens the requested devices, replacing (and stopping) any previous
    /// track of the same kind.
    pub async fn acquire(&self, constraints: MediaConstraints) -> Result<LocalStream> {
        let acquired = self.devices.user_media(constraints).await?;

        let mut tracks = self.lock();
        for track in acquired {
            let slot = match track.source() {
                TrackSource::Microphone => &mut tracks.audio,
                TrackSource::Camera => &mut tracks.camera,
                TrackSource::Display => &mut tracks.screen,
            };
            if let Some(previous) = slot.replace(track) {
                previous.stop();
            }
        }
        info!(
            "Local media acquired (audio: {}, video: {})",
            tracks.audio.is_some(),
            tracks.camera.is_some()
        );
        drop(tracks);

        Ok(self.local_stream())
    }

    /// Flips the enabled flag of the outbound track of `kind`. Returns the new value.
    pub fn toggle(&self, kind: MediaKind) -> Result<bool> {
        let track = self.require(kind)?;
        let enabled = !track.is_enabled();
        track.set_enabled(enabled);
        self.notify_enabled(kind, enabled);
        Ok(enabled)
    }

    pub fn set_enabled(&self, kind: MediaKind, enabled: bool) -> Result<bool> {
        let track = self.require(kind)?;
        if track.set_enabled(enabled) {
            self.notify_enabled(kind, enabled);
        }
        Ok(enabled)
    }

    pub fn is_enabled(&self, kind: MediaKind) -> bool {
        self.outbound(kind).is_some_and(|track| track.is_enabled())
    }

    fn require(&self, kind: MediaKind) -> Result<Arc<LocalTrack>> {
        self.outbound(kind)
            .ok_or_else(|| Error::DeviceUnavailable(format!("no active {:?} track", kind)))
    }

    fn notify_enabled(&self, kind: MediaKind, enabled: bool) {
        info!("Local {:?} {}", kind, if enabled { "enabled" } else { "disabled" });
        let _ = self.events_tx.send(MediaEvent::TrackEnabled { kind, enabled });
    }

    pub fn outbound(&self, kind: MediaKind) -> Option<Arc<LocalTrack>> {
        self.lock().outbound(kind)
    }

    pub fn outbound_tracks(&self) -> Vec<Arc<LocalTrack>> {
        let tracks = self.lock();
        [MediaKind::Audio, MediaKind::Video]
            .into_iter()
            .filter_map(|kind| tracks.outbound(kind))
            .collect()
    }

    pub fn is_screen_sharing(&self) -> bool {
        self.lock().screen.is_some()
    }

    pub fn local_stream(&self) -> LocalStream {
        let tracks = self.lock();
        LocalStream {
            audio: tracks.audio.clone(),
            video: tracks.outbound(MediaKind::Video),
            screen_sharing: tracks.screen.is_some(),
        }
    }

    /// Captures the display and makes it the outbound video track. The camera
    /// is released while sharing. Calling it while already sharing returns
    /// the current display track.
    pub async fn start_screen_share(&self) -> Result<Arc<LocalTrack>> {
        if let Some(screen) = self.lock().screen.clone() {
            return Ok(screen);
        }

        let screen = self.devices.display_media().await?;

        let mut tracks = self.lock();
        if let Some(existing) = tracks.screen.clone() {
            screen.stop();
            return Ok(existing);
        }
        if let Some(camera) = tracks.camera.take() {
            // Keep the user's video mute state across the swap.
            screen.set_enabled(camera.is_enabled());
            camera.stop();
        }

        let watcher = tokio::spawn({
            let screen = screen.clone();
            let events_tx = self.events_tx.clone();
            async move {
                screen.ended().await;
                info!("Screen capture ended outside the session");
                let _ = events_tx.send(MediaEvent::ScreenShareEnded {
                    track_id: screen.id().to_owned(),
                });
            }
        });
        tracks.screen = Some(screen.clone());
        tracks.screen_watcher = Some(watcher);
        info!("Screen share started");

        Ok(screen)
    }

    /// Ends screen capture and re-acquires the camera as outbound video.
    /// Returns `None` if no share was active.
    pub async fn stop_screen_share(&self) -> Result<Option<Arc<LocalTrack>>> {
        let screen = {
            let mut tracks = self.lock();
            let Some(screen) = tracks.screen.take() else {
                return Ok(None);
            };
            tracks.unwatch_screen();
            screen
        };
        screen.stop();

        let constraints = MediaConstraints {
            audio: false,
            video: true,
        };
        let camera = match self.devices.user_media(constraints).await {
            Ok(acquired) => acquired.into_iter().find(|t| t.source() == TrackSource::Camera),
            Err(e) => {
                warn!("Camera unavailable after screen share: {}", e);
                return Err(e);
            }
        };
        let Some(camera) = camera else {
            return Err(Error::DeviceUnavailable("camera".into()));
        };
        camera.set_enabled(screen.is_enabled());

        let mut tracks = self.lock();
        if let Some(previous) = tracks.camera.replace(camera.clone()) {
            previous.stop();
        }
        info!("Screen share stopped, camera restored");

        Ok(Some(camera))
    }

    /// Stops every track.
    pub fn release(&self) {
        let mut tracks = self.lock();
        tracks.unwatch_screen();
        for track in [tracks.audio.take(), tracks.camera.take(), tracks.screen.take()]
            .into_iter()
            .flatten()
        {
            track.stop();
        }
        info!("Local media released");
    }
}

impl Drop for LocalMediaSource {
    fn drop(&mut self) {
        self.lock().unwatch_screen();
    }
}
