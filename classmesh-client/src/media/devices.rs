use crate::config::MediaConstraints;
use crate::error::{Error, Result};
use crate::media::track::{LocalTrack, TrackSource};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Capture backend. Implementations map a refused prompt to
/// `Error::PermissionDenied` and a missing device to `Error::DeviceUnavailable`.
#[async_trait]
pub trait MediaDevices: Send + Sync + 'static {
    async fn user_media(&self, constraints: MediaConstraints) -> Result<Vec<Arc<LocalTrack>>>;

    async fn display_media(&self) -> Result<Arc<LocalTrack>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceAvailability {
    #[default]
    Available,
    Denied,
    Missing,
}

/// Devices whose tracks are fed by the embedding application through
/// `LocalTrack::write_sample`. Availability per source is adjustable at
/// runtime.
pub struct VirtualDevices {
    stream_id: String,
    availability: Mutex<HashMap<TrackSource, DeviceAvailability>>,
}

impl Default for VirtualDevices {
    fn default() -> Self {
        Self::new("local")
    }
}

impl VirtualDevices {
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            availability: Mutex::new(HashMap::new()),
        }
    }

    pub fn with(self, source: TrackSource, availability: DeviceAvailability) -> Self {
        self.set(source, availability);
        self
    }

    pub fn set(&self, source: TrackSource, availability: DeviceAvailability) {
        self.availability
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(source, availability);
    }

    fn open(&self, source: TrackSource) -> Result<Arc<LocalTrack>> {
        let availability = self
            .availability
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&source)
            .copied()
            .unwrap_or_default();

        match availability {
            DeviceAvailability::Available => {
                debug!("Opened {:?} track", source);
                Ok(LocalTrack::new(source, &self.stream_id))
            }
            DeviceAvailability::Denied => {
                Err(Error::PermissionDenied(format!("{:?} access refused", source)))
            }
            DeviceAvailability::Missing => {
                Err(Error::DeviceUnavailable(format!("no {:?} device", source)))
            }
        }
    }
}

#[async_trait]
impl MediaDevices for VirtualDevices {
    async fn user_media(&self, constraints: MediaConstraints) -> Result<Vec<Arc<LocalTrack>>> {
        if !constraints.audio && !constraints.video {
            return Err(Error::DeviceUnavailable("no media kind requested".into()));
        }

        let mut tracks = Vec::new();
        if constraints.audio {
            tracks.push(self.open(TrackSource::Microphone)?);
        }
        if constraints.video {
            match self.open(TrackSource::Camera) {
                Ok(track) => tracks.push(track),
                Err(e) => {
                    // Nothing is handed out on failure.
                    for track in &tracks {
                        track.stop();
                    }
                    return Err(e);
                }
            }
        }
        Ok(tracks)
    }

    async fn display_media(&self) -> Result<Arc<LocalTrack>> {
        self.open(TrackSource::Display)
    }
}
