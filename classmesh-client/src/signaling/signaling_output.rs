use crate::transport::SignalingTransport;
use async_trait::async_trait;
use classmesh_core::{IceCandidate, ParticipantId, RoomId, SessionDescription, SignalEvent};
use tracing::{debug, error};

/// Addressing for one peer-to-peer negotiation message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub room_id: RoomId,
    pub from: ParticipantId,
    pub to: ParticipantId,
}

/// Where a peer link sends its negotiation messages.
#[async_trait]
pub trait SignalingOutput: Send + Sync {
    async fn send_offer(&self, route: &Route, offer: SessionDescription);

    async fn send_answer(&self, route: &Route, answer: SessionDescription);

    async fn send_ice(&self, route: &Route, candidate: IceCandidate);
}

impl SignalingTransport {
    fn emit_logged(&self, event: SignalEvent) {
        match self.emit(&event) {
            Ok(delivery) => debug!("{} -> {:?}", event.name(), delivery),
            Err(e) => error!("Failed to encode {}: {}", event.name(), e),
        }
    }
}

#[async_trait]
impl SignalingOutput for SignalingTransport {
    async fn send_offer(&self, route: &Route, offer: SessionDescription) {
        self.emit_logged(SignalEvent::WebrtcOffer {
            room_id: route.room_id.clone(),
            to: route.to.clone(),
            from: route.from.clone(),
            offer,
        });
    }

    async fn send_answer(&self, route: &Route, answer: SessionDescription) {
        self.emit_logged(SignalEvent::WebrtcAnswer {
            room_id: route.room_id.clone(),
            to: route.to.clone(),
            from: route.from.clone(),
            answer,
        });
    }

    async fn send_ice(&self, route: &Route, candidate: IceCandidate) {
        self.emit_logged(SignalEvent::WebrtcIceCandidate {
            room_id: route.room_id.clone(),
            to: route.to.clone(),
            from: route.from.clone(),
            candidate,
        });
    }
}
