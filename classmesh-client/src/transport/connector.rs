use crate::error::Result;
use async_trait::async_trait;
use classmesh_core::Envelope;
use std::fmt;
use tokio::sync::{mpsc, oneshot};

/// Opaque bearer credential supplied by the enclosing application.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential(String);

impl Credential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// One established signaling connection.
///
/// The connection is considered lost once `inbound` yields `None`. Envelopes
/// the socket accepted on `outbound` but never wrote are reported on `unsent`
/// so the transport can queue them again.
pub struct Socket {
    pub outbound: mpsc::UnboundedSender<Envelope>,
    pub inbound: mpsc::UnboundedReceiver<Envelope>,
    pub unsent: oneshot::Receiver<Vec<Envelope>>,
}

/// Opens sockets to the relay. `SignalingTransport` owns retry policy; a
/// connector makes exactly one attempt per call and must map a refused
/// credential to `Error::Auth`.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, credential: &Credential) -> Result<Socket>;
}
