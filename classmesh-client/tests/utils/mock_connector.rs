use async_trait::async_trait;
use classmesh_client::{Connector, Credential, Envelope, Error, Result, Socket};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

/// What the next connection attempt does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Accept,
    Refuse,
    RejectCredential,
}

/// Relay side of an accepted mock socket.
pub struct RelayEnd {
    pub sent: mpsc::UnboundedReceiver<Envelope>,
    pub deliver: mpsc::UnboundedSender<Envelope>,
    unsent: Option<oneshot::Sender<Vec<Envelope>>>,
}

impl RelayEnd {
    /// Kills the socket. `unwritten` are reported back as accepted but never written.
    pub fn drop_connection(mut self, unwritten: Vec<Envelope>) {
        if let Some(unsent) = self.unsent.take() {
            let _ = unsent.send(unwritten);
        }
    }

    /// Drains everything the client wrote so far.
    pub fn written(&mut self) -> Vec<Envelope> {
        let mut written = Vec::new();
        while let Ok(envelope) = self.sent.try_recv() {
            written.push(envelope);
        }
        written
    }
}

/// Connector that follows a script of outcomes, one per attempt. Once the
/// script runs out every attempt is refused.
pub struct ScriptedConnector {
    script: Mutex<VecDeque<Outcome>>,
    attempts: AtomicU32,
    relays: mpsc::UnboundedSender<RelayEnd>,
}

impl ScriptedConnector {
    pub fn new(
        script: impl IntoIterator<Item = Outcome>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<RelayEnd>) {
        let (relays, relays_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            attempts: AtomicU32::new(0),
            relays,
        });
        (connector, relays_rx)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _credential: &Credential) -> Result<Socket> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Outcome::Refuse);
        tracing::debug!("[ScriptedConnector] attempt {} -> {:?}", attempt, outcome);

        match outcome {
            Outcome::Accept => {
                let (out_tx, out_rx) = mpsc::unbounded_channel();
                let (in_tx, in_rx) = mpsc::unbounded_channel();
                let (unsent_tx, unsent_rx) = oneshot::channel();

                let _ = self.relays.send(RelayEnd {
                    sent: out_rx,
                    deliver: in_tx,
                    unsent: Some(unsent_tx),
                });
                Ok(Socket {
                    outbound: out_tx,
                    inbound: in_rx,
                    unsent: unsent_rx,
                })
            }
            Outcome::Refuse => Err(Error::Network("connection refused".into())),
            Outcome::RejectCredential => Err(Error::Auth("relay answered 401".into())),
        }
    }
}
