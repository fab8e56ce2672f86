use crate::config::{ReconnectPolicy, TransportConfig};
use crate::error::{Error, Result};
use crate::transport::connector::{Connector, Credential, Socket};
use crate::transport::handlers::{invoke_all, HandlerRegistry, SubscriptionId};
use crate::transport::transport_event::{Delivery, TransportEvent, TransportState};
use crate::transport::ws_connector::WsConnector;
use classmesh_core::{Envelope, SignalEvent};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const EVENT_CAPACITY: usize = 64;

/// Persistent, authenticated channel to the signaling relay.
///
/// Cheap to clone; every clone drives the same connection. Outbound messages
/// sent while no socket is up are queued and flushed in FIFO order exactly
/// once when a socket becomes available.
#[derive(Clone)]
pub struct SignalingTransport {
    inner: Arc<TransportInner>,
}

struct TransportInner {
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    state_tx: watch::Sender<TransportState>,
    events_tx: broadcast::Sender<TransportEvent>,
    link: Mutex<Link>,
    handlers: Mutex<HandlerRegistry>,
    connect_lock: tokio::sync::Mutex<()>,
}

#[derive(Default)]
struct Link {
    credential: Option<Credential>,
    outbound: Option<mpsc::UnboundedSender<Envelope>>,
    queue: VecDeque<Envelope>,
    driver: Option<JoinHandle<()>>,
    /// Bumped on every teardown; tasks from an older generation leave state alone.
    generation: u64,
}

impl SignalingTransport {
    pub fn new(connector: Arc<dyn Connector>, config: TransportConfig) -> Self {
        let (state_tx, _) = watch::channel(TransportState::Idle);
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(TransportInner {
                connector,
                policy: config.reconnect,
                state_tx,
                events_tx,
                link: Mutex::new(Link::default()),
                handlers: Mutex::new(HandlerRegistry::default()),
                connect_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Transport over a real WebSocket to `config.url`.
    pub fn websocket(config: TransportConfig) -> Self {
        let connector = Arc::new(WsConnector::new(config.url.clone()));
        Self::new(connector, config)
    }

    /// Establishes the connection, retrying under the configured policy.
    ///
    /// Calling again with the same credential while connected (or while
    /// reconnecting) is a no-op. A rejected credential fails immediately
    /// with `Error::Auth` and is never retried.
    pub async fn connect(&self, credential: Credential) -> Result<()> {
        let _guard = self.inner.connect_lock.lock().await;

        let generation = {
            let mut link = self.inner.lock_link();
            let state = *self.inner.state_tx.borrow();
            let live = matches!(
                state,
                TransportState::Connected | TransportState::Reconnecting { .. }
            );
            if live && link.credential.as_ref() == Some(&credential) {
                debug!("connect() ignored: already connected with this credential");
                return Ok(());
            }
            link.teardown();
            link.credential = Some(credential.clone());
            link.generation
        };

        self.inner.set_state(TransportState::Connecting);
        info!("Connecting to signaling relay");

        let socket = match self.inner.establish(generation, &credential, false).await {
            Ok(socket) => socket,
            Err(e @ Error::Auth(_)) => {
                warn!("Signaling credential rejected: {}", e);
                let mut link = self.inner.lock_link();
                if link.generation == generation {
                    link.credential = None;
                    self.inner.set_state(TransportState::Idle);
                }
                return Err(e);
            }
            Err(e) => {
                self.inner.exhaust(generation);
                return Err(e);
            }
        };

        if !self.inner.install(generation, &socket.outbound, false) {
            return Err(Error::Disconnected);
        }

        let handle = tokio::spawn(self.inner.clone().drive(generation, credential, socket));
        let mut link = self.inner.lock_link();
        if link.generation == generation {
            link.driver = Some(handle);
        } else {
            handle.abort();
        }
        Ok(())
    }

    /// Drops the socket and stops reconnecting. Queued messages are kept and
    /// flushed by the next successful `connect`.
    pub fn disconnect(&self) {
        let mut link = self.inner.lock_link();
        link.teardown();
        link.credential = None;
        self.inner.set_state(TransportState::Idle);
        info!("Signaling transport disconnected by caller");
    }

    /// Sends now if a socket is up, otherwise queues for the next flush.
    pub fn send(&self, event: &str, payload: Value) -> Delivery {
        self.inner.send_envelope(Envelope::new(event, payload))
    }

    pub fn emit(&self, event: &SignalEvent) -> Result<Delivery> {
        Ok(self.inner.send_envelope(event.to_envelope()?))
    }

    /// Registers `handler` for `event`. Handlers run in registration order on
    /// the transport's reader task; an error or panic in one is logged and
    /// does not affect the others.
    pub fn subscribe<F>(&self, event: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.lock_handlers().insert(event, Arc::new(handler))
    }

    pub fn unsubscribe(&self, event: &str, id: SubscriptionId) -> bool {
        self.inner.lock_handlers().remove(event, id)
    }

    pub fn state(&self) -> TransportState {
        *self.inner.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<TransportState> {
        self.inner.state_tx.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Number of messages waiting for a socket.
    pub fn queued(&self) -> usize {
        self.inner.lock_link().queue.len()
    }
}

impl Link {
    fn teardown(&mut self) {
        self.generation += 1;
        self.outbound = None;
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

impl TransportInner {
    fn lock_link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_handlers(&self) -> MutexGuard<'_, HandlerRegistry> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: TransportState) {
        self.state_tx.send_replace(state);
    }

    fn emit_event(&self, event: TransportEvent) {
        // No receivers is fine.
        let _ = self.events_tx.send(event);
    }

    fn send_envelope(&self, envelope: Envelope) -> Delivery {
        let mut guard = self.lock_link();
        let link = &mut *guard;

        let envelope = match &link.outbound {
            Some(outbound) => match outbound.send(envelope) {
                Ok(()) => return Delivery::Sent,
                Err(mpsc::error::SendError(envelope)) => envelope,
            },
            None => envelope,
        };

        debug!("Queued '{}' ({} waiting)", envelope.event, link.queue.len() + 1);
        link.queue.push_back(envelope);
        Delivery::Queued
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock_link().generation == generation
    }

    /// Up to `max_attempts` tries. The initial connect tries immediately;
    /// a reconnect waits before every attempt. Stops with `Disconnected` as
    /// soon as `generation` is torn down.
    async fn establish(
        &self,
        generation: u64,
        credential: &Credential,
        reconnecting: bool,
    ) -> Result<Socket> {
        let attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=attempts {
            if reconnecting {
                self.set_state(TransportState::Reconnecting { attempt });
                tokio::time::sleep(self.policy.delay_for(attempt)).await;
            } else if attempt > 1 {
                tokio::time::sleep(self.policy.delay_for(attempt - 1)).await;
            }
            if !self.is_current(generation) {
                debug!("Connect attempt {} abandoned", attempt);
                return Err(Error::Disconnected);
            }

            match self.connector.connect(credential).await {
                Ok(socket) => return Ok(socket),
                Err(e @ Error::Auth(_)) => return Err(e),
                Err(_) if !self.is_current(generation) => return Err(Error::Disconnected),
                Err(e) => {
                    warn!("Connect attempt {}/{} failed: {}", attempt, attempts, e);
                    last_error = e.to_string();
                    self.emit_event(TransportEvent::Error(last_error.clone()));
                }
            }
        }

        Err(Error::Network(format!(
            "gave up after {} attempts: {}",
            attempts, last_error
        )))
    }

    /// Makes `outbound` the live socket and flushes the queue into it.
    fn install(
        &self,
        generation: u64,
        outbound: &mpsc::UnboundedSender<Envelope>,
        resumed: bool,
    ) -> bool {
        let mut link = self.lock_link();
        if link.generation != generation {
            return false;
        }

        let mut flushed = 0;
        while let Some(envelope) = link.queue.pop_front() {
            if let Err(mpsc::error::SendError(envelope)) = outbound.send(envelope) {
                link.queue.push_front(envelope);
                break;
            }
            flushed += 1;
        }
        link.outbound = Some(outbound.clone());

        info!("Signaling connected (resumed: {}, flushed: {})", resumed, flushed);
        self.set_state(TransportState::Connected);
        self.emit_event(TransportEvent::Connected { resumed, flushed });
        true
    }

    /// Puts envelopes the dead socket never wrote back at the head of the queue.
    fn socket_lost(&self, generation: u64, unsent: Vec<Envelope>) -> bool {
        let mut link = self.lock_link();
        if link.generation != generation {
            return false;
        }

        link.outbound = None;
        for envelope in unsent.into_iter().rev() {
            link.queue.push_front(envelope);
        }

        warn!("Signaling connection lost ({} queued)", link.queue.len());
        self.emit_event(TransportEvent::Error("connection lost".to_owned()));
        true
    }

    fn exhaust(&self, generation: u64) {
        let mut link = self.lock_link();
        if link.generation != generation {
            return;
        }
        link.outbound = None;
        link.driver = None;

        error!("Signaling relay unreachable, giving up");
        self.set_state(TransportState::Disconnected);
        self.emit_event(TransportEvent::Disconnected);
    }

    fn dispatch(&self, envelope: &Envelope) {
        let handlers = self.lock_handlers().handlers_for(&envelope.event);
        if handlers.is_empty() {
            debug!("No handler for '{}'", envelope.event);
            return;
        }
        invoke_all(&envelope.event, &handlers, &envelope.payload);
    }

    async fn drive(self: Arc<Self>, generation: u64, credential: Credential, mut socket: Socket) {
        loop {
            while let Some(envelope) = socket.inbound.recv().await {
                self.dispatch(&envelope);
            }

            let unsent = (&mut socket.unsent).await.unwrap_or_default();
            if !self.socket_lost(generation, unsent) {
                return;
            }

            match self.establish(generation, &credential, true).await {
                Ok(next) => {
                    if !self.install(generation, &next.outbound, true) {
                        return;
                    }
                    socket = next;
                }
                Err(e) => {
                    warn!("Reconnect failed: {}", e);
                    self.exhaust(generation);
                    return;
                }
            }
        }
    }
}
