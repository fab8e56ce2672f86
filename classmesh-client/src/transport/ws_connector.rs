use crate::error::{Error, Result};
use crate::transport::connector::{Connector, Credential, Socket};
use async_trait::async_trait;
use classmesh_core::Envelope;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to the relay over WebSocket, authenticating with an
/// `Authorization: Bearer` header. Frames are JSON `Envelope`s.
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    fn request(&self, credential: &Credential) -> Result<Request> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::Network(format!("invalid relay url {}: {}", self.url, e)))?;

        let value = HeaderValue::from_str(&format!("Bearer {}", credential.token()))
            .map_err(|_| Error::Auth("credential is not a valid header value".into()))?;
        request.headers_mut().insert(header::AUTHORIZATION, value);
        Ok(request)
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, credential: &Credential) -> Result<Socket> {
        let request = self.request(credential)?;

        let (ws, _) = connect_async(request).await.map_err(|e| match e {
            WsError::Http(response)
                if matches!(
                    response.status(),
                    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
                ) =>
            {
                Error::Auth(format!("relay answered {}", response.status()))
            }
            other => Error::Network(other.to_string()),
        })?;
        info!("WebSocket open: {}", self.url);

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (unsent_tx, unsent_rx) = oneshot::channel();

        tokio::spawn(pump(ws, outbound_rx, inbound_tx, unsent_tx));

        Ok(Socket {
            outbound: outbound_tx,
            inbound: inbound_rx,
            unsent: unsent_rx,
        })
    }
}

async fn pump(
    ws: WsStream,
    mut outbound: mpsc::UnboundedReceiver<Envelope>,
    inbound: mpsc::UnboundedSender<Envelope>,
    unsent_tx: oneshot::Sender<Vec<Envelope>>,
) {
    let (mut sink, mut stream) = ws.split();
    let mut unsent = Vec::new();

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<Envelope>(text.as_str()) {
                        Ok(envelope) => {
                            if inbound.send(envelope).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Dropping malformed frame: {}", e),
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    warn!("WebSocket read error: {}", e);
                    break;
                }
                Some(Ok(_)) => {}
            },

            next = outbound.recv() => match next {
                Some(envelope) => {
                    let text = match serde_json::to_string(&envelope) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Cannot encode '{}': {}", envelope.event, e);
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::text(text)).await {
                        warn!("WebSocket write error: {}", e);
                        unsent.push(envelope);
                        break;
                    }
                }
                None => {
                    let _ = sink.close().await;
                    break;
                }
            },
        }
    }

    outbound.close();
    while let Ok(envelope) = outbound.try_recv() {
        unsent.push(envelope);
    }
    debug!("WebSocket pump finished ({} unsent)", unsent.len());
    let _ = unsent_tx.send(unsent);
}
