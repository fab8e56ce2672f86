use crate::hub::RelayHub;
use crate::ws_handler::ws_handler;
use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tracing::info;

pub fn router(hub: RelayHub) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .with_state(hub)
}

async fn health() -> &'static str {
    "ok"
}

/// Serves the relay on `listener` until the process ends.
pub async fn serve(listener: TcpListener, hub: RelayHub) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Signaling relay listening on ws://{}/ws", addr);
    }
    axum::serve(listener, router(hub)).await
}
