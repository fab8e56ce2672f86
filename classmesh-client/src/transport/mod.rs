mod connector;
mod handlers;
mod signaling_transport;
mod transport_event;
mod ws_connector;

pub use connector::*;
pub use handlers::*;
pub use signaling_transport::*;
pub use transport_event::*;
pub use ws_connector::*;
