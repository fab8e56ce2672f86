mod connection;
mod link_event;
mod peer_link;
mod rtc_connection;

pub use connection::*;
pub use link_event::*;
pub use peer_link::*;
pub use rtc_connection::*;
