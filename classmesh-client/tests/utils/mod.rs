pub mod mock_connector;

pub use memory_relay::*;
pub use mock_connector::*;
pub use mock_peer::*;
pub use mock_signaling::*;
pub use signal_helpers::*;
pub use test_participant::*;

use tracing::Level;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}
