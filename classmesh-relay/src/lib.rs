mod config;
mod hub;
mod server;
mod ws_handler;

pub use config::*;
pub use hub::*;
pub use server::*;
pub use ws_handler::*;
