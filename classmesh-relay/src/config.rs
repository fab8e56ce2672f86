use clap::Parser;
use std::net::SocketAddr;

#[derive(Debug, Clone, Parser)]
#[command(name = "classmesh-relay", about = "Signaling relay for classmesh sessions")]
pub struct RelayConfig {
    #[arg(long, default_value = "0.0.0.0:3000")]
    pub bind: SocketAddr,

    /// Accepted bearer token. Repeat for several; none accepts any credential.
    #[arg(long = "token")]
    pub tokens: Vec<String>,
}
