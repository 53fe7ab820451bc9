use std::net::SocketAddr;

/// Startup parameters for one chat process.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// The local port that the UDP socket is bound to. 0 requests an
    ///  ephemeral port from the OS.
    pub local_port: u16,

    /// The single peer that all outgoing messages are sent to. The protocol
    ///  is strictly unicast - there is no multi-peer addressing.
    pub peer_addr: SocketAddr,

    pub username: String,
    pub hostname: String,
}

impl ChatConfig {
    pub fn new(local_port: u16, peer_addr: SocketAddr, username: String, hostname: String) -> ChatConfig {
        ChatConfig {
            local_port,
            peer_addr,
            username,
            hostname,
        }
    }
}
