//! The UDP socket lifecycle. This module knows nothing about the message
//! format - it moves raw datagrams and nothing else.
//!
//! There is one [ChatSocket] per process, shared by the send and the receive
//! path (the network stack supports that concurrently). Closing the socket
//! is the cancellation mechanism: a receive that is blocked when [ChatSocket::close]
//! is called returns an error instead of hanging, and every operation after
//! that fails. There are no timeouts and no retries.

use std::net::{Ipv4Addr, SocketAddr};

use anyhow::{bail, Context};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct ChatSocket {
    socket: UdpSocket,
    shutdown: CancellationToken,
}

impl ChatSocket {
    /// Binds to `0.0.0.0:port`. Port 0 requests an ephemeral port from the
    ///  OS - use [ChatSocket::local_addr] to find out what was assigned.
    pub async fn bind(port: u16) -> anyhow::Result<ChatSocket> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .with_context(|| format!("binding UDP socket to port {}", port))?;

        Ok(ChatSocket {
            socket,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Sends `buf` as a single datagram - no acknowledgement, no retry, no
    ///  fragmentation handling beyond what the OS does.
    pub async fn send_to(&self, buf: &[u8], to: SocketAddr) -> anyhow::Result<()> {
        if self.is_closed() {
            bail!("socket is closed");
        }
        self.socket
            .send_to(buf, to)
            .await
            .with_context(|| format!("sending datagram to {}", to))?;
        Ok(())
    }

    /// Blocks until a datagram arrives or the socket is closed. A datagram
    ///  bigger than `buf` is truncated to `buf.len()` bytes - UDP semantics,
    ///  not an error; the decoder copes with the truncated line.
    pub async fn recv_from(&self, buf: &mut [u8]) -> anyhow::Result<(usize, SocketAddr)> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => bail!("socket is closed"),
            r = self.socket.recv_from(buf) => Ok(r?),
        }
    }

    /// Idempotent. Unblocks pending receives; all subsequent operations on
    ///  this handle fail.
    pub fn close(&self) {
        debug!("closing chat socket");
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
