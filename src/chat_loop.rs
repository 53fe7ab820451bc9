//! The orchestrator: waits for local input and incoming datagrams, drives
//! codec, transport and session state, and raises the informational
//! byte-count consistency warning.
//!
//! Front-ends do not duplicate any of this logic. They supply a
//! [DisplaySink] (where formatted lines go) and an [InputSource] (where
//! typed lines come from) and pick one of two equivalent concurrency models:
//!
//! * [ChatLoop::run] - single-context cooperative multiplexing: one task
//!   `select!`s over local input and the socket and services one event at a
//!   time. This is what the console front-end uses.
//! * [ChatLoop::run_receiver] + [ChatLoop::send_line] - the two-context
//!   model for event-driven front-ends: a spawned task blocks on the socket
//!   while UI events call `send_line` concurrently. The session counters sit
//!   behind a mutex to keep that safe. [ChatLoop::shutdown] closes the
//!   socket, which unblocks the receiver task; awaiting it is the
//!   acknowledgement of the shutdown.
//!
//! Malformed datagrams are discarded without any user-visible output - UDP
//! is best-effort end to end. A failed send is reported to the display
//! surface once and the loop keeps going. A diverging byte counter is not an
//! error at all: unordered, lossy delivery makes the two counters drift
//! apart legitimately, so it is surfaced as a purely informational line.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{Local, TimeZone};
#[cfg(test)] use mockall::automock;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::ChatConfig;
use crate::protocol::{truncate_to_bound, ChatMessage, MAX_DATAGRAM_LEN, MAX_MESSAGE_LEN};
use crate::session::ChatSession;
use crate::transport::ChatSocket;

/// Where formatted chat output goes. The console front-end prints lines,
///  an event-driven front-end appends them to its scrollback panel.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DisplaySink: Send + Sync + 'static {
    async fn append_line(&self, line: String);
}

/// Where typed lines come from. `None` means end of input and triggers
///  shutdown.
///
/// [ChatLoop::run] polls `next_line` inside a `select!` and drops the
///  unfinished future whenever a datagram wins the race, so implementations
///  must be cancel-safe: a dropped call must not lose a partially read line.
///  Keep read state in `self` (as tokio's `Lines::next_line` does) rather
///  than in the returned future.
#[async_trait]
pub trait InputSource: Send {
    async fn next_line(&mut self) -> Option<String>;
}

/// [DisplaySink] backed by an unbounded channel, for front-ends that drain
///  display output from their own event loop (and for tests).
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<String>,
}

impl ChannelSink {
    pub fn new() -> (ChannelSink, mpsc::UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (ChannelSink { sender }, receiver)
    }
}

#[async_trait]
impl DisplaySink for ChannelSink {
    async fn append_line(&self, line: String) {
        // the receiving front-end going away is a shutdown condition, not an error
        let _ = self.sender.send(line);
    }
}


#[derive(Clone)]
pub struct ChatLoop {
    socket: Arc<ChatSocket>,
    peer_addr: SocketAddr,
    session: Arc<Mutex<ChatSession>>,
    sink: Arc<dyn DisplaySink>,
    /// event-driven front-ends echo sent lines into their own panel; the
    ///  console relies on the user's typed echo
    echo_sent: bool,
}

impl ChatLoop {
    /// Binds the socket and initializes the session from `config`. A bind
    ///  failure is fatal to the caller.
    pub async fn bind(config: &ChatConfig, sink: Arc<dyn DisplaySink>) -> anyhow::Result<ChatLoop> {
        let socket = Arc::new(ChatSocket::bind(config.local_port).await?);
        let session = ChatSession::new(&config.username, &config.hostname)?;

        Ok(ChatLoop {
            socket,
            peer_addr: config.peer_addr,
            session: Arc::new(Mutex::new(session)),
            sink,
            echo_sent: false,
        })
    }

    pub fn with_local_echo(mut self) -> ChatLoop {
        self.echo_sent = true;
        self
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn session(&self) -> Arc<Mutex<ChatSession>> {
        self.session.clone()
    }

    /// Single-context cooperative loop: services whichever of local input
    ///  and incoming datagrams becomes ready, one event at a time. Returns
    ///  cleanly on end of input or socket closure; an unrecoverable socket
    ///  error terminates the loop with that error.
    pub async fn run(&self, mut input: impl InputSource) -> anyhow::Result<()> {
        let mut buf = [0u8; MAX_DATAGRAM_LEN];
        loop {
            tokio::select! {
                line = input.next_line() => {
                    match line {
                        Some(line) => self.send_line(&line).await,
                        None => {
                            info!("end of input, shutting down");
                            break;
                        }
                    }
                }
                received = self.socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, from)) => self.on_datagram(&buf[..len], from).await,
                        Err(_) if self.socket.is_closed() => {
                            info!("socket closed, shutting down");
                            break;
                        }
                        Err(e) => {
                            error!(error = ?e, "error receiving from datagram socket");
                            return Err(e);
                        }
                    }
                }
            }
        }
        self.socket.close();
        Ok(())
    }

    /// The receive half of the two-context model. Blocks on the socket in a
    ///  loop; returns cleanly once the socket is closed. Meant to be spawned
    ///  while UI events call [ChatLoop::send_line] concurrently.
    pub async fn run_receiver(&self) -> anyhow::Result<()> {
        let mut buf = [0u8; MAX_DATAGRAM_LEN];
        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, from)) => self.on_datagram(&buf[..len], from).await,
                Err(_) if self.socket.is_closed() => {
                    info!("shutting down receiver");
                    return Ok(());
                }
                Err(e) => {
                    error!(error = ?e, "error receiving from datagram socket");
                    return Err(e);
                }
            }
        }
    }

    /// Closes the socket, which stops both loop variants. Await the spawned
    ///  receiver task afterwards to complete the shutdown handshake.
    pub fn shutdown(&self) {
        self.socket.close();
    }

    /// Handles one local-send event: accounts the line in the session,
    ///  encodes it with the updated cumulative count and sends it to the
    ///  configured peer. Input longer than the message-text bound is
    ///  truncated, not rejected.
    pub async fn send_line(&self, line: &str) {
        let line = truncate_to_bound(line, MAX_MESSAGE_LEN);

        let msg = {
            let mut session = self.session.lock().await;
            session.record_sent(line.len() as u64);
            ChatMessage {
                username: session.username.clone(),
                hostname: session.hostname.clone(),
                chat_start_time: session.start_time,
                bytes_sent: session.bytes_sent(),
                message_text: line.to_string(),
            }
        };

        let mut buf = BytesMut::with_capacity(msg.encoded_len());
        if let Err(e) = msg.encode(&mut buf) {
            warn!("discarding outgoing message: {:#}", e);
            return;
        }

        if let Err(e) = self.socket.send_to(&buf, self.peer_addr).await {
            error!("send failed: {:#}", e);
            self.sink.append_line(format!("send failed: {:#}", e)).await;
            return;
        }

        if self.echo_sent {
            self.sink.append_line(format!("[you] {}", line)).await;
        }
    }

    /// Handles one receive event. A datagram that does not decode is
    ///  silently discarded - no crash, no display, no session mutation.
    async fn on_datagram(&self, raw: &[u8], from: SocketAddr) {
        let msg = match ChatMessage::decode(raw) {
            Ok(msg) => msg,
            Err(e) => {
                debug!("dropping malformed datagram from {}: {}", from, e);
                return;
            }
        };

        let local_received = {
            let mut session = self.session.lock().await;
            session.record_received(msg.message_text.len() as u64);
            session.bytes_received()
        };

        for line in format_incoming(&msg, local_received) {
            self.sink.append_line(line).await;
        }
    }
}

/// Formats the display lines for one received message: the message itself,
///  a summary of sender identity / chat start time / both byte counters,
///  and - only if the counters diverge - the informational mismatch line.
fn format_incoming(msg: &ChatMessage, local_received: u64) -> Vec<String> {
    let mut lines = vec![
        format!("[{}@{}] {}", msg.username, msg.hostname, msg.message_text),
        format!(
            "  chat started {}; {} claims {} bytes sent, {} bytes received locally",
            format_start_time(msg.chat_start_time),
            msg.username,
            msg.bytes_sent,
            local_received
        ),
    ];
    if local_received != msg.bytes_sent {
        lines.push(format!(
            "  byte count mismatch: peer claims {} bytes sent but local count is {}",
            msg.bytes_sent, local_received
        ));
    }
    lines
}

fn format_start_time(epoch_secs: u64) -> String {
    Local
        .timestamp_opt(epoch_secs as i64, 0)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| format!("@{}", epoch_secs))
}
