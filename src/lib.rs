//! Peer-to-peer text chat over plain UDP datagrams.
//!
//! Each process binds one local UDP port, sends typed lines to a single
//! configured peer and concurrently receives datagrams from it. Delivery is
//! exactly what UDP provides: unicast, unordered, unacknowledged. Both sides
//! keep running byte counters (bytes sent / bytes received) and every message
//! carries the sender's cumulative sent count, so the receiver can flag
//! divergence - an expected, purely informational signal on a lossy network,
//! never an error.
//!
//! ## Wire format
//!
//! One datagram carries exactly one message, a single delimited line:
//!
//! ```ascii
//! <username>|<hostname>|<chat_start_time>|<bytes_sent>|<message_text>
//! ```
//!
//! * `username`, `hostname`: at most 64 bytes each, no `|`
//! * `chat_start_time`: seconds since the epoch, decimal, fixed at session
//!   start and repeated on every message of that session
//! * `bytes_sent`: the sender's cumulative sent-byte count, decimal
//! * `message_text`: at most 1024 bytes; the final field, so it may itself
//!   contain `|`
//!
//! There is no framing beyond the datagram boundary and no length prefix.
//! Decoding is deliberately lenient (see [protocol]): numeric fields that do
//! not parse count as 0, over-length fields are truncated to their bounds.
//!
//! ## Structure
//!
//! * [protocol] - pure encode/decode between [protocol::ChatMessage] and the
//!   wire line, no I/O
//! * [transport] - the UDP socket lifecycle: bind, send, blocking receive,
//!   close-as-cancellation
//! * [session] - per-process identity and byte accumulators
//! * [chat_loop] - the orchestrator driving codec, transport and session;
//!   front-ends (console, windowed, ...) plug in through its
//!   [chat_loop::DisplaySink] / [chat_loop::InputSource] seams

pub mod chat_loop;
pub mod config;
pub mod protocol;
pub mod session;
pub mod transport;
