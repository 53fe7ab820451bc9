//! Per-process session state: who we are, when the chat started, and the
//! two running byte counters. Pure data - the counters are private and only
//! grow through [ChatSession::record_sent] / [ChatSession::record_received],
//! which the chat loop alone calls.

use std::time::SystemTime;

use anyhow::Context;

use crate::protocol::{truncate_to_bound, MAX_HOSTNAME_LEN, MAX_USERNAME_LEN};

#[derive(Debug)]
pub struct ChatSession {
    pub username: String,
    pub hostname: String,
    /// seconds since the epoch, fixed at construction
    pub start_time: u64,
    bytes_sent: u64,
    bytes_received: u64,
}

impl ChatSession {
    /// Captures the chat start time and the local identity, truncated to the
    ///  wire bounds so every outgoing message encodes cleanly.
    pub fn new(username: &str, hostname: &str) -> anyhow::Result<ChatSession> {
        let start_time = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .context("system clock is before the UNIX epoch")?
            .as_secs();

        Ok(ChatSession {
            username: truncate_to_bound(username, MAX_USERNAME_LEN).to_string(),
            hostname: truncate_to_bound(hostname, MAX_HOSTNAME_LEN).to_string(),
            start_time,
            bytes_sent: 0,
            bytes_received: 0,
        })
    }

    pub fn record_sent(&mut self, num_bytes: u64) {
        self.bytes_sent += num_bytes;
    }

    pub fn record_received(&mut self, num_bytes: u64) {
        self.bytes_received += num_bytes;
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }
}


#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::empty(&[], 0)]
    #[case::single(&[5], 5)]
    #[case::accumulating(&[5, 0, 7, 1024], 1036)]
    fn test_counters_accumulate(#[case] lengths: &[u64], #[case] expected: u64) {
        let mut session = ChatSession::new("alice", "host1").unwrap();

        for n in lengths {
            session.record_sent(*n);
            session.record_received(*n);
        }
        assert_eq!(session.bytes_sent(), expected);
        assert_eq!(session.bytes_received(), expected);
    }

    #[test]
    fn test_identity_is_truncated_to_wire_bounds() {
        let long_name = "u".repeat(MAX_USERNAME_LEN + 30);
        let long_host = "h".repeat(MAX_HOSTNAME_LEN + 1);

        let session = ChatSession::new(&long_name, &long_host).unwrap();
        assert_eq!(session.username, "u".repeat(MAX_USERNAME_LEN));
        assert_eq!(session.hostname, "h".repeat(MAX_HOSTNAME_LEN));
        assert!(session.start_time > 0);
    }
}
