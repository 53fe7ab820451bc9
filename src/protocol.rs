//! The message codec: pure translation between [ChatMessage] and the
//! delimited wire line, without any I/O.
//!
//! Decoding is best-effort by design - UDP delivers whatever it delivers,
//! including truncated datagrams, so the decoder tolerates everything short
//! of structurally missing fields: numeric fields that do not parse as a
//! full decimal number decode as 0, and over-length fields are silently cut
//! down to their documented bounds. Encoding on the other hand is strict:
//! fields must respect their bounds, and a delimiter inside username or
//! hostname is rejected outright since it would shift all following fields
//! on the receiving side.

use anyhow::bail;
use bytes::{BufMut, BytesMut};

pub const MAX_MESSAGE_LEN: usize = 1024;
pub const MAX_USERNAME_LEN: usize = 64;
pub const MAX_HOSTNAME_LEN: usize = 64;

/// Size of send / receive buffers - comfortably above the biggest
///  well-formed encoding (fields at their bounds plus two 20-digit numbers
///  and four delimiters).
pub const MAX_DATAGRAM_LEN: usize = 2048;

pub const FIELD_DELIMITER: u8 = b'|';


/// One chat message as it travels on the wire. Instances are ephemeral,
///  constructed for a single send or receive and discarded afterwards.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ChatMessage {
    pub username: String,
    pub hostname: String,
    /// seconds since the epoch, fixed at session start
    pub chat_start_time: u64,
    /// the sender's cumulative sent-byte count at the time of sending
    pub bytes_sent: u64,
    pub message_text: String,
}

impl ChatMessage {
    /// Appends the wire encoding to `buf`. Fails if the encoding would
    ///  exceed [MAX_DATAGRAM_LEN], if a field exceeds its bound, or if
    ///  username / hostname contain the field delimiter.
    pub fn encode(&self, buf: &mut BytesMut) -> anyhow::Result<()> {
        if self.encoded_len() > MAX_DATAGRAM_LEN {
            bail!("encoded message exceeds {} bytes", MAX_DATAGRAM_LEN);
        }
        if self.username.len() > MAX_USERNAME_LEN {
            bail!("username exceeds {} bytes", MAX_USERNAME_LEN);
        }
        if self.hostname.len() > MAX_HOSTNAME_LEN {
            bail!("hostname exceeds {} bytes", MAX_HOSTNAME_LEN);
        }
        if self.message_text.len() > MAX_MESSAGE_LEN {
            bail!("message text exceeds {} bytes", MAX_MESSAGE_LEN);
        }
        if self.username.as_bytes().contains(&FIELD_DELIMITER)
            || self.hostname.as_bytes().contains(&FIELD_DELIMITER)
        {
            bail!("field delimiter '{}' in username or hostname", FIELD_DELIMITER as char);
        }

        buf.put_slice(self.username.as_bytes());
        buf.put_u8(FIELD_DELIMITER);
        buf.put_slice(self.hostname.as_bytes());
        buf.put_u8(FIELD_DELIMITER);
        buf.put_slice(self.chat_start_time.to_string().as_bytes());
        buf.put_u8(FIELD_DELIMITER);
        buf.put_slice(self.bytes_sent.to_string().as_bytes());
        buf.put_u8(FIELD_DELIMITER);
        buf.put_slice(self.message_text.as_bytes());
        Ok(())
    }

    pub fn encoded_len(&self) -> usize {
        self.username.len()
            + self.hostname.len()
            + decimal_len(self.chat_start_time)
            + decimal_len(self.bytes_sent)
            + self.message_text.len()
            + 4
    }

    /// Decodes one received datagram. The input is borrowed and never
    ///  mutated, so repeated decodes of the same buffer are safe.
    ///
    /// Fails only if fewer than five delimited fields are present, i.e. if
    ///  the line has fewer than four delimiters. An empty string after the
    ///  last delimiter is a valid (empty) message text.
    pub fn decode(raw: &[u8]) -> anyhow::Result<ChatMessage> {
        let mut fields = raw.splitn(5, |b| *b == FIELD_DELIMITER);

        let mut next = |name: &str| match fields.next() {
            Some(f) => Ok(f),
            None => Err(anyhow::anyhow!("{} field missing", name)),
        };

        let username = bounded_lossy(next("username")?, MAX_USERNAME_LEN);
        let hostname = bounded_lossy(next("hostname")?, MAX_HOSTNAME_LEN);
        let chat_start_time = lenient_u64(next("chat start time")?);
        let bytes_sent = lenient_u64(next("bytes sent")?);
        let message_text = bounded_lossy(next("message text")?, MAX_MESSAGE_LEN);

        Ok(ChatMessage {
            username,
            hostname,
            chat_start_time,
            bytes_sent,
            message_text,
        })
    }
}

fn decimal_len(n: u64) -> usize {
    n.to_string().len()
}

/// Documented wire leniency: anything that is not a full decimal number
///  (including a truncated one) counts as 0 rather than failing the decode.
fn lenient_u64(raw: &[u8]) -> u64 {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

/// Truncates to at most `max_len` bytes, then converts lossily - incoming
///  datagrams are byte strings with no UTF-8 guarantee. A replacement char
///  substituted for a truncated multibyte sequence is wider than the bytes
///  it replaces, so the bound is re-applied after the conversion.
fn bounded_lossy(raw: &[u8], max_len: usize) -> String {
    let raw = if raw.len() > max_len { &raw[..max_len] } else { raw };
    let mut s = String::from_utf8_lossy(raw).into_owned();
    if s.len() > max_len {
        let end = truncate_to_bound(&s, max_len).len();
        s.truncate(end);
    }
    s
}

/// Longest prefix of `s` that is at most `max_len` bytes and ends on a char
///  boundary.
pub fn truncate_to_bound(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}


#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use rstest::rstest;

    use super::*;

    fn msg(username: &str, hostname: &str, chat_start_time: u64, bytes_sent: u64, message_text: &str) -> ChatMessage {
        ChatMessage {
            username: username.to_string(),
            hostname: hostname.to_string(),
            chat_start_time,
            bytes_sent,
            message_text: message_text.to_string(),
        }
    }

    #[rstest]
    #[case::simple(msg("alice", "host1", 1735689600, 5, "hello"))]
    #[case::empty_text(msg("alice", "host1", 1735689600, 0, ""))]
    #[case::delimiter_in_text(msg("bob", "h", 1, 17, "a|b||c"))]
    #[case::max_len_text(msg("bob", "h", 77, 1024, &"x".repeat(MAX_MESSAGE_LEN)))]
    #[case::zero_numbers(msg("u", "h", 0, 0, "?"))]
    fn test_encode_decode_round_trip(#[case] message: ChatMessage) {
        let mut buf = BytesMut::new();
        message.encode(&mut buf).unwrap();

        assert_eq!(buf.len(), message.encoded_len());
        assert_eq!(ChatMessage::decode(&buf).unwrap(), message);
    }

    #[rstest]
    #[case::all_fields(b"alice|host1|100|5|hello", Some(msg("alice", "host1", 100, 5, "hello")))]
    #[case::empty_trailing_text(b"alice|host1|100|5|", Some(msg("alice", "host1", 100, 5, "")))]
    #[case::text_keeps_delimiters(b"a|b|1|2|x|y|z", Some(msg("a", "b", 1, 2, "x|y|z")))]
    #[case::empty_identity(b"||1|2|hi", Some(msg("", "", 1, 2, "hi")))]
    #[case::unparseable_numbers(b"alice|host1|abc|1x2|hi", Some(msg("alice", "host1", 0, 0, "hi")))]
    #[case::negative_number(b"alice|host1|-5|3|hi", Some(msg("alice", "host1", 0, 3, "hi")))]
    #[case::text_missing(b"alice|host1|100|5", None)]
    #[case::three_fields(b"alice|host1|100", None)]
    #[case::no_delimiters(b"alice", None)]
    #[case::empty(b"", None)]
    fn test_decode(#[case] raw: &[u8], #[case] expected: Option<ChatMessage>) {
        match ChatMessage::decode(raw) {
            Ok(actual) => assert_eq!(actual, expected.unwrap()),
            Err(e) => {
                println!("{}", e);
                assert!(expected.is_none());
            }
        }
    }

    #[test]
    fn test_decode_truncates_overlong_fields() {
        let mut raw = Vec::new();
        raw.extend_from_slice("u".repeat(MAX_USERNAME_LEN + 7).as_bytes());
        raw.push(b'|');
        raw.extend_from_slice("h".repeat(MAX_HOSTNAME_LEN + 1).as_bytes());
        raw.extend_from_slice(b"|123|456|");
        raw.extend_from_slice("m".repeat(MAX_MESSAGE_LEN + 300).as_bytes());

        let decoded = ChatMessage::decode(&raw).unwrap();
        assert_eq!(decoded.username, "u".repeat(MAX_USERNAME_LEN));
        assert_eq!(decoded.hostname, "h".repeat(MAX_HOSTNAME_LEN));
        assert_eq!(decoded.chat_start_time, 123);
        assert_eq!(decoded.bytes_sent, 456);
        assert_eq!(decoded.message_text, "m".repeat(MAX_MESSAGE_LEN));
    }

    #[test]
    fn test_lossy_replacement_does_not_exceed_field_bound() {
        // message text of exactly the bound, ending in two bytes of a
        //  three-byte char: the replacement char for the dangling sequence
        //  is three bytes wide, which must not push the field past its bound
        let mut raw = Vec::new();
        raw.extend_from_slice(b"alice|host1|100|5|");
        raw.extend_from_slice("m".repeat(MAX_MESSAGE_LEN - 2).as_bytes());
        raw.extend_from_slice(&"\u{20ac}".as_bytes()[..2]);

        let decoded = ChatMessage::decode(&raw).unwrap();
        assert!(decoded.message_text.len() <= MAX_MESSAGE_LEN);
        assert!(decoded.message_text.starts_with(&"m".repeat(MAX_MESSAGE_LEN - 2)));
    }

    #[test]
    fn test_decode_does_not_consume_input() {
        let raw: &[u8] = b"alice|host1|100|5|hello";
        let first = ChatMessage::decode(raw).unwrap();
        let second = ChatMessage::decode(raw).unwrap();
        assert_eq!(first, second);
        assert_eq!(raw, b"alice|host1|100|5|hello");
    }

    #[test]
    fn test_decode_non_utf8_is_lossy_not_fatal() {
        let decoded = ChatMessage::decode(b"alice|host1|100|5|he\xff\xfello").unwrap();
        assert_eq!(decoded.username, "alice");
        assert!(decoded.message_text.starts_with("he"));
        assert!(decoded.message_text.ends_with("llo"));
    }

    #[rstest]
    #[case::delimiter_in_username(msg("al|ice", "host1", 1, 2, "hi"))]
    #[case::delimiter_in_hostname(msg("alice", "ho|st", 1, 2, "hi"))]
    #[case::overlong_username(msg(&"u".repeat(MAX_USERNAME_LEN + 1), "host1", 1, 2, "hi"))]
    #[case::overlong_hostname(msg("alice", &"h".repeat(MAX_HOSTNAME_LEN + 1), 1, 2, "hi"))]
    #[case::overlong_text(msg("alice", "host1", 1, 2, &"m".repeat(MAX_MESSAGE_LEN + 1)))]
    #[case::over_capacity(msg("alice", "host1", 1, 2, &"m".repeat(MAX_DATAGRAM_LEN)))]
    fn test_encode_rejects(#[case] message: ChatMessage) {
        let mut buf = BytesMut::new();
        assert!(message.encode(&mut buf).is_err());
    }

    #[rstest]
    #[case::shorter("hello", 10, "hello")]
    #[case::exact("hello", 5, "hello")]
    #[case::cut("hello", 3, "hel")]
    #[case::multibyte_boundary("h\u{e9}llo", 2, "h")]
    #[case::empty("", 4, "")]
    fn test_truncate_to_bound(#[case] s: &str, #[case] max_len: usize, #[case] expected: &str) {
        assert_eq!(truncate_to_bound(s, max_len), expected);
    }
}
