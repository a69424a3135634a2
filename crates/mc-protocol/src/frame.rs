//! Line framing
//!
//! Every server line ends with a single `\n`. Submissions on the send port
//! end with an empty line, so a message goes out as `text\n\n`; an empty
//! submission (`\n\n`) is the heartbeat.

use bytes::{BufMut, BytesMut};

/// Maximum length of a single inbound line before the codec gives up (64KB)
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Decode one raw line from the wire.
///
/// Invalid UTF-8 is replaced rather than rejected. The trailing newline is
/// stripped. An empty byte slice means the peer closed the stream and yields
/// `None`; a bare `\n` yields `Some("")`.
pub fn decode_line(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }

    let text = String::from_utf8_lossy(bytes);
    Some(text.trim_end_matches('\n').to_string())
}

/// Encode a chat submission: trailing newlines of `text` are dropped and
/// exactly two are appended.
pub fn encode_submission(text: &str) -> BytesMut {
    let body = text.trim_end_matches('\n');
    let mut dst = BytesMut::with_capacity(body.len() + 2);
    dst.put_slice(body.as_bytes());
    dst.put_slice(b"\n\n");
    dst
}

/// Encode a single protocol line (credential, nickname)
pub fn encode_line(text: &str) -> BytesMut {
    let body = text.trim_end_matches('\n');
    let mut dst = BytesMut::with_capacity(body.len() + 1);
    dst.put_slice(body.as_bytes());
    dst.put_u8(b'\n');
    dst
}
