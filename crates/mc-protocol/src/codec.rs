//! Tokio codec for the chat line protocol

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::frame::{decode_line, encode_line, encode_submission, MAX_LINE_LENGTH};

/// A frame written to the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// A single protocol line terminated by `\n`
    Line(String),
    /// A chat submission terminated by an empty line
    Submission(String),
}

impl Outgoing {
    /// The empty submission used to keep the send channel alive
    pub fn heartbeat() -> Self {
        Outgoing::Submission(String::new())
    }
}

/// Codec for decoding server lines and encoding client frames
#[derive(Debug)]
pub struct ChatCodec {
    /// Offset already scanned for a newline
    next_index: usize,
    /// Upper bound for a single line
    max_line_length: usize,
}

impl Default for ChatCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatCodec {
    /// Create a new codec with the default line limit
    pub fn new() -> Self {
        Self::with_max_line_length(MAX_LINE_LENGTH)
    }

    /// Create a codec with a custom line limit
    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            next_index: 0,
            max_line_length,
        }
    }
}

impl Decoder for ChatCodec {
    type Item = String;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let newline = src[self.next_index..]
            .iter()
            .position(|b| *b == b'\n')
            .map(|offset| self.next_index + offset);

        match newline {
            Some(index) => {
                self.next_index = 0;
                let line = src.split_to(index + 1);
                Ok(decode_line(&line))
            }
            None if src.len() > self.max_line_length => Err(ProtocolError::LineTooLong {
                len: src.len(),
                max: self.max_line_length,
            }),
            None => {
                // Need more data
                self.next_index = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }

        // The peer closed mid-line: hand over what arrived, like readline does
        self.next_index = 0;
        if src.is_empty() {
            return Ok(None);
        }
        let rest = src.split_to(src.len());
        tracing::trace!("Delivering {} unterminated bytes at end of stream", rest.len());
        Ok(decode_line(&rest))
    }
}

impl Encoder<Outgoing> for ChatCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Outgoing, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let encoded = match frame {
            Outgoing::Line(text) => encode_line(&text),
            Outgoing::Submission(text) => encode_submission(&text),
        };
        dst.extend_from_slice(&encoded);
        Ok(())
    }
}
