//! Line framing for the IRC connection.

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, Framed};
use tracing::warn;

use crate::common::error::ConnectionError;
use crate::protocol::irc::message::IrcMessage;

/// Outbound line limit including the trailing CRLF.
pub const MAX_LINE_LENGTH: usize = 512;

/// Inbound limit: 8191 bytes of message tags plus a standard line.
pub const MAX_INBOUND_LINE_LENGTH: usize = 8191 + MAX_LINE_LENGTH;

/// Codec splitting the stream on `\n` and parsing each line.
///
/// Lines that do not parse (blank keepalives) are skipped. Invalid UTF-8 is
/// decoded lossily since many networks still carry legacy encodings.
#[derive(Debug, Default)]
pub struct IrcCodec {
    /// Index of next byte to check for newline
    next_index: usize,
}

impl IrcCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for IrcCodec {
    type Item = IrcMessage;
    type Error = ConnectionError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                self.next_index = src.len();
                if src.len() > MAX_INBOUND_LINE_LENGTH {
                    return Err(ConnectionError::LineTooLong {
                        limit: MAX_INBOUND_LINE_LENGTH,
                    });
                }
                return Ok(None);
            };

            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;

            let text = String::from_utf8_lossy(&line);
            if let Some(message) = IrcMessage::parse(&text) {
                return Ok(Some(message));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if src.is_empty() => Ok(None),
            None => {
                // Unterminated last line
                let line = src.split_to(src.len());
                self.next_index = 0;
                Ok(IrcMessage::parse(&String::from_utf8_lossy(&line)))
            }
        }
    }
}

impl Encoder<String> for IrcCodec {
    type Error = ConnectionError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        // A stray line break would let text inject a second command
        let mut line = line.replace(['\r', '\n'], " ");

        let limit = MAX_LINE_LENGTH - 2;
        if line.len() > limit {
            warn!("Truncating {}-byte outbound line to {} bytes", line.len(), limit);
            let mut end = limit;
            while !line.is_char_boundary(end) {
                end -= 1;
            }
            line.truncate(end);
        }
        dst.reserve(line.len() + 2);
        dst.put_slice(line.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

impl Encoder<IrcMessage> for IrcCodec {
    type Error = ConnectionError;

    fn encode(&mut self, message: IrcMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        Encoder::<String>::encode(self, message.to_string(), dst)
    }
}

/// A framed IRC connection.
pub type IrcConnection<S> = Framed<S, IrcCodec>;

/// Create a new IRC connection from a stream.
pub fn new_irc_connection<S: AsyncRead + AsyncWrite>(stream: S) -> IrcConnection<S> {
    Framed::new(stream, IrcCodec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_complete_lines() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::from("PING :a\r\n:s 001 me :hi\r\n");

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().command, "PING");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().numeric(), Some(1));
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_partial_line() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::from("PING :");
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"abc\n");
        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg.params, vec!["abc"]);
    }

    #[test]
    fn test_decode_skips_blank_lines() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::from("\r\n\r\nPING :x\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().command, "PING");
    }

    #[test]
    fn test_decode_too_long() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::from(vec![b'a'; MAX_INBOUND_LINE_LENGTH + 1].as_slice());

        let result = codec.decode(&mut buf);
        assert!(matches!(result, Err(ConnectionError::LineTooLong { .. })));
    }

    #[test]
    fn test_decode_lossy_utf8() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::from(&b"PRIVMSG #mc :caf\xe9\r\n"[..]);
        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert!(msg.trailing().unwrap().starts_with("caf"));
    }

    #[test]
    fn test_decode_eof_unterminated() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::from("ERROR :Closing link");
        let msg = codec.decode_eof(&mut buf).unwrap().unwrap();
        assert_eq!(msg.command, "ERROR");
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_encode_strips_line_breaks() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::new();

        codec
            .encode(IrcMessage::privmsg("#mc", "one\r\nQUIT"), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"PRIVMSG #mc :one  QUIT\r\n");
    }

    #[test]
    fn test_encode_truncates_long_lines() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::new();
        let text = "é".repeat(400);

        codec
            .encode(IrcMessage::topic("#mc", Some(&text)), &mut buf)
            .unwrap();
        assert!(buf.len() <= MAX_LINE_LENGTH);
        assert!(buf.ends_with(b"\r\n"));
        assert!(std::str::from_utf8(&buf).is_ok());
    }
}
