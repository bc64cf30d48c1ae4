//! Line framing for the chat protocol.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

/// Longest inbound line accepted, terminator included.
pub const MAX_LINE_BYTES: usize = 8 * 1024;

/// Splits a byte stream into protocol lines and terminates outbound lines.
///
/// Inbound lines end at `\n`; a trailing `\r` is stripped. Bytes that are not
/// valid UTF-8 are replaced rather than rejected. A line longer than
/// [`MAX_LINE_BYTES`] is dropped whole and decoding resumes after its end.
#[derive(Debug, Default)]
pub struct LineCodec {
    /// Bytes of the buffer already scanned for a terminator.
    scanned: usize,
    /// Inside an oversized line that is being skipped.
    discarding: bool,
}

impl LineCodec {
    /// Creates a codec.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        loop {
            let found = buf[self.scanned..].iter().position(|b| *b == b'\n');
            match (found, self.discarding) {
                (Some(offset), true) => {
                    buf.advance(self.scanned + offset + 1);
                    self.scanned = 0;
                    self.discarding = false;
                }
                (Some(offset), false) => {
                    let end = self.scanned + offset;
                    self.scanned = 0;
                    let line = buf.split_to(end + 1);
                    if end + 1 > MAX_LINE_BYTES {
                        warn!(len = end + 1, "Dropping oversized line");
                        continue;
                    }
                    let mut line = &line[..end];
                    if let Some(stripped) = line.strip_suffix(b"\r") {
                        line = stripped;
                    }
                    return Ok(Some(String::from_utf8_lossy(line).into_owned()));
                }
                (None, true) => {
                    buf.clear();
                    self.scanned = 0;
                    return Ok(None);
                }
                (None, false) => {
                    if buf.len() > MAX_LINE_BYTES {
                        warn!(len = buf.len(), "Dropping oversized line");
                        buf.clear();
                        self.scanned = 0;
                        self.discarding = true;
                        return Ok(None);
                    }
                    self.scanned = buf.len();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        if buf.is_empty() || self.discarding {
            buf.clear();
            return Ok(None);
        }
        // Unterminated final line.
        let rest = buf.split();
        self.scanned = 0;
        let line = rest.strip_suffix(b"\r").unwrap_or(&rest[..]);
        Ok(Some(String::from_utf8_lossy(line).into_owned()))
    }
}

impl Encoder<String> for LineCodec {
    type Error = std::io::Error;

    fn encode(&mut self, line: String, buf: &mut BytesMut) -> Result<(), Self::Error> {
        buf.reserve(line.len() + 2);
        buf.put_slice(line.as_bytes());
        buf.put_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut LineCodec, buf: &mut BytesMut) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = codec.decode(buf).unwrap() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_decodes_crlf_and_bare_lf() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"PING :a\r\nPING :b\nPART"[..]);
        assert_eq!(decode_all(&mut codec, &mut buf), vec!["PING :a", "PING :b"]);
        assert_eq!(&buf[..], b"PART");
    }

    #[test]
    fn test_line_split_across_reads() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b":srv 001 bot :Wel"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"come\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), ":srv 001 bot :Welcome");
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"PRIVMSG #c :caf\xe9\r\n"[..]);
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(line, "PRIVMSG #c :caf\u{fffd}");
    }

    #[test]
    fn test_oversized_line_is_skipped() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&vec![b'x'; MAX_LINE_BYTES + 10]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"tail of the long line\r\nPING :ok\r\n");
        assert_eq!(decode_all(&mut codec, &mut buf), vec!["PING :ok"]);
    }

    #[test]
    fn test_unterminated_line_at_eof() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"ERROR :Closing link"[..]);
        assert_eq!(
            codec.decode_eof(&mut buf).unwrap().unwrap(),
            "ERROR :Closing link"
        );
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_encode_appends_crlf() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();
        codec.encode("NICK relay".to_string(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"NICK relay\r\n");
    }
}
