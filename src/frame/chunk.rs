//! Chunked framing from RFC 6242 §4.2.
//!
//! A message is a sequence of chunks, each `\n#<len>\n` followed by exactly
//! `len` payload bytes, terminated by `\n##\n`. Chunk headers are consumed
//! transparently; only payload bytes are yielded.

use bytes::{Buf, BytesMut};
use tokio::io::AsyncRead;

use super::fill;
use crate::error::FrameError;

/// End-of-chunks marker closing a message.
pub(super) const END_OF_CHUNKS: &[u8] = b"\n##\n";

/// Largest chunk size allowed by RFC 6242.
const MAX_CHUNK: u64 = 4_294_967_295;

/// Progress of one chunk-framed inbound message.
#[derive(Debug, Default)]
pub(super) struct ChunkState {
    left: u64,
    done: bool,
}

impl ChunkState {
    /// Read payload bytes into `out`. Returns `Ok(0)` once the
    /// end-of-chunks marker has been consumed.
    pub(super) async fn read<R: AsyncRead + Unpin>(
        &mut self,
        inner: &mut R,
        buf: &mut BytesMut,
        out: &mut [u8],
    ) -> Result<usize, FrameError> {
        if self.done || out.is_empty() {
            return Ok(0);
        }

        while self.left == 0 {
            match parse_header(buf)? {
                Some(Header::Chunk { len, consumed }) => {
                    buf.advance(consumed);
                    self.left = len;
                }
                Some(Header::End) => {
                    buf.advance(END_OF_CHUNKS.len());
                    self.done = true;
                    return Ok(0);
                }
                None => {
                    if fill(inner, buf).await? == 0 {
                        return Err(FrameError::UnexpectedEof);
                    }
                }
            }
        }

        if buf.is_empty() && fill(inner, buf).await? == 0 {
            return Err(FrameError::UnexpectedEof);
        }

        let n = (self.left as usize).min(buf.len()).min(out.len());
        out[..n].copy_from_slice(&buf[..n]);
        buf.advance(n);
        self.left -= n as u64;
        Ok(n)
    }

    pub(super) fn is_done(&self) -> bool {
        self.done
    }
}

enum Header {
    Chunk { len: u64, consumed: usize },
    End,
}

/// Decode one chunk header from the front of `buf`.
///
/// `Ok(None)` means the header is incomplete and more input is needed.
fn parse_header(buf: &[u8]) -> Result<Option<Header>, FrameError> {
    if buf.len() < 2 {
        return Ok(None);
    }
    if buf[0] != b'\n' || buf[1] != b'#' {
        return Err(FrameError::MalformedChunk);
    }
    if buf.len() < 3 {
        return Ok(None);
    }

    if buf[2] == b'#' {
        if buf.len() < 4 {
            return Ok(None);
        }
        if buf[3] == b'\n' {
            return Ok(Some(Header::End));
        }
        return Err(FrameError::MalformedChunk);
    }

    let mut len: u64 = 0;
    for (i, &c) in buf[2..].iter().enumerate() {
        if c == b'\n' {
            if len < 1 {
                return Err(FrameError::MalformedChunk);
            }
            return Ok(Some(Header::Chunk {
                len,
                consumed: 2 + i + 1,
            }));
        }
        if !c.is_ascii_digit() {
            return Err(FrameError::MalformedChunk);
        }
        len = len * 10 + u64::from(c - b'0');
        if len > MAX_CHUNK {
            return Err(FrameError::MalformedChunk);
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(input: &[u8]) -> Result<Option<(u64, usize)>, FrameError> {
        parse_header(input).map(|h| {
            h.map(|h| match h {
                Header::Chunk { len, consumed } => (len, consumed),
                Header::End => (0, END_OF_CHUNKS.len()),
            })
        })
    }

    #[test]
    fn test_parse_chunk_header() {
        assert_eq!(header(b"\n#17\npayload").unwrap(), Some((17, 5)));
        assert_eq!(header(b"\n#1\nx").unwrap(), Some((1, 4)));
        assert_eq!(header(b"\n#4294967295\n").unwrap(), Some((4_294_967_295, 13)));
    }

    #[test]
    fn test_parse_end_marker() {
        assert_eq!(header(b"\n##\n").unwrap(), Some((0, 4)));
    }

    #[test]
    fn test_incomplete_header_needs_more() {
        assert_eq!(header(b"").unwrap(), None);
        assert_eq!(header(b"\n").unwrap(), None);
        assert_eq!(header(b"\n#").unwrap(), None);
        assert_eq!(header(b"\n#12").unwrap(), None);
        assert_eq!(header(b"\n##").unwrap(), None);
    }

    #[test]
    fn test_malformed_headers() {
        assert!(matches!(header(b"xy"), Err(FrameError::MalformedChunk)));
        assert!(matches!(header(b"\n#0\n"), Err(FrameError::MalformedChunk)));
        assert!(matches!(header(b"\n#-5\n"), Err(FrameError::MalformedChunk)));
        assert!(matches!(header(b"\n#12a\n"), Err(FrameError::MalformedChunk)));
        // one past the RFC 6242 maximum
        assert!(matches!(
            header(b"\n#4294967296\n"),
            Err(FrameError::MalformedChunk)
        ));
        assert!(matches!(header(b"\n#%\n"), Err(FrameError::MalformedChunk)));
    }
}
