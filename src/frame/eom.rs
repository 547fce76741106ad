//! End-of-message framing from RFC 6242 §4.1.
//!
//! A message is terminated by the literal six-byte sequence `]]>]]>`. The
//! delimiter is consumed but never yielded to the caller. A partial
//! delimiter inside the payload must not terminate the message, so the
//! scanner always withholds the last five buffered bytes until more input
//! arrives.

use bytes::{Buf, BytesMut};
use tokio::io::AsyncRead;

use super::fill;
use crate::error::FrameError;

/// The end-of-message delimiter.
pub(super) const DELIM: &[u8] = b"]]>]]>";

/// Progress of one EOM-framed inbound message.
#[derive(Debug, Default)]
pub(super) struct EomState {
    done: bool,
}

impl EomState {
    /// Read message bytes into `out`. Returns `Ok(0)` once the delimiter
    /// has been consumed.
    pub(super) async fn read<R: AsyncRead + Unpin>(
        &mut self,
        inner: &mut R,
        buf: &mut BytesMut,
        out: &mut [u8],
    ) -> Result<usize, FrameError> {
        if self.done || out.is_empty() {
            return Ok(0);
        }

        loop {
            if let Some(at) = find_delim(buf) {
                if at == 0 {
                    buf.advance(DELIM.len());
                    self.done = true;
                    return Ok(0);
                }
                let n = at.min(out.len());
                out[..n].copy_from_slice(&buf[..n]);
                buf.advance(n);
                return Ok(n);
            }

            // Everything except a possible delimiter prefix at the tail is
            // safe to hand out.
            let safe = buf.len().saturating_sub(DELIM.len() - 1);
            if safe > 0 {
                let n = safe.min(out.len());
                out[..n].copy_from_slice(&buf[..n]);
                buf.advance(n);
                return Ok(n);
            }

            if fill(inner, buf).await? == 0 {
                return Err(FrameError::UnexpectedEof);
            }
        }
    }

    pub(super) fn is_done(&self) -> bool {
        self.done
    }
}

fn find_delim(buf: &[u8]) -> Option<usize> {
    if buf.len() < DELIM.len() {
        return None;
    }
    buf.windows(DELIM.len()).position(|w| w == DELIM)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_delim() {
        assert_eq!(find_delim(b"foo]]>]]>"), Some(3));
        assert_eq!(find_delim(b"]]>]]>"), Some(0));
        assert_eq!(find_delim(b"foo]]>]]"), None);
        assert_eq!(find_delim(b"no delimiter here"), None);
    }
}
