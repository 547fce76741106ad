//! RFC 6242 message framing over a raw duplex byte stream.
//!
//! A [`Framer`] wraps the two halves of a transport connection and hands
//! out handles scoped to exactly one NETCONF message each: [`MsgReader`]
//! for one inbound message, [`MsgWriter`] for one outbound message.
//!
//! Framing starts in end-of-message mode (base:1.0) and can be switched to
//! chunked mode (base:1.1) exactly once via [`Framer::upgrade`], which the
//! session does between the hello exchange and the first rpc. The flag is
//! shared by both halves, so the upgrade affects both directions at once.

mod chunk;
mod eom;

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use log::trace;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::FrameError;
use chunk::ChunkState;
use eom::EomState;

const READ_CHUNK: usize = 8 * 1024;

/// Append more raw input to `buf`. Returns the number of bytes read; zero
/// means the underlying stream hit EOF.
async fn fill<R: AsyncRead + Unpin>(
    inner: &mut R,
    buf: &mut BytesMut,
) -> io::Result<usize> {
    buf.reserve(READ_CHUNK);
    inner.read_buf(buf).await
}

/// Framing pair for one connection.
pub struct Framer<R, W> {
    reader: FrameReader<R>,
    writer: FrameWriter<W>,
}

impl<R, W> Framer<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Wrap the read and write halves of a connection. Framing starts in
    /// end-of-message mode.
    pub fn new(read: R, write: W) -> Self {
        let mode = Arc::new(AtomicBool::new(false));
        Self {
            reader: FrameReader {
                inner: read,
                buf: BytesMut::with_capacity(READ_CHUNK),
                mode: mode.clone(),
                state: ReadState::Idle,
            },
            writer: FrameWriter {
                inner: write,
                mode,
                open: false,
            },
        }
    }

    /// Switch from end-of-message to chunked framing, in both directions.
    ///
    /// Must be called after the hello exchange has been fully drained and
    /// before the next message in either direction.
    pub fn upgrade(&self) {
        trace!("framing upgraded to chunked");
        self.reader.mode.store(true, Ordering::Relaxed);
    }

    /// Whether [`upgrade`](Self::upgrade) has been called.
    pub fn is_upgraded(&self) -> bool {
        self.reader.mode.load(Ordering::Relaxed)
    }

    /// A reader bounded to the next inbound message.
    pub async fn msg_reader(&mut self) -> Result<MsgReader<'_, R>, FrameError> {
        self.reader.msg_reader().await
    }

    /// A writer for one outbound message.
    pub fn msg_writer(&mut self) -> Result<MsgWriter<'_, W>, FrameError> {
        self.writer.msg_writer()
    }

    /// Split into independently owned halves, for the receive task and the
    /// send side respectively.
    pub fn into_split(self) -> (FrameReader<R>, FrameWriter<W>) {
        (self.reader, self.writer)
    }
}

#[derive(Debug)]
enum ReadState {
    /// No message has been started since the last one completed.
    Idle,
    Eom(EomState),
    Chunk(ChunkState),
}

impl ReadState {
    fn is_done(&self) -> bool {
        match self {
            ReadState::Idle => true,
            ReadState::Eom(s) => s.is_done(),
            ReadState::Chunk(s) => s.is_done(),
        }
    }
}

/// Read half of a [`Framer`].
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
    mode: Arc<AtomicBool>,
    state: ReadState,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Return a reader bounded to the next inbound message.
    ///
    /// If the previous message was not fully consumed, the stream is first
    /// advanced to the next message boundary, discarding the remainder.
    pub async fn msg_reader(&mut self) -> Result<MsgReader<'_, R>, FrameError> {
        if !self.state.is_done() {
            let mut scratch = [0u8; READ_CHUNK];
            let mut discarded = 0usize;
            loop {
                let n = self.read_msg(&mut scratch).await?;
                if n == 0 {
                    break;
                }
                discarded += n;
            }
            trace!("skipped {discarded} unread bytes to next message boundary");
        }

        self.state = if self.mode.load(Ordering::Relaxed) {
            ReadState::Chunk(ChunkState::default())
        } else {
            ReadState::Eom(EomState::default())
        };

        Ok(MsgReader { fr: self })
    }

    async fn read_msg(&mut self, out: &mut [u8]) -> Result<usize, FrameError> {
        match &mut self.state {
            ReadState::Idle => Ok(0),
            ReadState::Eom(state) => state.read(&mut self.inner, &mut self.buf, out).await,
            ReadState::Chunk(state) => state.read(&mut self.inner, &mut self.buf, out).await,
        }
    }

    /// Consume the reader, returning the underlying stream.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// A read handle covering exactly one inbound message.
///
/// Created by [`FrameReader::msg_reader`]. Dropping it without reading to
/// the end is fine; the next `msg_reader` call skips ahead.
pub struct MsgReader<'a, R> {
    fr: &'a mut FrameReader<R>,
}

impl<R: AsyncRead + Unpin> MsgReader<'_, R> {
    /// Read message bytes into `out`. Returns `Ok(0)` at end-of-message
    /// (or when `out` is empty).
    pub async fn read(&mut self, out: &mut [u8]) -> Result<usize, FrameError> {
        self.fr.read_msg(out).await
    }

    /// Read the whole remaining message, appending to `out`. Returns the
    /// number of bytes appended.
    pub async fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize, FrameError> {
        let mut scratch = [0u8; READ_CHUNK];
        let mut total = 0;
        loop {
            let n = self.read(&mut scratch).await?;
            if n == 0 {
                return Ok(total);
            }
            out.extend_from_slice(&scratch[..n]);
            total += n;
        }
    }
}

/// Write half of a [`Framer`].
pub struct FrameWriter<W> {
    inner: W,
    mode: Arc<AtomicBool>,
    open: bool,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Return a writer for one outbound message.
    ///
    /// Fails with [`FrameError::ExistingWriter`] if a previous writer was
    /// never [`finish`](MsgWriter::finish)ed: the frame on the wire is
    /// unterminated and the connection is unusable for further messages.
    pub fn msg_writer(&mut self) -> Result<MsgWriter<'_, W>, FrameError> {
        if self.open {
            return Err(FrameError::ExistingWriter);
        }
        self.open = true;
        let chunked = self.mode.load(Ordering::Relaxed);
        Ok(MsgWriter {
            fw: self,
            chunked,
            finished: false,
        })
    }

    /// Shut down the underlying write half (closes the peer's read side).
    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.inner.shutdown().await
    }

    /// Consume the writer, returning the underlying stream.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// A write handle covering exactly one outbound message.
///
/// The framing terminator is only emitted by [`finish`](Self::finish);
/// every exit path that sends a message must call it, or the peer will
/// wait forever on a half-framed message.
pub struct MsgWriter<'a, W: AsyncWrite + Unpin> {
    fw: &'a mut FrameWriter<W>,
    chunked: bool,
    finished: bool,
}

impl<W: AsyncWrite + Unpin> MsgWriter<'_, W> {
    /// Write message bytes. In chunked mode each call emits one chunk;
    /// empty writes are skipped (a zero-length chunk is malformed).
    pub async fn write_all(&mut self, data: &[u8]) -> Result<(), FrameError> {
        if self.finished {
            return Err(FrameError::InvalidIo);
        }
        if data.is_empty() {
            return Ok(());
        }
        if self.chunked {
            let header = format!("\n#{}\n", data.len());
            self.fw.inner.write_all(header.as_bytes()).await?;
        }
        self.fw.inner.write_all(data).await?;
        Ok(())
    }

    /// Terminate the message framing and flush.
    ///
    /// End-of-message framing emits a newline before the delimiter but
    /// nothing after it: in a base:1.1 upgrade the byte right after the
    /// hello's delimiter is the `\n` opening the first chunk header, and a
    /// stray trailing newline would corrupt it.
    pub async fn finish(mut self) -> Result<(), FrameError> {
        if self.chunked {
            self.fw.inner.write_all(chunk::END_OF_CHUNKS).await?;
        } else {
            self.fw.inner.write_all(b"\n").await?;
            self.fw.inner.write_all(eom::DELIM).await?;
        }
        self.fw.inner.flush().await?;
        self.finished = true;
        self.fw.open = false;
        Ok(())
    }
}
