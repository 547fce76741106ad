//! Transports providing the authenticated duplex byte stream a session
//! frames NETCONF messages over.
//!
//! Transports know nothing about NETCONF semantics. They decompose into a
//! raw read half, a raw write half, and a close handle; the session wraps
//! the halves in a [`Framer`](crate::frame::Framer) and keeps the handle
//! for teardown.

mod config;
mod ssh;
mod tls;

pub use config::{
    AuthMethod, HostKeyVerification, SshConfig, TlsConfig, DEFAULT_SSH_PORT, DEFAULT_TLS_PORT,
};
pub use ssh::SshTransport;
pub use tls::TlsTransport;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::TransportError;

/// Boxed read half of a transport connection.
pub type BoxRead = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed write half of a transport connection.
pub type BoxWrite = Box<dyn AsyncWrite + Send + Unpin>;

/// An authenticated duplex byte stream ready for NETCONF framing.
pub trait Transport: Send + 'static {
    /// Decompose into raw halves plus the close handle.
    fn into_parts(self) -> (BoxRead, BoxWrite, Box<dyn TransportHandle>);
}

/// Handle used to tear down the connection behind a transport after its
/// I/O halves have been handed to the session.
#[async_trait]
pub trait TransportHandle: Send {
    /// Close the underlying connection. Shutting down the write half has
    /// already happened by the time this is called.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Transport over any pre-established duplex stream (used by tests; also
/// handy for tunneled or in-process connections).
pub struct StreamTransport<S> {
    stream: S,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }
}

impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    fn into_parts(self) -> (BoxRead, BoxWrite, Box<dyn TransportHandle>) {
        let (read, write) = tokio::io::split(self.stream);
        (Box::new(read), Box::new(write), Box::new(NoopHandle))
    }
}

struct NoopHandle;

#[async_trait]
impl TransportHandle for NoopHandle {
    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}
