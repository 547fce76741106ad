//! Error types for ferrisconf.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::message::RpcError;

/// Main error type for ferrisconf operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level errors (TCP, SSH, TLS)
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// RFC 6242 framing errors
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Hello exchange failed; no session was established
    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// The server replied with a single `<rpc-error>` of severity `error`
    #[error("rpc error: {0}")]
    Rpc(RpcError),

    /// The server replied with multiple `<rpc-error>`s of severity `error`
    #[error("rpc errors: {}", DisplayErrors(.0))]
    RpcErrors(Vec<RpcError>),

    /// A reply or hello could not be decoded
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// A value failed local validation before anything was written
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// The session closed while the call was waiting for its reply
    #[error("session closed")]
    Closed,
}

struct DisplayErrors<'a>(&'a [RpcError]);

impl fmt::Display for DisplayErrors<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

/// Transport layer errors (TCP connect, SSH/TLS handshake, channel setup).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host
    #[error("connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH protocol error
    #[error("ssh error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// SSH key error
    #[error("ssh key error: {0}")]
    Key(String),

    /// Host key was rejected by the verification policy
    #[error("host key for {host}:{port} not found in known_hosts")]
    HostKeyUnknown { host: String, port: u16 },

    /// Host key changed since it was last recorded
    #[error("host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged {
        host: String,
        port: u16,
        line: usize,
    },

    /// known_hosts file could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Failed to request the `netconf` subsystem on the channel
    #[error("failed to start netconf ssh subsystem")]
    SubsystemFailed,

    /// TLS setup or handshake error
    #[error("tls error: {0}")]
    Tls(String),

    /// Operation timed out
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// RFC 6242 framing errors.
///
/// These are fatal to the session: the receive task exits and all pending
/// requests observe [`Error::Closed`].
#[derive(Error, Debug)]
pub enum FrameError {
    /// A chunk header violated the chunked-framing grammar
    #[error("invalid chunk")]
    MalformedChunk,

    /// The stream ended inside a message
    #[error("unexpected eof")]
    UnexpectedEof,

    /// Operation on an invalidated reader or writer handle
    #[error("invalid io operation on expired frame handle")]
    InvalidIo,

    /// A new message writer was requested while the previous one was never
    /// finished
    #[error("existing message writer still open")]
    ExistingWriter,

    /// I/O error from the underlying stream
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Hello exchange errors.
///
/// Any of these abort `Session::open`; the transport is closed and no
/// session is returned.
#[derive(Error, Debug)]
pub enum HandshakeError {
    /// Server hello could not be parsed
    #[error("failed to parse server hello: {0}")]
    Parse(String),

    /// Server hello carried no session-id (or a zero one)
    #[error("server did not return a session-id")]
    MissingSessionId,

    /// Server hello advertised no capabilities
    #[error("server did not return any capabilities")]
    NoCapabilities,

    /// I/O failure during the hello exchange
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Result type alias using ferrisconf's Error.
pub type Result<T> = std::result::Result<T, Error>;
