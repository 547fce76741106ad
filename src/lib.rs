//! # Ferrisconf
//!
//! Async NETCONF 1.0/1.1 client library for network device automation,
//! implementing the RFC 6241 protocol over the RFC 6242 SSH transport
//! (subsystem `netconf`) or TLS (RFC 7589).
//!
//! ## Features
//!
//! - Async SSH connections via russh, TLS via tokio-rustls
//! - Both RFC 6242 framings: end-of-message (base:1.0) and chunked
//!   (base:1.1), with automatic upgrade during the hello exchange
//! - Concurrent RPCs on one session, correlated by message-id
//! - Typed builders for the standard operations (`get-config`,
//!   `edit-config`, `commit`, ...) plus a raw XML escape hatch
//! - Decoded `<rpc-error>`s with the full RFC 6241 error taxonomy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ferrisconf::{Datastore, Session, SshConfig, SshTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ferrisconf::Error> {
//!     let config = SshConfig::new("192.0.2.1", "admin").password("secret");
//!     let transport = SshTransport::dial(config).await?;
//!
//!     let session = Session::open(transport).await?;
//!     println!("session {} established", session.session_id());
//!
//!     let running = session.get_config(Datastore::Running).await?;
//!     println!("{}", String::from_utf8_lossy(&running));
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```

pub mod capabilities;
pub mod error;
pub mod frame;
pub mod message;
pub mod ops;
pub mod session;
pub mod transport;
pub mod xml;

// Re-export main types for convenience
pub use capabilities::{CapabilitySet, DEFAULT_CAPABILITIES};
pub use error::{Error, FrameError, HandshakeError, Result, TransportError};
pub use message::{ErrorSeverity, ErrorTag, ErrorType, RpcError, RpcReplyMsg};
pub use ops::{
    CancelCommit, Commit, CopyConfig, Datastore, DeleteConfig, EditConfig, ErrorStrategy,
    Filter, Get, GetConfig, KillSession, Lock, MergeStrategy, Store, TestStrategy, Unlock, Url,
    Validate,
};
pub use session::{Session, SessionBuilder};
pub use transport::{
    AuthMethod, HostKeyVerification, SshConfig, SshTransport, StreamTransport, TlsConfig,
    TlsTransport, Transport,
};
pub use xml::{FromXml, ToXml};
