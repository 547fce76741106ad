//! NETCONF session: handshake, request/reply correlation, typed
//! operations, and shutdown.
//!
//! A [`Session`] owns the framed transport. One background task reads
//! inbound messages and routes `<rpc-reply>`s by message-id to the caller
//! awaiting on the matching oneshot slot, so any number of requests can be
//! in flight concurrently. Cancellation is by dropping the call future
//! (wrap calls in `tokio::time::timeout` for deadlines); the request stays
//! outstanding on the server and its late reply is silently dropped.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, trace, warn};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::capabilities::{CapabilitySet, BASE_1_1, DEFAULT_CAPABILITIES};
use crate::error::{Error, FrameError, HandshakeError, Result};
use crate::frame::{FrameReader, FrameWriter, Framer};
use crate::message::{sniff_root, HelloMsg, RootElement, RpcMsg, RpcReplyMsg};
use crate::ops::{
    CancelCommit, CloseSession, Commit, CopyConfig, DataReply, Datastore, DeleteConfig,
    EditConfig, Get, GetConfig, KillSession, Lock, Store, Unlock, Validate,
};
use crate::transport::{BoxRead, BoxWrite, Transport, TransportHandle};
use crate::xml::{FromXml, ToXml};

/// Builder for session options.
///
/// The default capability set is `{base:1.0, base:1.1}`; additional
/// capabilities are advertised on top of it.
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    capabilities: CapabilitySet,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            capabilities: DEFAULT_CAPABILITIES.iter().collect(),
        }
    }

    /// Advertise an additional client capability. Shorthand starting with
    /// `:` is expanded to the standard prefix.
    pub fn with_capability(mut self, uri: impl AsRef<str>) -> Self {
        self.capabilities.add(uri.as_ref());
        self
    }

    /// Advertise several additional client capabilities.
    pub fn with_capabilities<S: AsRef<str>>(mut self, uris: impl IntoIterator<Item = S>) -> Self {
        for uri in uris {
            self.capabilities.add(uri.as_ref());
        }
        self
    }

    /// Open a session over the given transport: exchange hellos, upgrade
    /// framing if both sides support base:1.1, and start the receive task.
    pub async fn open<T: Transport>(self, transport: T) -> Result<Session> {
        let (read, write, mut handle) = transport.into_parts();
        let mut framer = Framer::new(read, write);

        let server_hello = match handshake(&mut framer, &self.capabilities).await {
            Ok(hello) => hello,
            Err(e) => {
                // no session comes back, so tear the transport down here
                let _ = handle.close().await;
                return Err(e.into());
            }
        };

        let session_id = match server_hello.session_id {
            Some(id) if id != 0 => id,
            _ => {
                let _ = handle.close().await;
                return Err(HandshakeError::MissingSessionId.into());
            }
        };
        if server_hello.capabilities.is_empty() {
            let _ = handle.close().await;
            return Err(HandshakeError::NoCapabilities.into());
        }

        let server_caps: CapabilitySet = server_hello.capabilities.iter().collect();

        // Upgrading here, after the hello exchange drained the server hello
        // and before the receive task exists, totally orders the framing
        // flip against every other message.
        if server_caps.has(BASE_1_1) && self.capabilities.has(BASE_1_1) {
            framer.upgrade();
            debug!("session {session_id}: upgraded to chunked framing");
        }

        let (reader, writer) = framer.into_split();
        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            closing: AtomicBool::new(false),
        });

        let recv_task = tokio::spawn(recv_loop(reader, shared.clone()));

        debug!("session {session_id} established");

        Ok(Session {
            session_id,
            client_caps: self.capabilities,
            server_caps,
            shared,
            send: AsyncMutex::new(SendHalf { seq: 0, writer }),
            handle: AsyncMutex::new(handle),
            _recv_task: recv_task,
        })
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

async fn handshake(
    framer: &mut Framer<BoxRead, BoxWrite>,
    client_caps: &CapabilitySet,
) -> std::result::Result<HelloMsg, HandshakeError> {
    let hello = HelloMsg {
        session_id: None,
        capabilities: client_caps.all(),
    };

    let mut w = framer.msg_writer()?;
    w.write_all(hello.encode().as_bytes()).await?;
    w.finish().await?;

    let mut buf = Vec::new();
    framer.msg_reader().await?.read_to_end(&mut buf).await?;

    HelloMsg::parse(&buf)
}

struct Shared {
    /// Outstanding requests: message-id to the slot its reply goes to.
    pending: Mutex<HashMap<u64, oneshot::Sender<RpcReplyMsg>>>,
    closing: AtomicBool,
}

struct SendHalf {
    seq: u64,
    writer: FrameWriter<BoxWrite>,
}

/// Removes the pending-table entry if the owning call never completed,
/// which is exactly the dropped-future cancellation path.
struct PendingGuard<'a> {
    shared: &'a Shared,
    message_id: u64,
    armed: bool,
}

impl PendingGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let removed = self
                .shared
                .pending
                .lock()
                .unwrap()
                .remove(&self.message_id)
                .is_some();
            if removed {
                debug!("request {} canceled before its reply arrived", self.message_id);
            }
        }
    }
}

/// An open NETCONF session.
pub struct Session {
    session_id: u64,
    client_caps: CapabilitySet,
    server_caps: CapabilitySet,
    shared: Arc<Shared>,
    send: AsyncMutex<SendHalf>,
    handle: AsyncMutex<Box<dyn TransportHandle>>,
    _recv_task: JoinHandle<()>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("client_caps", &self.client_caps)
            .field("server_caps", &self.server_caps)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Open a session with the default options.
    pub async fn open<T: Transport>(transport: T) -> Result<Session> {
        SessionBuilder::new().open(transport).await
    }

    /// Options builder for [`open`](Self::open).
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// The session id assigned by the server's hello. Never zero.
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Capabilities this client advertised.
    pub fn client_capabilities(&self) -> Vec<String> {
        self.client_caps.all()
    }

    /// Capabilities the server advertised.
    pub fn server_capabilities(&self) -> Vec<String> {
        self.server_caps.all()
    }

    /// Whether the server advertised the given capability. Shorthand
    /// starting with `:` is expanded before the lookup.
    pub fn server_has_capability(&self, uri: &str) -> bool {
        self.server_caps.has(uri)
    }

    /// Issue a low-level RPC and return the raw reply, whether or not it
    /// carries errors.
    ///
    /// Dropping the returned future cancels the wait (not the request:
    /// that is already on the wire, and its eventual reply is discarded).
    pub async fn rpc<O: ToXml>(&self, op: &O) -> Result<RpcReplyMsg> {
        self.do_rpc(op, false).await
    }

    /// Issue an RPC and decode the reply into `R`.
    ///
    /// A single severity=error `<rpc-error>` is returned as
    /// [`Error::Rpc`], several as [`Error::RpcErrors`]. Warnings never
    /// fail the call.
    pub async fn call<R, O>(&self, op: &O) -> Result<R>
    where
        R: FromXml,
        O: ToXml,
    {
        self.call_inner(op, false).await
    }

    async fn do_rpc<O: ToXml>(&self, op: &O, when_closing: bool) -> Result<RpcReplyMsg> {
        if !when_closing && self.shared.closing.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }

        let (tx, rx) = oneshot::channel();

        let mut send = self.send.lock().await;
        send.seq += 1;
        let message_id = send.seq;

        // Serialize up front: local validation failures must leave the
        // wire untouched and nothing registered.
        let payload = RpcMsg {
            message_id,
            operation: op,
        }
        .encode()?;

        let guard = PendingGuard {
            shared: self.shared.as_ref(),
            message_id,
            armed: true,
        };
        self.shared
            .pending
            .lock()
            .unwrap()
            .insert(message_id, tx);

        trace!("sending rpc message-id={message_id} ({} bytes)", payload.len());

        let write_result = async {
            let mut w = send.writer.msg_writer()?;
            w.write_all(payload.as_bytes()).await?;
            w.finish().await
        }
        .await;
        drop(send);

        if let Err(e) = write_result {
            // guard cleans the pending entry on return
            return Err(e.into());
        }

        match rx.await {
            Ok(reply) => {
                guard.disarm();
                Ok(reply)
            }
            Err(_) => {
                // receive loop shut down and dropped the slot
                guard.disarm();
                Err(Error::Closed)
            }
        }
    }

    async fn call_inner<R, O>(&self, op: &O, when_closing: bool) -> Result<R>
    where
        R: FromXml,
        O: ToXml,
    {
        let reply = self.do_rpc(op, when_closing).await?;

        let mut errors: Vec<_> = reply.severity_errors().into_iter().cloned().collect();
        match errors.len() {
            0 => R::from_xml(&reply.body),
            1 => Err(Error::Rpc(errors.pop().unwrap())),
            _ => Err(Error::RpcErrors(errors)),
        }
    }

    /// `<get-config>`: the configuration of `source`, as the raw inner XML
    /// of `<data>`.
    pub async fn get_config(&self, source: Datastore) -> Result<Vec<u8>> {
        self.get_config_with(GetConfig::new(source)).await
    }

    /// `<get-config>` with a filter.
    pub async fn get_config_with(&self, op: GetConfig) -> Result<Vec<u8>> {
        Ok(self.call::<DataReply, _>(&op).await?.inner)
    }

    /// `<get>`: running configuration and device state.
    pub async fn get(&self) -> Result<Vec<u8>> {
        self.get_with(Get::new()).await
    }

    /// `<get>` with a filter.
    pub async fn get_with(&self, op: Get) -> Result<Vec<u8>> {
        Ok(self.call::<DataReply, _>(&op).await?.inner)
    }

    /// `<edit-config>`: apply a change to a datastore. Options ride on the
    /// [`EditConfig`] builder.
    pub async fn edit_config(&self, op: EditConfig) -> Result<()> {
        self.call(&op).await
    }

    /// `<copy-config>`: replace `target` with the contents of `source`.
    pub async fn copy_config(
        &self,
        source: impl Into<Store>,
        target: impl Into<Store>,
    ) -> Result<()> {
        self.call(&CopyConfig::new(source, target)).await
    }

    /// `<delete-config>`: delete a datastore.
    pub async fn delete_config(&self, target: Datastore) -> Result<()> {
        self.call(&DeleteConfig::new(target)).await
    }

    /// `<lock>`: take the configuration lock on a datastore.
    pub async fn lock(&self, target: Datastore) -> Result<()> {
        self.call(&Lock::new(target)).await
    }

    /// `<unlock>`: release the configuration lock.
    pub async fn unlock(&self, target: Datastore) -> Result<()> {
        self.call(&Unlock::new(target)).await
    }

    /// `<validate>`: validate a datastore or URL source.
    pub async fn validate(&self, source: impl Into<Store>) -> Result<()> {
        self.call(&Validate::new(source)).await
    }

    /// `<commit>`: commit the candidate configuration.
    pub async fn commit(&self) -> Result<()> {
        self.commit_with(Commit::new()).await
    }

    /// `<commit>` with confirmed-commit options.
    pub async fn commit_with(&self, op: Commit) -> Result<()> {
        self.call(&op).await
    }

    /// `<cancel-commit>`: cancel an ongoing confirmed commit.
    pub async fn cancel_commit(&self) -> Result<()> {
        self.cancel_commit_with(CancelCommit::new()).await
    }

    /// `<cancel-commit>` with a persist-id.
    pub async fn cancel_commit_with(&self, op: CancelCommit) -> Result<()> {
        self.call(&op).await
    }

    /// `<kill-session>`: force another session's termination.
    pub async fn kill_session(&self, session_id: u64) -> Result<()> {
        self.call(&KillSession::new(session_id)).await
    }

    /// Gracefully close the session: `<close-session/>` round-trip, then
    /// transport teardown.
    ///
    /// Calls racing with close observe [`Error::Closed`]. Errors caused by
    /// the server hanging up first (eof, broken pipe) are expected and
    /// swallowed.
    pub async fn close(&self) -> Result<()> {
        self.shared.closing.store(true, Ordering::Release);

        let rpc_result = self.call_inner::<(), _>(&CloseSession, true).await;

        // Close our write side first (the server's reader sees EOF), then
        // tear down the connection.
        {
            let mut send = self.send.lock().await;
            if let Err(e) = send.writer.shutdown().await {
                if !is_close_race(&e) {
                    return Err(Error::Transport(e.into()));
                }
            }
        }
        self.handle.lock().await.close().await?;

        match rpc_result {
            // the server often closes the connection instead of (or right
            // after) confirming close-session
            Ok(()) | Err(Error::Closed) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

fn is_close_race(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::UnexpectedEof
    )
}

/// Background receive loop: reads framed messages and dispatches replies
/// until the transport fails or closes.
async fn recv_loop(mut reader: FrameReader<BoxRead>, shared: Arc<Shared>) {
    let err = loop {
        match recv_one(&mut reader, &shared).await {
            Ok(()) => {}
            Err(e) => break e,
        }
    };

    // Fail everything still outstanding; dropping the senders wakes the
    // waiters with `Closed`.
    let outstanding = {
        let mut pending = shared.pending.lock().unwrap();
        let n = pending.len();
        pending.clear();
        n
    };

    let clean_eof = matches!(err, FrameError::UnexpectedEof);
    if shared.closing.load(Ordering::Acquire) && clean_eof {
        debug!("receive loop finished: session closed");
    } else {
        warn!("connection closed unexpectedly ({err}); failing {outstanding} pending requests");
    }
}

async fn recv_one(
    reader: &mut FrameReader<BoxRead>,
    shared: &Shared,
) -> std::result::Result<(), FrameError> {
    let mut buf = Vec::new();
    reader.msg_reader().await?.read_to_end(&mut buf).await?;

    match sniff_root(&buf) {
        Ok(RootElement::RpcReply) => match RpcReplyMsg::parse(&buf) {
            Ok(reply) => dispatch(shared, reply),
            Err(e) => warn!("failed to decode rpc-reply: {e}"),
        },
        Ok(RootElement::Notification) => {
            debug!("ignoring notification message");
        }
        Ok(RootElement::Other(name)) => {
            warn!("ignoring unknown message type {name:?}");
        }
        Err(e) => warn!("failed to parse incoming message: {e}"),
    }

    Ok(())
}

fn dispatch(shared: &Shared, reply: RpcReplyMsg) {
    let message_id = reply.message_id;
    let slot = shared.pending.lock().unwrap().remove(&message_id);
    match slot {
        Some(tx) => {
            if tx.send(reply).is_err() {
                debug!("reply {message_id} arrived after its caller went away");
            }
        }
        None => {
            // unknown id, or the request was canceled
            debug!("dropping reply with unmatched message-id {message_id}");
        }
    }
}

#[cfg(test)]
mod tests;
