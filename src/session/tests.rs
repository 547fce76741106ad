//! Session tests against an in-process NETCONF server speaking through an
//! in-memory duplex pipe.

use std::time::Duration;

use regex::Regex;
use tokio::io::{duplex, split, DuplexStream, ReadHalf, WriteHalf};

use super::*;
use crate::message::{ErrorTag, ErrorType};
use crate::transport::StreamTransport;

const HELLO_10_11: &str = r#"<hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"><capabilities><capability>urn:ietf:params:netconf:base:1.0</capability><capability>urn:ietf:params:netconf:base:1.1</capability></capabilities><session-id>42</session-id></hello>"#;

const HELLO_10_ONLY: &str = r#"<hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"><capabilities><capability>urn:ietf:params:netconf:base:1.0</capability></capabilities><session-id>42</session-id></hello>"#;

/// Server side of the duplex pipe, with its own framer mirroring the
/// client's framing mode.
struct TestServer {
    framer: Framer<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>,
}

impl TestServer {
    fn new(stream: DuplexStream) -> Self {
        let (r, w) = split(stream);
        Self {
            framer: Framer::new(r, w),
        }
    }

    async fn read_msg(&mut self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.framer
            .msg_reader()
            .await
            .unwrap()
            .read_to_end(&mut buf)
            .await
            .unwrap();
        buf
    }

    async fn send_msg(&mut self, xml: &str) {
        let mut w = self.framer.msg_writer().unwrap();
        w.write_all(xml.as_bytes()).await.unwrap();
        w.finish().await.unwrap();
    }

    /// Drain the client hello, answer with `hello`, and mirror the
    /// framing upgrade the client will perform.
    async fn handshake(&mut self, hello: &str, upgrade: bool) -> Vec<u8> {
        let client_hello = self.read_msg().await;
        self.send_msg(hello).await;
        if upgrade {
            self.framer.upgrade();
        }
        client_hello
    }
}

async fn open_pair(hello: &'static str, upgrade: bool) -> (Session, TestServer) {
    let (client, server) = duplex(1 << 20);
    let server_task = tokio::spawn(async move {
        let mut ts = TestServer::new(server);
        ts.handshake(hello, upgrade).await;
        ts
    });
    let session = Session::open(StreamTransport::new(client)).await.unwrap();
    (session, server_task.await.unwrap())
}

async fn open_expecting_failure(hello: &'static str) -> Error {
    let (client, server) = duplex(1 << 20);
    let server_task = tokio::spawn(async move {
        let mut ts = TestServer::new(server);
        ts.handshake(hello, false).await;
    });
    let err = Session::open(StreamTransport::new(client))
        .await
        .expect_err("session open should have failed");
    server_task.await.unwrap();
    err
}

fn msg_id_of(req: &[u8]) -> u64 {
    let re = Regex::new(r#"message-id="(\d+)""#).unwrap();
    re.captures(std::str::from_utf8(req).unwrap()).unwrap()[1]
        .parse()
        .unwrap()
}

fn data_reply(id: u64, inner: &str) -> String {
    format!(
        r#"<rpc-reply xmlns="urn:ietf:params:xml:ns:netconf:base:1.0" message-id="{id}"><data>{inner}</data></rpc-reply>"#
    )
}

fn ok_reply(id: u64) -> String {
    format!(
        r#"<rpc-reply xmlns="urn:ietf:params:xml:ns:netconf:base:1.0" message-id="{id}"><ok/></rpc-reply>"#
    )
}

#[tokio::test]
async fn test_open_upgrades_to_chunked() {
    let (session, mut ts) = open_pair(HELLO_10_11, true).await;
    assert_eq!(session.session_id(), 42);
    assert!(session.server_has_capability("urn:ietf:params:netconf:base:1.1"));

    let server = tokio::spawn(async move {
        let req = ts.read_msg().await;
        let req_str = String::from_utf8(req.clone()).unwrap();
        let must = Regex::new(r"<get-config><source><running/></source></get-config>").unwrap();
        assert!(must.is_match(&req_str), "unexpected request: {req_str}");
        ts.send_msg(&data_reply(msg_id_of(&req), "<top/>")).await;
    });

    let config = session.get_config(Datastore::Running).await.unwrap();
    assert_eq!(config, b"<top/>");
    server.await.unwrap();
}

#[tokio::test]
async fn test_open_stays_on_eom_for_base_10_server() {
    let (session, mut ts) = open_pair(HELLO_10_ONLY, false).await;
    assert_eq!(session.session_id(), 42);
    assert!(!session.server_has_capability("urn:ietf:params:netconf:base:1.1"));

    let server = tokio::spawn(async move {
        let req = ts.read_msg().await;
        ts.send_msg(&ok_reply(msg_id_of(&req))).await;
    });

    session.lock(Datastore::Running).await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn test_client_hello_advertises_defaults() {
    let (client, server) = duplex(1 << 20);
    let server_task = tokio::spawn(async move {
        let mut ts = TestServer::new(server);
        ts.handshake(HELLO_10_11, true).await
    });
    let _session = Session::open(StreamTransport::new(client)).await.unwrap();

    let client_hello = String::from_utf8(server_task.await.unwrap()).unwrap();
    assert!(client_hello.contains("urn:ietf:params:netconf:base:1.0"));
    assert!(client_hello.contains("urn:ietf:params:netconf:base:1.1"));
}

#[tokio::test]
async fn test_open_rejects_missing_session_id() {
    let hello = r#"<hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"><capabilities><capability>urn:ietf:params:netconf:base:1.0</capability></capabilities></hello>"#;
    let err = open_expecting_failure(hello).await;
    assert!(matches!(
        err,
        Error::Handshake(HandshakeError::MissingSessionId)
    ));
}

#[tokio::test]
async fn test_open_rejects_zero_session_id() {
    let hello = r#"<hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"><capabilities><capability>urn:ietf:params:netconf:base:1.0</capability></capabilities><session-id>0</session-id></hello>"#;
    let err = open_expecting_failure(hello).await;
    assert!(matches!(
        err,
        Error::Handshake(HandshakeError::MissingSessionId)
    ));
}

#[tokio::test]
async fn test_open_rejects_empty_capabilities() {
    let hello = r#"<hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"><capabilities/><session-id>42</session-id></hello>"#;
    let err = open_expecting_failure(hello).await;
    assert!(matches!(
        err,
        Error::Handshake(HandshakeError::NoCapabilities)
    ));
}

#[tokio::test]
async fn test_concurrent_calls_replied_out_of_order() {
    let (session, mut ts) = open_pair(HELLO_10_11, true).await;

    let server = tokio::spawn(async move {
        let marker = Regex::new(r"<(echo-[abc])/>").unwrap();
        let mut requests = Vec::new();
        for _ in 0..3 {
            let req = ts.read_msg().await;
            let req_str = String::from_utf8(req).unwrap();
            let name = marker.captures(&req_str).unwrap()[1].to_string();
            requests.push((msg_id_of(req_str.as_bytes()), name));
        }
        // reply in reverse arrival order
        for (id, name) in requests.iter().rev() {
            ts.send_msg(&data_reply(*id, &format!("<from>{name}</from>")))
                .await;
        }
    });

    let (a, b, c) = tokio::join!(
        session.call::<DataReply, _>(&"<echo-a/>"),
        session.call::<DataReply, _>(&"<echo-b/>"),
        session.call::<DataReply, _>(&"<echo-c/>"),
    );

    assert_eq!(a.unwrap().inner, b"<from>echo-a</from>");
    assert_eq!(b.unwrap().inner, b"<from>echo-b</from>");
    assert_eq!(c.unwrap().inner, b"<from>echo-c</from>");
    server.await.unwrap();
}

#[tokio::test]
async fn test_timeout_cancels_wait_and_late_reply_is_dropped() {
    let (session, mut ts) = open_pair(HELLO_10_11, true).await;

    let server = tokio::spawn(async move {
        let slow = ts.read_msg().await;
        let slow_id = msg_id_of(&slow);
        // hold the slow reply until the follow-up request shows up
        let fast = ts.read_msg().await;
        let fast_id = msg_id_of(&fast);
        ts.send_msg(&data_reply(slow_id, "<late/>")).await;
        ts.send_msg(&ok_reply(fast_id)).await;
    });

    let timed_out =
        tokio::time::timeout(Duration::from_millis(100), session.rpc(&"<slow-op/>")).await;
    assert!(timed_out.is_err(), "call should have been canceled");

    // the session keeps working; the stale reply is discarded on arrival
    session.call::<(), _>(&"<fast-op/>").await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn test_transport_eof_fails_all_pending() {
    let (session, mut ts) = open_pair(HELLO_10_11, true).await;

    let server = tokio::spawn(async move {
        let _ = ts.read_msg().await;
        let _ = ts.read_msg().await;
        // hang up with both replies outstanding
        drop(ts);
    });

    let (a, b) = tokio::join!(session.rpc(&"<one/>"), session.rpc(&"<two/>"));
    assert!(matches!(a, Err(Error::Closed)));
    assert!(matches!(b, Err(Error::Closed)));
    server.await.unwrap();
}

#[tokio::test]
async fn test_graceful_close() {
    let (session, mut ts) = open_pair(HELLO_10_11, true).await;

    let server = tokio::spawn(async move {
        let req = ts.read_msg().await;
        assert!(String::from_utf8_lossy(&req).contains("<close-session/>"));
        ts.send_msg(&ok_reply(msg_id_of(&req))).await;
    });

    session.close().await.unwrap();
    server.await.unwrap();

    // the session refuses new work once closing
    assert!(matches!(session.rpc(&"<nope/>").await, Err(Error::Closed)));
}

#[tokio::test]
async fn test_rpc_error_reply_keeps_session_usable() {
    let (session, mut ts) = open_pair(HELLO_10_11, true).await;

    let server = tokio::spawn(async move {
        let req = ts.read_msg().await;
        ts.send_msg(&format!(
            r#"<rpc-reply xmlns="urn:ietf:params:xml:ns:netconf:base:1.0" message-id="{}"><rpc-error><error-type>protocol</error-type><error-tag>lock-denied</error-tag><error-severity>error</error-severity><error-message>lock held by session 7</error-message></rpc-error></rpc-reply>"#,
            msg_id_of(&req)
        ))
        .await;

        let req = ts.read_msg().await;
        ts.send_msg(&ok_reply(msg_id_of(&req))).await;
    });

    let err = session.lock(Datastore::Candidate).await.unwrap_err();
    match err {
        Error::Rpc(e) => {
            assert_eq!(e.typ, ErrorType::Protocol);
            assert_eq!(e.tag, ErrorTag::LockDenied);
            assert_eq!(e.message.as_deref(), Some("lock held by session 7"));
        }
        other => panic!("expected Error::Rpc, got {other:?}"),
    }

    session.unlock(Datastore::Candidate).await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn test_multiple_errors_returned_as_list() {
    let (session, mut ts) = open_pair(HELLO_10_11, true).await;

    let server = tokio::spawn(async move {
        let req = ts.read_msg().await;
        ts.send_msg(&format!(
            r#"<rpc-reply xmlns="urn:ietf:params:xml:ns:netconf:base:1.0" message-id="{}"><rpc-error><error-type>application</error-type><error-tag>data-missing</error-tag><error-severity>error</error-severity></rpc-error><rpc-error><error-type>application</error-type><error-tag>data-exists</error-tag><error-severity>error</error-severity></rpc-error></rpc-reply>"#,
            msg_id_of(&req)
        ))
        .await;
    });

    let err = session.call::<(), _>(&"<busted/>").await.unwrap_err();
    match err {
        Error::RpcErrors(errors) => {
            assert_eq!(errors.len(), 2);
            assert_eq!(errors[0].tag, ErrorTag::DataMissing);
            assert_eq!(errors[1].tag, ErrorTag::DataExists);
        }
        other => panic!("expected Error::RpcErrors, got {other:?}"),
    }
    server.await.unwrap();
}

#[tokio::test]
async fn test_warning_severity_is_not_an_error() {
    let (session, mut ts) = open_pair(HELLO_10_11, true).await;

    let server = tokio::spawn(async move {
        let req = ts.read_msg().await;
        ts.send_msg(&format!(
            r#"<rpc-reply xmlns="urn:ietf:params:xml:ns:netconf:base:1.0" message-id="{}"><rpc-error><error-type>application</error-type><error-tag>partial-operation</error-tag><error-severity>warning</error-severity></rpc-error><ok/></rpc-reply>"#,
            msg_id_of(&req)
        ))
        .await;
    });

    session.call::<(), _>(&"<mostly-fine/>").await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn test_message_ids_start_at_one_and_increase() {
    let (session, mut ts) = open_pair(HELLO_10_11, true).await;

    let server = tokio::spawn(async move {
        for expected in 1..=2u64 {
            let req = ts.read_msg().await;
            assert_eq!(msg_id_of(&req), expected);
            ts.send_msg(&ok_reply(expected)).await;
        }
    });

    session.call::<(), _>(&"<first/>").await.unwrap();
    session.call::<(), _>(&"<second/>").await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn test_unknown_root_is_skipped() {
    let (session, mut ts) = open_pair(HELLO_10_11, true).await;

    let server = tokio::spawn(async move {
        let req = ts.read_msg().await;
        // a notification and an unknown element interleaved before the reply
        ts.send_msg(r#"<notification xmlns="urn:ietf:params:xml:ns:netconf:notification:1.0"><eventTime>now</eventTime></notification>"#).await;
        ts.send_msg("<mystery/>").await;
        ts.send_msg(&ok_reply(msg_id_of(&req))).await;
    });

    session.call::<(), _>(&"<probe/>").await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn test_extra_capability_is_advertised() {
    let (client, server) = duplex(1 << 20);
    let server_task = tokio::spawn(async move {
        let mut ts = TestServer::new(server);
        ts.handshake(HELLO_10_11, true).await
    });

    let session = Session::builder()
        .with_capability(":validate:1.1")
        .open(StreamTransport::new(client))
        .await
        .unwrap();

    let client_hello = String::from_utf8(server_task.await.unwrap()).unwrap();
    assert!(client_hello
        .contains("urn:ietf:params:netconf:capability:validate:1.1"));
    assert!(session
        .client_capabilities()
        .contains(&"urn:ietf:params:netconf:capability:validate:1.1".to_string()));
}
