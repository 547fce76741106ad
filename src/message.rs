//! XML envelopes for `<hello>`, `<rpc>`, `<rpc-reply>`, and `<rpc-error>`
//! as defined in RFC 6241.
//!
//! Parsing walks quick-xml events; raw reply bodies are captured as byte
//! spans over the message buffer so callers can decode them however they
//! like.

use std::fmt;
use std::str::FromStr;

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::{NsReader, Reader};

use crate::error::{Error, HandshakeError, Result};
use crate::xml::{element_present, ToXml};

/// The NETCONF base namespace carried on `<hello>`, `<rpc>`, and
/// `<rpc-reply>`.
pub const BASE_NS: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";

/// The `<hello>` message exchanged in both directions at session start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloMsg {
    /// Session id assigned by the server. Present on the server hello,
    /// absent on the client hello.
    pub session_id: Option<u64>,

    /// Advertised capability URIs.
    pub capabilities: Vec<String>,
}

impl HelloMsg {
    /// Encode a client hello.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(128);
        out.push_str(r#"<hello xmlns=""#);
        out.push_str(BASE_NS);
        out.push_str(r#""><capabilities>"#);
        for cap in &self.capabilities {
            out.push_str("<capability>");
            out.push_str(&escape(cap.as_str()));
            out.push_str("</capability>");
        }
        out.push_str("</capabilities></hello>");
        out
    }

    /// Parse a server hello. Accepts input without an XML prolog.
    pub fn parse(data: &[u8]) -> std::result::Result<Self, HandshakeError> {
        let mut reader = NsReader::from_reader(data);
        let parse_err = |e: quick_xml::Error| HandshakeError::Parse(e.to_string());

        // Find the <hello> root.
        loop {
            match reader.read_resolved_event().map_err(parse_err)? {
                (ns, Event::Start(e)) => {
                    if e.local_name().as_ref() != b"hello" || !in_base_ns(&ns) {
                        return Err(HandshakeError::Parse(format!(
                            "unexpected root element {:?}",
                            String::from_utf8_lossy(e.name().as_ref())
                        )));
                    }
                    break;
                }
                (_, Event::Eof) => {
                    return Err(HandshakeError::Parse("empty hello message".into()))
                }
                _ => {}
            }
        }

        let mut msg = HelloMsg {
            session_id: None,
            capabilities: Vec::new(),
        };

        loop {
            match reader.read_event().map_err(parse_err)? {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"session-id" => {
                        let text = read_text_content(&mut reader, &e)
                            .map_err(|e| HandshakeError::Parse(e.to_string()))?;
                        let id = text.trim().parse::<u64>().map_err(|_| {
                            HandshakeError::Parse(format!("bad session-id {text:?}"))
                        })?;
                        msg.session_id = Some(id);
                    }
                    b"capabilities" => {}
                    b"capability" => {
                        let text = read_text_content(&mut reader, &e)
                            .map_err(|e| HandshakeError::Parse(e.to_string()))?;
                        msg.capabilities.push(text.trim().to_string());
                    }
                    _ => {
                        skip_element(&mut reader, &e)
                            .map_err(|e| HandshakeError::Parse(e.to_string()))?;
                    }
                },
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(msg)
    }
}

/// The `<rpc>` envelope wrapping one operation payload.
pub struct RpcMsg<'a> {
    pub message_id: u64,
    pub operation: &'a dyn ToXml,
}

impl RpcMsg<'_> {
    /// Serialize the full envelope. Local validation errors from the
    /// operation propagate before anything is written to the wire.
    pub fn encode(&self) -> Result<String> {
        let mut out = String::with_capacity(256);
        out.push_str(r#"<rpc xmlns=""#);
        out.push_str(BASE_NS);
        out.push_str(r#"" message-id=""#);
        out.push_str(&self.message_id.to_string());
        out.push_str(r#"">"#);
        self.operation.write_xml(&mut out)?;
        out.push_str("</rpc>");
        Ok(out)
    }
}

/// A parsed `<rpc-reply>`.
#[derive(Debug, Clone)]
pub struct RpcReplyMsg {
    /// The message-id attribute, matching the request.
    pub message_id: u64,

    /// All `<rpc-error>` children, in document order. May include
    /// warnings.
    pub errors: Vec<RpcError>,

    /// Raw inner XML of the reply, including any `<rpc-error>` elements.
    pub body: Vec<u8>,
}

impl RpcReplyMsg {
    /// Parse a reply from one framed message.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = NsReader::from_reader(data);

        let (start, body) = loop {
            match reader
                .read_resolved_event()
                .map_err(|e| Error::MalformedMessage(e.to_string()))?
            {
                (ns, Event::Start(e)) => {
                    check_reply_root(&e, &ns)?;
                    let start = e.into_owned();
                    let span = reader
                        .read_to_end(start.name())
                        .map_err(|e| Error::MalformedMessage(e.to_string()))?;
                    break (start, &data[span.start as usize..span.end as usize]);
                }
                (ns, Event::Empty(e)) => {
                    check_reply_root(&e, &ns)?;
                    break (e.into_owned(), &data[0..0]);
                }
                (_, Event::Eof) => {
                    return Err(Error::MalformedMessage("empty rpc-reply".into()))
                }
                _ => {}
            }
        };

        let message_id = message_id_attr(&start)?;
        let errors = parse_errors(body)?;

        Ok(RpcReplyMsg {
            message_id,
            errors,
            body: body.to_vec(),
        })
    }

    /// Errors of severity `error`, excluding warnings.
    pub fn severity_errors(&self) -> Vec<&RpcError> {
        self.errors
            .iter()
            .filter(|e| e.severity == ErrorSeverity::Error)
            .collect()
    }

    /// A reply is successful iff it contains no error of severity `error`.
    pub fn is_success(&self) -> bool {
        self.severity_errors().is_empty()
    }

    /// Whether the reply body carries an explicit `<ok/>`.
    ///
    /// Success is judged by [`is_success`](Self::is_success); this exists
    /// for callers that want to distinguish `<ok/>` from data replies.
    pub fn has_ok(&self) -> bool {
        element_present(&self.body, "ok")
    }
}

fn check_reply_root(e: &BytesStart, ns: &ResolveResult) -> Result<()> {
    if e.local_name().as_ref() != b"rpc-reply" || !in_base_ns(ns) {
        return Err(Error::MalformedMessage(format!(
            "expected rpc-reply, found {:?}",
            String::from_utf8_lossy(e.name().as_ref())
        )));
    }
    Ok(())
}

fn message_id_attr(start: &BytesStart) -> Result<u64> {
    for attr in start.attributes().with_checks(false).flatten() {
        if attr.key.local_name().as_ref() == b"message-id" {
            let value = attr
                .unescape_value()
                .map_err(|e| Error::MalformedMessage(e.to_string()))?;
            return value.trim().parse::<u64>().map_err(|_| {
                Error::MalformedMessage(format!("bad message-id {value:?}"))
            });
        }
    }
    Err(Error::MalformedMessage(
        "rpc-reply without message-id".into(),
    ))
}

fn parse_errors(body: &[u8]) -> Result<Vec<RpcError>> {
    let mut reader = Reader::from_reader(body);
    let mut errors = Vec::new();

    loop {
        match reader
            .read_event()
            .map_err(|e| Error::MalformedMessage(e.to_string()))?
        {
            Event::Start(e) => {
                if e.local_name().as_ref() == b"rpc-error" {
                    errors.push(parse_error(&mut reader, body)?);
                } else {
                    skip_plain(&mut reader, &e)?;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(errors)
}

fn parse_error(reader: &mut Reader<&[u8]>, data: &[u8]) -> Result<RpcError> {
    let mut typ = None;
    let mut tag = None;
    let mut severity = None;
    let mut app_tag = None;
    let mut path = None;
    let mut message = None;
    let mut info = None;

    loop {
        match reader
            .read_event()
            .map_err(|e| Error::MalformedMessage(e.to_string()))?
        {
            Event::Start(e) => match e.local_name().as_ref() {
                b"error-type" => typ = Some(text_of(reader, &e)?.parse::<ErrorType>()?),
                b"error-tag" => tag = Some(text_of(reader, &e)?.parse::<ErrorTag>()?),
                b"error-severity" => {
                    severity = Some(text_of(reader, &e)?.parse::<ErrorSeverity>()?)
                }
                b"error-app-tag" => app_tag = Some(text_of(reader, &e)?),
                b"error-path" => path = Some(text_of(reader, &e)?),
                b"error-message" => message = Some(text_of(reader, &e)?),
                b"error-info" => {
                    let span = reader
                        .read_to_end(e.name())
                        .map_err(|e| Error::MalformedMessage(e.to_string()))?;
                    info = Some(data[span.start as usize..span.end as usize].to_vec());
                }
                _ => skip_plain(reader, &e)?,
            },
            Event::End(e) if e.local_name().as_ref() == b"rpc-error" => break,
            Event::Eof => {
                return Err(Error::MalformedMessage("truncated rpc-error".into()))
            }
            _ => {}
        }
    }

    Ok(RpcError {
        typ: typ
            .ok_or_else(|| Error::MalformedMessage("rpc-error without error-type".into()))?,
        tag: tag
            .ok_or_else(|| Error::MalformedMessage("rpc-error without error-tag".into()))?,
        severity: severity.ok_or_else(|| {
            Error::MalformedMessage("rpc-error without error-severity".into())
        })?,
        app_tag,
        path,
        message,
        info,
    })
}

fn text_of(reader: &mut Reader<&[u8]>, start: &BytesStart) -> Result<String> {
    let mut text = String::new();
    loop {
        match reader
            .read_event()
            .map_err(|e| Error::MalformedMessage(e.to_string()))?
        {
            Event::Text(t) => {
                let chunk = t
                    .unescape()
                    .map_err(|e| Error::MalformedMessage(e.to_string()))?;
                text.push_str(&chunk);
            }
            Event::CData(t) => {
                let chunk = std::str::from_utf8(t.as_ref())
                    .map_err(|e| Error::MalformedMessage(e.to_string()))?;
                text.push_str(chunk);
            }
            Event::Start(e) => skip_plain(reader, &e)?,
            Event::End(e) if e.name() == start.name() => break,
            Event::Eof => {
                return Err(Error::MalformedMessage("truncated element".into()))
            }
            _ => {}
        }
    }
    Ok(text)
}

fn skip_plain(reader: &mut Reader<&[u8]>, start: &BytesStart) -> Result<()> {
    reader
        .read_to_end(start.name())
        .map_err(|e| Error::MalformedMessage(e.to_string()))?;
    Ok(())
}

fn read_text_content(
    reader: &mut NsReader<&[u8]>,
    start: &BytesStart,
) -> std::result::Result<String, quick_xml::Error> {
    let mut text = String::new();
    loop {
        match reader.read_event()? {
            Event::Text(t) => text.push_str(&t.unescape()?),
            Event::Start(e) => {
                reader.read_to_end(e.name())?;
            }
            Event::End(e) if e.name() == start.name() => break,
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(text)
}

fn skip_element(
    reader: &mut NsReader<&[u8]>,
    start: &BytesStart,
) -> std::result::Result<(), quick_xml::Error> {
    reader.read_to_end(start.name())?;
    Ok(())
}

fn in_base_ns(ns: &ResolveResult) -> bool {
    matches!(ns, ResolveResult::Bound(b) if b.as_ref() == BASE_NS.as_bytes())
}

/// The root element of an inbound message, used by the receive loop to
/// dispatch without fully parsing.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum RootElement {
    RpcReply,
    Notification,
    Other(String),
}

pub(crate) fn sniff_root(data: &[u8]) -> Result<RootElement> {
    let mut reader = NsReader::from_reader(data);
    loop {
        match reader
            .read_resolved_event()
            .map_err(|e| Error::MalformedMessage(e.to_string()))?
        {
            (ns, Event::Start(e)) | (ns, Event::Empty(e)) => {
                let local = e.local_name();
                return Ok(if local.as_ref() == b"rpc-reply" && in_base_ns(&ns) {
                    RootElement::RpcReply
                } else if local.as_ref() == b"notification" {
                    RootElement::Notification
                } else {
                    RootElement::Other(String::from_utf8_lossy(e.name().as_ref()).into_owned())
                });
            }
            (_, Event::Eof) => {
                return Err(Error::MalformedMessage("message without root element".into()))
            }
            _ => {}
        }
    }
}

/// `error-type` from RFC 6241 §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    Transport,
    Rpc,
    Protocol,
    Application,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Transport => "transport",
            ErrorType::Rpc => "rpc",
            ErrorType::Protocol => "protocol",
            ErrorType::Application => "application",
        }
    }
}

impl FromStr for ErrorType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "transport" => Ok(ErrorType::Transport),
            "rpc" => Ok(ErrorType::Rpc),
            "protocol" => Ok(ErrorType::Protocol),
            "application" | "app" => Ok(ErrorType::Application),
            other => Err(Error::MalformedMessage(format!(
                "unknown error-type {other:?}"
            ))),
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `error-severity` from RFC 6241 §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Error,
    Warning,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Error => "error",
            ErrorSeverity::Warning => "warning",
        }
    }
}

impl FromStr for ErrorSeverity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "error" => Ok(ErrorSeverity::Error),
            "warning" => Ok(ErrorSeverity::Warning),
            other => Err(Error::MalformedMessage(format!(
                "unknown error-severity {other:?}"
            ))),
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! error_tags {
    ($($variant:ident => $text:literal,)+) => {
        /// `error-tag` values from RFC 6241 Appendix A.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum ErrorTag {
            $($variant,)+
        }

        impl ErrorTag {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(ErrorTag::$variant => $text,)+
                }
            }
        }

        impl FromStr for ErrorTag {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s.trim() {
                    $($text => Ok(ErrorTag::$variant),)+
                    other => Err(Error::MalformedMessage(format!(
                        "unknown error-tag {other:?}"
                    ))),
                }
            }
        }
    };
}

error_tags! {
    InUse => "in-use",
    InvalidValue => "invalid-value",
    TooBig => "too-big",
    MissingAttribute => "missing-attribute",
    BadAttribute => "bad-attribute",
    UnknownAttribute => "unknown-attribute",
    MissingElement => "missing-element",
    BadElement => "bad-element",
    UnknownElement => "unknown-element",
    UnknownNamespace => "unknown-namespace",
    AccessDenied => "access-denied",
    LockDenied => "lock-denied",
    ResourceDenied => "resource-denied",
    RollbackFailed => "rollback-failed",
    DataExists => "data-exists",
    DataMissing => "data-missing",
    OperationNotSupported => "operation-not-supported",
    OperationFailed => "operation-failed",
    PartialOperation => "partial-operation",
    MalformedMessage => "malformed-message",
}

impl fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `<rpc-error>` element from a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    pub typ: ErrorType,
    pub tag: ErrorTag,
    pub severity: ErrorSeverity,
    pub app_tag: Option<String>,
    pub path: Option<String>,
    pub message: Option<String>,
    /// Raw inner XML of `<error-info>`, if present.
    pub info: Option<Vec<u8>>,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => f.write_str(msg),
            None => write!(f, "{} ({})", self.tag, self.typ),
        }
    }
}

impl std::error::Error for RpcError {}
