//! Typed requests for the standard RFC 6241 operations.
//!
//! Every operation serializes itself inside the `<rpc>` envelope via
//! [`ToXml`]. Validation that needs no server round-trip (datastore names,
//! incompatible commit options) happens during serialization, before any
//! bytes are written.
//!
//! Raw XML payloads (`&str`/`String`) remain the escape hatch for
//! operations this module does not model.

use std::fmt;
use std::time::Duration;

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{Error, Result};
use crate::xml::{validate_element_name, write_flag, write_text_element, FromXml, ToXml};

/// A named configuration datastore on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datastore {
    Running,
    Candidate,
    Startup,
    /// Vendor-defined datastore, serialized verbatim as an element name.
    Other(String),
}

impl Datastore {
    fn name(&self) -> &str {
        match self {
            Datastore::Running => "running",
            Datastore::Candidate => "candidate",
            Datastore::Startup => "startup",
            Datastore::Other(name) => name,
        }
    }
}

impl ToXml for Datastore {
    fn write_xml(&self, out: &mut String) -> Result<()> {
        let name = self.name();
        validate_element_name(name)?;
        out.push('<');
        out.push_str(name);
        out.push_str("/>");
        Ok(())
    }
}

impl fmt::Display for Datastore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A `<url>` source or target (requires the `:url` capability on the
/// server).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Url(pub String);

impl ToXml for Url {
    fn write_xml(&self, out: &mut String) -> Result<()> {
        if self.0.is_empty() {
            return Err(Error::InvalidValue("url cannot be empty".into()));
        }
        write_text_element(out, "url", &self.0);
        Ok(())
    }
}

/// Source or target of operations that accept either a datastore or a URL
/// (`copy-config`, `validate`).
#[derive(Debug, Clone)]
pub enum Store {
    Datastore(Datastore),
    Url(Url),
}

impl ToXml for Store {
    fn write_xml(&self, out: &mut String) -> Result<()> {
        match self {
            Store::Datastore(ds) => ds.write_xml(out),
            Store::Url(url) => url.write_xml(out),
        }
    }
}

impl From<Datastore> for Store {
    fn from(ds: Datastore) -> Self {
        Store::Datastore(ds)
    }
}

impl From<Url> for Store {
    fn from(url: Url) -> Self {
        Store::Url(url)
    }
}

/// Filter applied to `get` and `get-config` results.
#[derive(Debug, Clone)]
pub enum Filter {
    /// Subtree filter; the string is the raw inner XML of `<filter>`.
    Subtree(String),
    /// XPath filter expression (requires the `:xpath` capability).
    Xpath(String),
}

impl ToXml for Filter {
    fn write_xml(&self, out: &mut String) -> Result<()> {
        match self {
            Filter::Subtree(inner) => {
                out.push_str(r#"<filter type="subtree">"#);
                out.push_str(inner);
                out.push_str("</filter>");
            }
            Filter::Xpath(select) => {
                out.push_str(r#"<filter type="xpath" select=""#);
                out.push_str(&escape(select.as_str()));
                out.push_str(r#""/>"#);
            }
        }
        Ok(())
    }
}

/// `<get-config>` — retrieve all or part of a configuration datastore.
#[derive(Debug, Clone)]
pub struct GetConfig {
    source: Datastore,
    filter: Option<Filter>,
}

impl GetConfig {
    pub fn new(source: Datastore) -> Self {
        Self {
            source,
            filter: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }
}

impl ToXml for GetConfig {
    fn write_xml(&self, out: &mut String) -> Result<()> {
        out.push_str("<get-config><source>");
        self.source.write_xml(out)?;
        out.push_str("</source>");
        if let Some(filter) = &self.filter {
            filter.write_xml(out)?;
        }
        out.push_str("</get-config>");
        Ok(())
    }
}

/// `<get>` — retrieve running configuration and device state.
#[derive(Debug, Clone, Default)]
pub struct Get {
    filter: Option<Filter>,
}

impl Get {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }
}

impl ToXml for Get {
    fn write_xml(&self, out: &mut String) -> Result<()> {
        match &self.filter {
            None => out.push_str("<get/>"),
            Some(filter) => {
                out.push_str("<get>");
                filter.write_xml(out)?;
                out.push_str("</get>");
            }
        }
        Ok(())
    }
}

/// `default-operation` for `<edit-config>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    Merge,
    Replace,
    None,
}

impl MergeStrategy {
    fn as_str(&self) -> &'static str {
        match self {
            MergeStrategy::Merge => "merge",
            MergeStrategy::Replace => "replace",
            MergeStrategy::None => "none",
        }
    }
}

/// `test-option` for `<edit-config>` (requires the `:validate`
/// capability).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStrategy {
    TestThenSet,
    Set,
    TestOnly,
}

impl TestStrategy {
    fn as_str(&self) -> &'static str {
        match self {
            TestStrategy::TestThenSet => "test-then-set",
            TestStrategy::Set => "set",
            TestStrategy::TestOnly => "test-only",
        }
    }
}

/// `error-option` for `<edit-config>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStrategy {
    StopOnError,
    ContinueOnError,
    RollbackOnError,
}

impl ErrorStrategy {
    fn as_str(&self) -> &'static str {
        match self {
            ErrorStrategy::StopOnError => "stop-on-error",
            ErrorStrategy::ContinueOnError => "continue-on-error",
            ErrorStrategy::RollbackOnError => "rollback-on-error",
        }
    }
}

/// Configuration payload of an `<edit-config>`.
#[derive(Debug, Clone)]
enum EditSource {
    /// Inline `<config>` content (raw XML). Per-element operation
    /// attributes pass through untouched.
    Config(String),
    /// Remote configuration addressed by URL.
    Url(Url),
}

/// `<edit-config>` — change a configuration datastore.
#[derive(Debug, Clone)]
pub struct EditConfig {
    target: Datastore,
    source: EditSource,
    default_operation: Option<MergeStrategy>,
    test_option: Option<TestStrategy>,
    error_option: Option<ErrorStrategy>,
}

impl EditConfig {
    /// Edit with inline configuration XML.
    pub fn new(target: Datastore, config: impl Into<String>) -> Self {
        Self {
            target,
            source: EditSource::Config(config.into()),
            default_operation: None,
            test_option: None,
            error_option: None,
        }
    }

    /// Edit from a configuration addressed by URL.
    pub fn from_url(target: Datastore, url: Url) -> Self {
        Self {
            target,
            source: EditSource::Url(url),
            default_operation: None,
            test_option: None,
            error_option: None,
        }
    }

    pub fn default_operation(mut self, strategy: MergeStrategy) -> Self {
        self.default_operation = Some(strategy);
        self
    }

    pub fn test_option(mut self, strategy: TestStrategy) -> Self {
        self.test_option = Some(strategy);
        self
    }

    pub fn error_option(mut self, strategy: ErrorStrategy) -> Self {
        self.error_option = Some(strategy);
        self
    }
}

impl ToXml for EditConfig {
    fn write_xml(&self, out: &mut String) -> Result<()> {
        out.push_str("<edit-config><target>");
        self.target.write_xml(out)?;
        out.push_str("</target>");
        if let Some(op) = self.default_operation {
            write_text_element(out, "default-operation", op.as_str());
        }
        if let Some(op) = self.test_option {
            write_text_element(out, "test-option", op.as_str());
        }
        if let Some(op) = self.error_option {
            write_text_element(out, "error-option", op.as_str());
        }
        match &self.source {
            EditSource::Config(config) => {
                out.push_str("<config>");
                out.push_str(config);
                out.push_str("</config>");
            }
            EditSource::Url(url) => url.write_xml(out)?,
        }
        out.push_str("</edit-config>");
        Ok(())
    }
}

/// `<copy-config>` — replace a whole datastore from another source.
#[derive(Debug, Clone)]
pub struct CopyConfig {
    source: Store,
    target: Store,
}

impl CopyConfig {
    pub fn new(source: impl Into<Store>, target: impl Into<Store>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

impl ToXml for CopyConfig {
    fn write_xml(&self, out: &mut String) -> Result<()> {
        out.push_str("<copy-config><source>");
        self.source.write_xml(out)?;
        out.push_str("</source><target>");
        self.target.write_xml(out)?;
        out.push_str("</target></copy-config>");
        Ok(())
    }
}

/// `<delete-config>` — delete a configuration datastore.
#[derive(Debug, Clone)]
pub struct DeleteConfig {
    target: Datastore,
}

impl DeleteConfig {
    pub fn new(target: Datastore) -> Self {
        Self { target }
    }
}

impl ToXml for DeleteConfig {
    fn write_xml(&self, out: &mut String) -> Result<()> {
        out.push_str("<delete-config><target>");
        self.target.write_xml(out)?;
        out.push_str("</target></delete-config>");
        Ok(())
    }
}

/// `<lock>` — take the short-lived configuration lock on a datastore.
#[derive(Debug, Clone)]
pub struct Lock {
    target: Datastore,
}

impl Lock {
    pub fn new(target: Datastore) -> Self {
        Self { target }
    }
}

impl ToXml for Lock {
    fn write_xml(&self, out: &mut String) -> Result<()> {
        out.push_str("<lock><target>");
        self.target.write_xml(out)?;
        out.push_str("</target></lock>");
        Ok(())
    }
}

/// `<unlock>` — release a lock taken with [`Lock`].
#[derive(Debug, Clone)]
pub struct Unlock {
    target: Datastore,
}

impl Unlock {
    pub fn new(target: Datastore) -> Self {
        Self { target }
    }
}

impl ToXml for Unlock {
    fn write_xml(&self, out: &mut String) -> Result<()> {
        out.push_str("<unlock><target>");
        self.target.write_xml(out)?;
        out.push_str("</target></unlock>");
        Ok(())
    }
}

/// `<validate>` — check a configuration for syntax and semantics without
/// applying it (requires the `:validate` capability).
#[derive(Debug, Clone)]
pub struct Validate {
    source: Store,
}

impl Validate {
    pub fn new(source: impl Into<Store>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

impl ToXml for Validate {
    fn write_xml(&self, out: &mut String) -> Result<()> {
        out.push_str("<validate><source>");
        self.source.write_xml(out)?;
        out.push_str("</source></validate>");
        Ok(())
    }
}

/// `<commit>` — commit the candidate datastore (requires the `:candidate`
/// capability).
#[derive(Debug, Clone, Default)]
pub struct Commit {
    confirmed: bool,
    confirm_timeout: Option<Duration>,
    persist: Option<String>,
    persist_id: Option<String>,
}

impl Commit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a confirmed commit that rolls back unless re-affirmed.
    pub fn confirmed(mut self) -> Self {
        self.confirmed = true;
        self
    }

    /// Rollback timeout for a confirmed commit. Serialized in whole
    /// seconds.
    pub fn confirm_timeout(mut self, timeout: Duration) -> Self {
        self.confirm_timeout = Some(timeout);
        self
    }

    /// Make the confirmed commit persist across session loss, identified
    /// by the given token.
    pub fn persist(mut self, id: impl Into<String>) -> Self {
        self.persist = Some(id.into());
        self
    }

    /// Confirm a prior persistent commit from this or another session.
    ///
    /// Mutually exclusive with every other commit option.
    pub fn persist_id(mut self, id: impl Into<String>) -> Self {
        self.persist_id = Some(id.into());
        self
    }
}

impl ToXml for Commit {
    fn write_xml(&self, out: &mut String) -> Result<()> {
        if self.persist_id.is_some()
            && (self.confirmed || self.confirm_timeout.is_some() || self.persist.is_some())
        {
            return Err(Error::InvalidValue(
                "persist-id cannot be combined with confirmed, confirm-timeout, or persist"
                    .into(),
            ));
        }

        if !self.confirmed
            && self.confirm_timeout.is_none()
            && self.persist.is_none()
            && self.persist_id.is_none()
        {
            out.push_str("<commit/>");
            return Ok(());
        }

        out.push_str("<commit>");
        write_flag(out, "confirmed", self.confirmed);
        if let Some(timeout) = self.confirm_timeout {
            write_text_element(out, "confirm-timeout", &timeout.as_secs().to_string());
        }
        if let Some(persist) = &self.persist {
            write_text_element(out, "persist", persist);
        }
        if let Some(persist_id) = &self.persist_id {
            write_text_element(out, "persist-id", persist_id);
        }
        out.push_str("</commit>");
        Ok(())
    }
}

/// `<cancel-commit>` — cancel an ongoing confirmed commit.
#[derive(Debug, Clone, Default)]
pub struct CancelCommit {
    persist_id: Option<String>,
}

impl CancelCommit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn persist_id(mut self, id: impl Into<String>) -> Self {
        self.persist_id = Some(id.into());
        self
    }
}

impl ToXml for CancelCommit {
    fn write_xml(&self, out: &mut String) -> Result<()> {
        match &self.persist_id {
            None => out.push_str("<cancel-commit/>"),
            Some(id) => {
                out.push_str("<cancel-commit>");
                write_text_element(out, "persist-id", id);
                out.push_str("</cancel-commit>");
            }
        }
        Ok(())
    }
}

/// `<kill-session>` — force another session's termination.
#[derive(Debug, Clone)]
pub struct KillSession {
    session_id: u64,
}

impl KillSession {
    pub fn new(session_id: u64) -> Self {
        Self { session_id }
    }
}

impl ToXml for KillSession {
    fn write_xml(&self, out: &mut String) -> Result<()> {
        out.push_str("<kill-session>");
        write_text_element(out, "session-id", &self.session_id.to_string());
        out.push_str("</kill-session>");
        Ok(())
    }
}

/// `<close-session>` — issued by `Session::close`, not exposed directly.
#[derive(Debug, Clone)]
pub(crate) struct CloseSession;

impl ToXml for CloseSession {
    fn write_xml(&self, out: &mut String) -> Result<()> {
        out.push_str("<close-session/>");
        Ok(())
    }
}

/// Reply body of `get` / `get-config`: the raw inner XML of `<data>`.
#[derive(Debug)]
pub(crate) struct DataReply {
    pub inner: Vec<u8>,
}

impl FromXml for DataReply {
    fn from_xml(body: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(body);
        loop {
            match reader
                .read_event()
                .map_err(|e| Error::MalformedMessage(e.to_string()))?
            {
                Event::Start(e) => {
                    if e.local_name().as_ref() == b"data" {
                        let span = reader
                            .read_to_end(e.name())
                            .map_err(|e| Error::MalformedMessage(e.to_string()))?;
                        return Ok(DataReply {
                            inner: body[span.start as usize..span.end as usize].to_vec(),
                        });
                    }
                    reader
                        .read_to_end(e.name())
                        .map_err(|e| Error::MalformedMessage(e.to_string()))?;
                }
                Event::Empty(e) if e.local_name().as_ref() == b"data" => {
                    return Ok(DataReply { inner: Vec::new() })
                }
                Event::Eof => {
                    return Err(Error::MalformedMessage(
                        "reply carries no <data> element".into(),
                    ))
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(op: &dyn ToXml) -> Result<String> {
        let mut out = String::new();
        op.write_xml(&mut out)?;
        Ok(out)
    }

    #[test]
    fn test_get_config_running() {
        assert_eq!(
            render(&GetConfig::new(Datastore::Running)).unwrap(),
            "<get-config><source><running/></source></get-config>"
        );
    }

    #[test]
    fn test_get_config_with_subtree_filter() {
        let op = GetConfig::new(Datastore::Candidate)
            .filter(Filter::Subtree("<interfaces/>".into()));
        assert_eq!(
            render(&op).unwrap(),
            r#"<get-config><source><candidate/></source><filter type="subtree"><interfaces/></filter></get-config>"#
        );
    }

    #[test]
    fn test_get_with_xpath_filter() {
        let op = Get::new().filter(Filter::Xpath("/interfaces/interface[name='eth0']".into()));
        assert_eq!(
            render(&op).unwrap(),
            r#"<get><filter type="xpath" select="/interfaces/interface[name=&apos;eth0&apos;]"/></get>"#
        );
    }

    #[test]
    fn test_datastore_custom_and_invalid() {
        assert_eq!(
            render(&Datastore::Other("vendor-store".into())).unwrap(),
            "<vendor-store/>"
        );
        assert!(matches!(
            render(&Datastore::Other(String::new())),
            Err(Error::InvalidValue(_))
        ));
        assert!(matches!(
            render(&Datastore::Other("<xml-elements>".into())),
            Err(Error::InvalidValue(_))
        ));
    }

    #[test]
    fn test_edit_config_all_options() {
        let op = EditConfig::new(Datastore::Candidate, "<interfaces><mtu>9000</mtu></interfaces>")
            .default_operation(MergeStrategy::Replace)
            .test_option(TestStrategy::TestOnly)
            .error_option(ErrorStrategy::ContinueOnError);
        assert_eq!(
            render(&op).unwrap(),
            "<edit-config><target><candidate/></target>\
             <default-operation>replace</default-operation>\
             <test-option>test-only</test-option>\
             <error-option>continue-on-error</error-option>\
             <config><interfaces><mtu>9000</mtu></interfaces></config>\
             </edit-config>"
        );
    }

    #[test]
    fn test_edit_config_from_url() {
        let op = EditConfig::from_url(
            Datastore::Startup,
            Url("ftp://files.example.com/config.xml".into()),
        );
        let xml = render(&op).unwrap();
        assert!(xml.contains("<target><startup/></target>"));
        assert!(xml.contains("<url>ftp://files.example.com/config.xml</url>"));
        assert!(!xml.contains("<config>"));
    }

    #[test]
    fn test_copy_config_datastore_to_url() {
        let op = CopyConfig::new(
            Datastore::Running,
            Url("https://backups.example.com/router.cfg".into()),
        );
        assert_eq!(
            render(&op).unwrap(),
            "<copy-config><source><running/></source>\
             <target><url>https://backups.example.com/router.cfg</url></target>\
             </copy-config>"
        );
    }

    #[test]
    fn test_lock_unlock_delete() {
        assert_eq!(
            render(&Lock::new(Datastore::Candidate)).unwrap(),
            "<lock><target><candidate/></target></lock>"
        );
        assert_eq!(
            render(&Unlock::new(Datastore::Candidate)).unwrap(),
            "<unlock><target><candidate/></target></unlock>"
        );
        assert_eq!(
            render(&DeleteConfig::new(Datastore::Startup)).unwrap(),
            "<delete-config><target><startup/></target></delete-config>"
        );
    }

    #[test]
    fn test_validate_candidate() {
        assert_eq!(
            render(&Validate::new(Datastore::Candidate)).unwrap(),
            "<validate><source><candidate/></source></validate>"
        );
    }

    #[test]
    fn test_commit_plain() {
        assert_eq!(render(&Commit::new()).unwrap(), "<commit/>");
    }

    #[test]
    fn test_commit_confirmed_with_timeout() {
        let op = Commit::new()
            .confirmed()
            .confirm_timeout(Duration::from_secs(60));
        assert_eq!(
            render(&op).unwrap(),
            "<commit><confirmed/><confirm-timeout>60</confirm-timeout></commit>"
        );
    }

    #[test]
    fn test_commit_persist_id_excludes_other_options() {
        let op = Commit::new().confirmed().persist_id("abc-123");
        assert!(matches!(render(&op), Err(Error::InvalidValue(_))));

        let op = Commit::new()
            .persist("tok")
            .persist_id("abc-123");
        assert!(matches!(render(&op), Err(Error::InvalidValue(_))));

        let op = Commit::new().persist_id("abc-123");
        assert_eq!(
            render(&op).unwrap(),
            "<commit><persist-id>abc-123</persist-id></commit>"
        );
    }

    #[test]
    fn test_cancel_commit() {
        assert_eq!(render(&CancelCommit::new()).unwrap(), "<cancel-commit/>");
        assert_eq!(
            render(&CancelCommit::new().persist_id("abc-123")).unwrap(),
            "<cancel-commit><persist-id>abc-123</persist-id></cancel-commit>"
        );
    }

    #[test]
    fn test_kill_session() {
        assert_eq!(
            render(&KillSession::new(42)).unwrap(),
            "<kill-session><session-id>42</session-id></kill-session>"
        );
    }

    #[test]
    fn test_data_reply_extraction() {
        let reply = DataReply::from_xml(b"<data><top><leaf>v</leaf></top></data>").unwrap();
        assert_eq!(reply.inner, b"<top><leaf>v</leaf></top>");

        let reply = DataReply::from_xml(b"<data/>").unwrap();
        assert!(reply.inner.is_empty());

        assert!(DataReply::from_xml(b"<ok/>").is_err());
    }
}
