//! XML building blocks shared by the wire messages and typed operations.
//!
//! NETCONF operation payloads need dynamic element names (a datastore named
//! `running` serializes as `<running/>`), so serialization is built from
//! small string-writing helpers rather than a derive-based mapper. Parsing
//! uses quick-xml events.

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{Error, Result};

/// Serialize a value as the inner XML of an `<rpc>` element.
///
/// Implemented by every typed operation in [`ops`](crate::ops). Raw
/// pass-through impls exist for `&str` and `String` as the escape hatch for
/// caller-supplied XML.
pub trait ToXml {
    /// Append this value's XML representation to `out`.
    ///
    /// Local validation failures (empty datastore names, incompatible
    /// options) are reported here, before any bytes reach the wire.
    fn write_xml(&self, out: &mut String) -> Result<()>;
}

impl ToXml for str {
    fn write_xml(&self, out: &mut String) -> Result<()> {
        out.push_str(self);
        Ok(())
    }
}

impl ToXml for String {
    fn write_xml(&self, out: &mut String) -> Result<()> {
        out.push_str(self);
        Ok(())
    }
}

impl<T: ToXml + ?Sized> ToXml for &T {
    fn write_xml(&self, out: &mut String) -> Result<()> {
        (**self).write_xml(out)
    }
}

/// Decode a typed response from the inner XML of an `<rpc-reply>`.
pub trait FromXml: Sized {
    fn from_xml(body: &[u8]) -> Result<Self>;
}

/// Replies where only the absence of errors matters (`<ok/>` and friends).
impl FromXml for () {
    fn from_xml(_body: &[u8]) -> Result<Self> {
        Ok(())
    }
}

/// Raw reply body, untouched.
impl FromXml for Vec<u8> {
    fn from_xml(body: &[u8]) -> Result<Self> {
        Ok(body.to_vec())
    }
}

/// Append `<name>text</name>` with the text content escaped.
pub(crate) fn write_text_element(out: &mut String, name: &str, text: &str) {
    out.push('<');
    out.push_str(name);
    out.push('>');
    out.push_str(&escape(text));
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

/// Append `<name/>` if `value` is true, nothing otherwise.
pub(crate) fn write_flag(out: &mut String, name: &str, value: bool) {
    if value {
        out.push('<');
        out.push_str(name);
        out.push_str("/>");
    }
}

/// Validate that `name` can be used verbatim as an XML element name.
///
/// Rejects the empty string and anything that is not a NAME per XML 1.0
/// (restricted to the characters NETCONF datastore names actually use).
pub(crate) fn validate_element_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => chars
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '.' | '_' | ':')),
        _ => false,
    };

    if !valid {
        return Err(Error::InvalidValue(format!(
            "{name:?} is not a valid element name"
        )));
    }
    Ok(())
}

/// Check whether a direct or nested element named `name` is present in
/// `body`. Presence of an empty element is how NETCONF encodes true.
pub(crate) fn element_present(body: &[u8], name: &str) -> bool {
    let mut reader = Reader::from_reader(body);
    reader.config_mut().trim_text(true);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == name.as_bytes() {
                    return true;
                }
            }
            Ok(Event::Eof) | Err(_) => return false,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_element_escapes() {
        let mut out = String::new();
        write_text_element(&mut out, "error-message", "expecting <candidate/> & more");
        assert_eq!(
            out,
            "<error-message>expecting &lt;candidate/&gt; &amp; more</error-message>"
        );
    }

    #[test]
    fn test_flag_true_false() {
        let mut out = String::new();
        write_flag(&mut out, "confirmed", true);
        write_flag(&mut out, "never", false);
        assert_eq!(out, "<confirmed/>");
    }

    #[test]
    fn test_element_name_validation() {
        assert!(validate_element_name("running").is_ok());
        assert!(validate_element_name("vendor-store.v2").is_ok());
        assert!(validate_element_name("_private").is_ok());

        assert!(validate_element_name("").is_err());
        assert!(validate_element_name("<xml-elements>").is_err());
        assert!(validate_element_name("two words").is_err());
        assert!(validate_element_name("1leading-digit").is_err());
    }

    #[test]
    fn test_element_present() {
        assert!(element_present(b"<foo><ok/></foo>", "ok"));
        assert!(element_present(b"<foo><ok></ok></foo>", "ok"));
        assert!(!element_present(b"<foo></foo>", "ok"));
    }

    #[test]
    fn test_raw_passthrough() {
        let mut out = String::new();
        "<foo><bar/></foo>".write_xml(&mut out).unwrap();
        assert_eq!(out, "<foo><bar/></foo>");
    }
}
