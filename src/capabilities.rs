//! Capability URIs and the capability set exchanged in hello messages.

use std::collections::HashSet;

const STD_CAP_PREFIX: &str = "urn:ietf:params:netconf:capability";

/// The base:1.0 capability URI (end-of-message framing).
pub const BASE_1_0: &str = "urn:ietf:params:netconf:base:1.0";

/// The base:1.1 capability URI (chunked framing).
pub const BASE_1_1: &str = "urn:ietf:params:netconf:base:1.1";

/// Capabilities sent by the client during the hello exchange unless
/// overridden with [`SessionBuilder`](crate::session::SessionBuilder).
pub const DEFAULT_CAPABILITIES: &[&str] = &[BASE_1_0, BASE_1_1];

/// Expand a capability shorthand to its full URI.
///
/// A leading `:` is replaced with the standard capability prefix, so
/// `:candidate:1.0` expands to
/// `urn:ietf:params:netconf:capability:candidate:1.0`. Anything else is
/// returned as-is.
pub fn expand_capability(s: &str) -> String {
    if let Some(rest) = s.strip_prefix(':') {
        format!("{STD_CAP_PREFIX}:{rest}")
    } else {
        s.to_string()
    }
}

/// An unordered set of canonicalized capability URIs.
///
/// Version comparison is not performed; capabilities are opaque strings
/// after expansion.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySet {
    caps: HashSet<String>,
}

impl CapabilitySet {
    /// Create an empty capability set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a capability, expanding shorthand first.
    pub fn add(&mut self, capability: &str) {
        self.caps.insert(expand_capability(capability));
    }

    /// Check membership. The query is expanded before the lookup.
    pub fn has(&self, capability: &str) -> bool {
        self.caps.contains(&expand_capability(capability))
    }

    /// Snapshot of all capabilities. Order is unspecified.
    pub fn all(&self) -> Vec<String> {
        self.caps.iter().cloned().collect()
    }

    /// Number of capabilities in the set.
    pub fn len(&self) -> usize {
        self.caps.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.caps.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for cap in iter {
            set.add(cap.as_ref());
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_shorthand() {
        assert_eq!(
            expand_capability(":candidate:1.0"),
            "urn:ietf:params:netconf:capability:candidate:1.0"
        );
    }

    #[test]
    fn test_expand_full_uri_unchanged() {
        assert_eq!(expand_capability(BASE_1_0), BASE_1_0);
        assert_eq!(expand_capability("http://example.com/cap"), "http://example.com/cap");
    }

    #[test]
    fn test_expand_empty() {
        assert_eq!(expand_capability(""), "");
    }

    #[test]
    fn test_has_expands_query() {
        let set: CapabilitySet = ["urn:ietf:params:netconf:capability:validate:1.1"]
            .into_iter()
            .collect();
        assert!(set.has(":validate:1.1"));
        assert!(set.has("urn:ietf:params:netconf:capability:validate:1.1"));
        assert!(!set.has(":validate:1.0"));
    }

    #[test]
    fn test_add_deduplicates() {
        let mut set = CapabilitySet::new();
        set.add(":startup:1.0");
        set.add("urn:ietf:params:netconf:capability:startup:1.0");
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_all_snapshot() {
        let set: CapabilitySet = DEFAULT_CAPABILITIES.iter().collect();
        let mut all = set.all();
        all.sort();
        assert_eq!(all, vec![BASE_1_0.to_string(), BASE_1_1.to_string()]);
    }
}
