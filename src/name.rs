use std::fmt;
use std::sync::Arc;

/// A fully-qualified JCR name: a namespace URI paired with a local name.
///
/// `Name` is canonical and immutable - two names are equal iff both fields
/// are equal, and the `Ord` impl (by URI, then local name) gives a stable
/// iteration order for tests and for building the BundleNames dictionary.
/// The empty-URI, empty-local-name pair is reserved as the `null` sentinel
/// used to terminate lists in the wire format (§4.2, §4.3).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Name {
    uri: Arc<str>,
    local_name: Arc<str>,
}

impl Name {
    pub fn new(uri: impl Into<Arc<str>>, local_name: impl Into<Arc<str>>) -> Self {
        Name {
            uri: uri.into(),
            local_name: local_name.into(),
        }
    }

    /// The default (empty) namespace, as used for names with no prefix.
    pub const DEFAULT_NS_URI: &'static str = "";

    pub fn in_default_ns(local_name: impl Into<Arc<str>>) -> Self {
        Name::new(Self::DEFAULT_NS_URI, local_name)
    }

    /// The reserved sentinel used to terminate name lists on the wire.
    /// Never a legal node or property name.
    pub fn null() -> Self {
        Name::new("", "")
    }

    pub fn is_null(&self) -> bool {
        self.uri.is_empty() && self.local_name.is_empty()
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.uri.is_empty() {
            write!(f, "{}", self.local_name)
        } else {
            write!(f, "{{{}}}{}", self.uri, self.local_name)
        }
    }
}
