//! The `NamespaceRegistry` collaborator consumed by the codec and the rest
//! of the core (spec §6): a bidirectional prefix/URI mapping, read-only
//! during codec operation.

use std::collections::HashMap;

pub trait NamespaceRegistry: Send + Sync {
    fn uri_for_prefix(&self, prefix: &str) -> Option<String>;
    fn prefix_for_uri(&self, uri: &str) -> Option<String>;
}

/// A fixed in-memory registry, used by tests.
pub struct StaticNamespaceRegistry {
    prefix_to_uri: HashMap<String, String>,
    uri_to_prefix: HashMap<String, String>,
}

impl StaticNamespaceRegistry {
    pub fn new(mappings: impl IntoIterator<Item = (&'static str, &'static str)>) -> Self {
        let mut prefix_to_uri = HashMap::new();
        let mut uri_to_prefix = HashMap::new();
        for (prefix, uri) in mappings {
            prefix_to_uri.insert(prefix.to_string(), uri.to_string());
            uri_to_prefix.insert(uri.to_string(), prefix.to_string());
        }
        StaticNamespaceRegistry {
            prefix_to_uri,
            uri_to_prefix,
        }
    }

    pub fn with_jcr_builtins() -> Self {
        Self::new([
            ("jcr", "http://www.jcp.org/jcr/1.0"),
            ("nt", "http://www.jcp.org/jcr/nt/1.0"),
            ("mix", "http://www.jcp.org/jcr/mix/1.0"),
            ("", ""),
        ])
    }
}

impl NamespaceRegistry for StaticNamespaceRegistry {
    fn uri_for_prefix(&self, prefix: &str) -> Option<String> {
        self.prefix_to_uri.get(prefix).cloned()
    }

    fn prefix_for_uri(&self, uri: &str) -> Option<String> {
        self.uri_to_prefix.get(uri).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_builtin_prefixes() {
        let reg = StaticNamespaceRegistry::with_jcr_builtins();
        assert_eq!(
            reg.uri_for_prefix("nt").as_deref(),
            Some("http://www.jcp.org/jcr/nt/1.0")
        );
        assert_eq!(
            reg.prefix_for_uri("http://www.jcp.org/jcr/nt/1.0").as_deref(),
            Some("nt")
        );
    }

    #[test]
    fn unknown_prefix_is_none() {
        let reg = StaticNamespaceRegistry::with_jcr_builtins();
        assert_eq!(reg.uri_for_prefix("unknown"), None);
    }
}
