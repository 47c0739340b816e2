//! The static, ordered dictionary of well-known `(namespace URI, local
//! name)` pairs used by the bundle codec to shrink common names to a
//! single byte (spec §4.2).
//!
//! This list is part of the wire format: entries may only be appended, and
//! only when the bundle format version (§4.4) is bumped. Index 0 is
//! permanently reserved for the `null` [`Name`] sentinel used to terminate
//! lists on the wire.

use lazy_static::lazy_static;

use crate::name::Name;

pub(crate) const NS_JCR: &str = "http://www.jcp.org/jcr/1.0";
pub(crate) const NS_NT: &str = "http://www.jcp.org/jcr/nt/1.0";
pub(crate) const NS_MIX: &str = "http://www.jcp.org/jcr/mix/1.0";
pub(crate) const NS_REP: &str = "internal";

/// The maximum index a name in the dictionary may have (inclusive). The
/// high bit of the name-encoding byte is reserved to flag "not in this
/// dictionary", so indices top out at 127.
pub const MAX_INDEX: u8 = 127;

lazy_static! {
    // Order matters and is part of the wire format: never reorder or
    // remove an entry, only append.
    static ref BUNDLE_NAMES: Vec<Name> = vec![
        Name::null(),                               // 0: end-of-list sentinel
        Name::new(NS_JCR, "primaryType"),            // 1
        Name::new(NS_JCR, "mixinTypes"),              // 2
        Name::new(NS_JCR, "uuid"),                    // 3
        Name::new(NS_JCR, "created"),                 // 4
        Name::new(NS_JCR, "createdBy"),                // 5
        Name::new(NS_JCR, "lastModified"),              // 6
        Name::new(NS_JCR, "lastModifiedBy"),             // 7
        Name::new(NS_JCR, "content"),                   // 8
        Name::new(NS_JCR, "data"),                      // 9
        Name::new(NS_JCR, "encoding"),                  // 10
        Name::new(NS_JCR, "mimeType"),                   // 11
        Name::new(NS_JCR, "title"),                      // 12
        Name::new(NS_JCR, "description"),                // 13
        Name::new(NS_JCR, "language"),                   // 14
        Name::new(NS_JCR, "isCheckedOut"),                // 15
        Name::new(NS_JCR, "versionHistory"),              // 16
        Name::new(NS_JCR, "baseVersion"),                 // 17
        Name::new(NS_JCR, "predecessors"),                // 18
        Name::new(NS_JCR, "successors"),                  // 19
        Name::new(NS_JCR, "frozenNode"),                  // 20
        Name::new(NS_JCR, "frozenPrimaryType"),            // 21
        Name::new(NS_JCR, "frozenMixinTypes"),              // 22
        Name::new(NS_JCR, "frozenUuid"),                   // 23
        Name::new(NS_JCR, "rootVersion"),                  // 24
        Name::new(NS_JCR, "versionLabels"),                 // 25
        Name::new(NS_JCR, "lockOwner"),                      // 26
        Name::new(NS_JCR, "lockIsDeep"),                      // 27
        Name::new(NS_NT, "base"),                              // 28
        Name::new(NS_NT, "unstructured"),                       // 29
        Name::new(NS_NT, "folder"),                              // 30
        Name::new(NS_NT, "file"),                                 // 31
        Name::new(NS_NT, "linkedFile"),                            // 32
        Name::new(NS_NT, "resource"),                               // 33
        Name::new(NS_NT, "hierarchyNode"),                           // 34
        Name::new(NS_NT, "query"),                                    // 35
        Name::new(NS_NT, "frozenNode"),                                // 36
        Name::new(NS_NT, "versionedChild"),                             // 37
        Name::new(NS_NT, "version"),                                     // 38
        Name::new(NS_NT, "versionHistory"),                               // 39
        Name::new(NS_NT, "versionLabels"),                                 // 40
        Name::new(NS_MIX, "referenceable"),                                 // 41
        Name::new(NS_MIX, "versionable"),                                    // 42
        Name::new(NS_MIX, "lockable"),                                       // 43
        Name::new(NS_MIX, "shareable"),                                       // 44
        Name::new(NS_MIX, "created"),                                         // 45
        Name::new(NS_MIX, "lastModified"),                                     // 46
        Name::new(NS_MIX, "title"),                                            // 47
        Name::new(NS_MIX, "language"),                                         // 48
        Name::new(NS_REP, "root"),                                              // 49
        Name::new(NS_REP, "system"),                                            // 50
        Name::new(NS_REP, "versionStorage"),                                     // 51
        Name::new(NS_REP, "nodeTypes"),                                          // 52
        Name::new(NS_REP, "policy"),                                             // 53
        Name::in_default_ns("jcr:content"),                                      // 54
    ];
}

/// Returns the dictionary index for `name`, or `-1` if `name` is not a
/// well-known name.
pub fn name_to_index(name: &Name) -> i32 {
    BUNDLE_NAMES
        .iter()
        .position(|n| n == name)
        .map(|i| i as i32)
        .unwrap_or(-1)
}

/// Returns the `Name` at dictionary index `i`, or `None` if `i` is out of
/// range. Index 0 yields the `null` sentinel.
pub fn index_to_name(i: u8) -> Option<Name> {
    BUNDLE_NAMES.get(i as usize).cloned()
}

/// The dictionary index reserved for the `null` sentinel.
pub const NULL_INDEX: u8 = 0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dictionary_fits_in_a_byte() {
        assert!(BUNDLE_NAMES.len() <= (MAX_INDEX as usize) + 1);
    }

    #[test]
    fn index_zero_is_null() {
        assert_eq!(index_to_name(0), Some(Name::null()));
        assert_eq!(name_to_index(&Name::null()), 0);
    }

    #[test]
    fn unknown_name_is_minus_one() {
        let unknown = Name::new("http://unknown.example/ns", "frobnicate");
        assert_eq!(name_to_index(&unknown), -1);
    }

    #[test]
    fn known_name_round_trips_through_index() {
        let n = Name::new(super::NS_NT, "folder");
        let idx = name_to_index(&n);
        assert!(idx >= 0);
        assert_eq!(index_to_name(idx as u8), Some(n));
    }
}
