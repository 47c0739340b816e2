//! The node bundle binary codec (spec §4): a hand-rolled, variable-width
//! wire format with bit-packed headers, namespace interning, and pluggable
//! binary placement. Deliberately modeled as explicit pack/unpack functions
//! (spec §9 design note) rather than relying on any language's struct-field
//! layout or a bitfield-derive crate.
//!
//! The format is versioned (the first byte of every bundle); this build
//! only knows how to write and read version [`FORMAT_VERSION`]. A reader
//! that meets any other version byte fails closed with
//! [`crate::error::CodecError::CorruptBundle`] rather than guessing.

mod binding;
mod reader;
mod writer;

pub use binding::BundleBinding;
pub use reader::BundleReader;
pub use writer::BundleWriter;

use crate::name::Name;

/// The only bundle format version this build writes or understands.
pub const FORMAT_VERSION: u8 = 1;

/// Sentinel written in place of a small-binary length prefix to say "this
/// value's content lives in the configured `DataStore`, keyed by the string
/// that follows." Chosen to be a value no legal small-binary length (a
/// non-negative count of bytes) could ever take.
pub const BINARY_IN_DATA_STORE: i32 = -1;

/// Sentinel written in place of a small-binary length prefix to say "this
/// value's content lives in the configured `BlobStore`, keyed by the string
/// that follows."
pub const BINARY_IN_BLOB_STORE: i32 = -2;

/// The synthetic properties every bundle already represents structurally
/// (`primary_type`, `mixin_types`, the shareable UUID implied by
/// `referenceable`) and therefore never re-serializes as ordinary property
/// entries, even if a caller's in-memory `NodeBundle` happens to carry them
/// in its `properties` list.
pub fn is_synthetic_property(name: &Name) -> bool {
    name.uri() == crate::bundle_names::NS_JCR
        && matches!(name.local_name(), "primaryType" | "mixinTypes" | "uuid")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use std::io::Read as _;

    use crate::blob_store::{MemoryBlobStore, MemoryDataStore};
    use crate::bundle::{BundleChildEntry, BundlePropertyEntry, NodeBundle};
    use crate::node_id::NodeId;
    use crate::value::{BinaryValue, Decimal, PropertyType, Value};

    #[test]
    fn synthetic_properties_are_recognized_regardless_of_case_of_other_names() {
        assert!(is_synthetic_property(&Name::new(
            crate::bundle_names::NS_JCR,
            "primaryType"
        )));
        assert!(!is_synthetic_property(&Name::in_default_ns("primaryType")));
        assert!(!is_synthetic_property(&Name::new(
            crate::bundle_names::NS_JCR,
            "data"
        )));
    }

    fn sample_bundle() -> NodeBundle {
        let mut bundle = NodeBundle::new(
            Name::new(crate::bundle_names::NS_NT, "unstructured"),
            Some(NodeId::new(1, 2)),
        );
        bundle.mixin_types.push(Name::new(crate::bundle_names::NS_MIX, "referenceable"));
        bundle.properties.push(BundlePropertyEntry {
            name: Name::in_default_ns("title"),
            property_type: PropertyType::String,
            multi_valued: false,
            mod_count: 0,
            values: vec![Value::String("hello world".to_string())],
        });
        bundle.properties.push(BundlePropertyEntry {
            name: Name::new("http://example.com/custom", "tags"),
            property_type: PropertyType::String,
            multi_valued: true,
            mod_count: 3,
            values: vec![
                Value::String("a".to_string()),
                Value::String("b".to_string()),
                Value::String("c".to_string()),
            ],
        });
        bundle.properties.push(BundlePropertyEntry {
            name: Name::in_default_ns("count"),
            property_type: PropertyType::Long,
            multi_valued: false,
            mod_count: 0,
            values: vec![Value::Long(42)],
        });
        bundle.properties.push(BundlePropertyEntry {
            name: Name::in_default_ns("ratio"),
            property_type: PropertyType::Double,
            multi_valued: false,
            mod_count: 0,
            values: vec![Value::Double(3.5)],
        });
        bundle.properties.push(BundlePropertyEntry {
            name: Name::in_default_ns("enabled"),
            property_type: PropertyType::Boolean,
            multi_valued: false,
            mod_count: 0,
            values: vec![Value::Boolean(true)],
        });
        bundle.properties.push(BundlePropertyEntry {
            name: Name::in_default_ns("amount"),
            property_type: PropertyType::Decimal,
            multi_valued: false,
            mod_count: 0,
            values: vec![Value::Decimal(Decimal::new("12.50"))],
        });
        bundle.properties.push(BundlePropertyEntry {
            name: Name::in_default_ns("kind"),
            property_type: PropertyType::Name,
            multi_valued: false,
            mod_count: 0,
            values: vec![Value::Name(Name::new(
                crate::bundle_names::NS_NT,
                "folder",
            ))],
        });
        bundle.properties.push(BundlePropertyEntry {
            name: Name::in_default_ns("ref"),
            property_type: PropertyType::Reference,
            multi_valued: false,
            mod_count: 0,
            values: vec![Value::Reference(NodeId::new(7, 8))],
        });
        bundle.properties.push(BundlePropertyEntry {
            name: Name::in_default_ns("payload"),
            property_type: PropertyType::Binary,
            multi_valued: false,
            mod_count: 0,
            values: vec![Value::Binary(BinaryValue::Inline(b"small".to_vec()))],
        });
        bundle.referenceable = true;
        bundle.child_entries.push(BundleChildEntry {
            id: NodeId::new(0, 100),
            name: Name::in_default_ns("child-a"),
        });
        bundle.child_entries.push(BundleChildEntry {
            id: NodeId::new(0, 101),
            name: Name::in_default_ns("child-a"),
        });
        bundle.mod_count = 5;
        bundle.shared_set.push(NodeId::new(9, 9));
        bundle
    }

    fn round_trip(bundle: &NodeBundle) -> NodeBundle {
        let binding = BundleBinding::new(Arc::new(MemoryBlobStore::new()), 1024);
        let mut buf = Vec::new();
        let mut writer = BundleWriter::new(&mut buf, binding.clone());
        writer.write_bundle(NodeId::new(0, 1), bundle).unwrap();
        let mut reader = BundleReader::new(&buf[..], binding);
        reader.read_bundle().unwrap()
    }

    #[test]
    fn round_trips_every_value_type_except_the_recomputed_size_field() {
        let bundle = sample_bundle();
        let mut decoded = round_trip(&bundle);
        decoded.size = bundle.size;
        assert_eq!(decoded, bundle);
    }

    #[test]
    fn large_binary_without_data_store_is_placed_in_blob_store() {
        let blob_store = Arc::new(MemoryBlobStore::new());
        let binding = BundleBinding::new(blob_store.clone(), 8);
        let mut bundle = NodeBundle::new(Name::new(crate::bundle_names::NS_NT, "file"), None);
        let big = vec![0x42u8; 64];
        bundle.properties.push(BundlePropertyEntry {
            name: Name::in_default_ns("data"),
            property_type: PropertyType::Binary,
            multi_valued: false,
            mod_count: 0,
            values: vec![Value::Binary(BinaryValue::Inline(big.clone()))],
        });

        let mut buf = Vec::new();
        let mut writer = BundleWriter::new(&mut buf, binding.clone());
        writer.write_bundle(NodeId::new(0, 1), &bundle).unwrap();
        let mut reader = BundleReader::new(&buf[..], binding);
        let decoded = reader.read_bundle().unwrap();

        match &decoded.properties[0].values[0] {
            Value::Binary(BinaryValue::BlobRef(id)) => {
                let mut out = Vec::new();
                blob_store.get(id).unwrap().read_to_end(&mut out).unwrap();
                assert_eq!(out, big);
            }
            other => panic!("expected a BlobRef, got {:?}", other),
        }
    }

    #[test]
    fn binary_under_data_store_threshold_prefers_data_store() {
        let blob_store = Arc::new(MemoryBlobStore::new());
        let data_store = Arc::new(MemoryDataStore::new(16));
        let binding = BundleBinding::new(blob_store, 1024).with_data_store(data_store.clone());
        let mut bundle = NodeBundle::new(Name::new(crate::bundle_names::NS_NT, "file"), None);
        let content = vec![0x7au8; 20];
        bundle.properties.push(BundlePropertyEntry {
            name: Name::in_default_ns("data"),
            property_type: PropertyType::Binary,
            multi_valued: false,
            mod_count: 0,
            values: vec![Value::Binary(BinaryValue::Inline(content.clone()))],
        });

        let mut buf = Vec::new();
        let mut writer = BundleWriter::new(&mut buf, binding.clone());
        writer.write_bundle(NodeId::new(0, 1), &bundle).unwrap();
        let mut reader = BundleReader::new(&buf[..], binding);
        let decoded = reader.read_bundle().unwrap();

        match &decoded.properties[0].values[0] {
            Value::Binary(BinaryValue::DataStoreRef(id)) => {
                let mut out = Vec::new();
                data_store.get(id).unwrap().read_to_end(&mut out).unwrap();
                assert_eq!(out, content);
            }
            other => panic!("expected a DataStoreRef, got {:?}", other),
        }
    }

    #[test]
    fn empty_binary_is_a_zero_length_prefix() {
        let binding = BundleBinding::new(Arc::new(MemoryBlobStore::new()), 1024);
        let mut bundle = NodeBundle::new(Name::new(crate::bundle_names::NS_NT, "file"), None);
        bundle.properties.push(BundlePropertyEntry {
            name: Name::in_default_ns("data"),
            property_type: PropertyType::Binary,
            multi_valued: false,
            mod_count: 0,
            values: vec![Value::Binary(BinaryValue::Inline(Vec::new()))],
        });
        let mut decoded = round_trip(&bundle);
        decoded.size = bundle.size;
        assert_eq!(decoded, bundle);
    }

    #[test]
    fn seventh_distinct_custom_namespace_overflows_to_inline_slot() {
        let binding = BundleBinding::new(Arc::new(MemoryBlobStore::new()), 1024);
        let mut bundle = NodeBundle::new(Name::in_default_ns("nt:unstructured"), None);
        for i in 0..8 {
            bundle.properties.push(BundlePropertyEntry {
                name: Name::new(format!("http://example.com/ns{}", i), "p"),
                property_type: PropertyType::Long,
                multi_valued: false,
                mod_count: 0,
                values: vec![Value::Long(i as i64)],
            });
        }
        let mut decoded = round_trip(&bundle);
        decoded.size = bundle.size;
        assert_eq!(decoded, bundle);
    }

    #[test]
    fn unknown_version_byte_is_corrupt() {
        let binding = BundleBinding::new(Arc::new(MemoryBlobStore::new()), 1024);
        let mut reader = BundleReader::new(&[0xEEu8][..], binding);
        let err = reader.read_bundle().unwrap_err();
        assert!(matches!(err, crate::error::CodecError::CorruptBundle { .. }));
    }

    #[test]
    fn truncated_bundle_is_corrupt_not_a_bare_io_error() {
        let binding = BundleBinding::new(Arc::new(MemoryBlobStore::new()), 1024);
        let mut buf = Vec::new();
        let mut writer = BundleWriter::new(&mut buf, binding.clone());
        writer.write_bundle(NodeId::new(0, 1), &sample_bundle()).unwrap();
        buf.truncate(buf.len() / 2);
        let mut reader = BundleReader::new(&buf[..], binding);
        let err = reader.read_bundle().unwrap_err();
        assert!(matches!(err, crate::error::CodecError::CorruptBundle { .. }));
    }

    #[test]
    fn unknown_property_type_code_is_corrupt() {
        let binding = BundleBinding::new(Arc::new(MemoryBlobStore::new()), 1024);
        // version, null primary-type name, absent parent id, null mixin
        // terminator, then a property name (BundleNames[1]) followed by a
        // header byte whose low nibble (13) is not a valid PropertyType
        // code.
        let mut buf = vec![FORMAT_VERSION, 0x00, 0x00, 0x00];
        buf.push(1u8);
        buf.push(0x0D);
        let mut reader = BundleReader::new(&buf[..], binding);
        let err = reader.read_bundle().unwrap_err();
        assert!(matches!(err, crate::error::CodecError::CorruptBundle { .. }));
    }
}
