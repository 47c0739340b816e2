//! Deserializes a [`NodeBundle`] from its wire form (spec §4.4). Every
//! failure mode is surfaced as [`CodecError::CorruptBundle`] carrying the
//! byte offset the reader had reached, except genuine I/O faults from the
//! underlying stream (`CodecError::Io`) and blob-store faults
//! (`CodecError::BlobIoError`).

use std::io::Read;

use tracing::instrument;

use crate::bundle::{BundleChildEntry, BundlePropertyEntry, NodeBundle};
use crate::bundle_names;
use crate::error::CodecError;
use crate::name::Name;
use crate::node_id::NodeId;
use crate::value::{BinaryValue, Decimal, PropertyType, Value};
use crate::varint::CountingReader;

use super::binding::BundleBinding;
use super::{BINARY_IN_BLOB_STORE, BINARY_IN_DATA_STORE, FORMAT_VERSION};

const INTERN_SLOT_COUNT: usize = 7;

/// Reads bundles written by [`super::BundleWriter`]. Like the writer, a
/// single instance's namespace intern table spans every `read_bundle` call
/// made on it; pair one reader (or one writer) with exactly one physical
/// record.
pub struct BundleReader<R> {
    input: CountingReader<R>,
    #[allow(dead_code)]
    binding: BundleBinding,
    intern_slots: [Option<String>; INTERN_SLOT_COUNT],
}

impl<R: Read> BundleReader<R> {
    pub fn new(input: R, binding: BundleBinding) -> Self {
        let mut intern_slots: [Option<String>; INTERN_SLOT_COUNT] = Default::default();
        intern_slots[0] = Some(Name::DEFAULT_NS_URI.to_string());
        BundleReader {
            input: CountingReader::new(input),
            binding,
            intern_slots,
        }
    }

    fn offset(&self) -> u64 {
        self.input.position()
    }

    #[instrument(level = "trace", skip(self))]
    pub fn read_bundle(&mut self) -> Result<NodeBundle, CodecError> {
        let mut version = [0u8; 1];
        self.input.read_exact(&mut version).map_err(|e| {
            map_eof(e, self.offset(), "premature end of bundle before version byte")
        })?;
        if version[0] != FORMAT_VERSION {
            return Err(CodecError::corrupt(
                format!("unknown bundle format version {}", version[0]),
                self.offset(),
            ));
        }

        let primary_type = self.read_name()?;
        let parent_id = self.read_node_id()?;

        let mut mixin_types = Vec::new();
        loop {
            let name = self.read_name()?;
            if name.is_null() {
                break;
            }
            mixin_types.push(name);
        }

        let mut properties = Vec::new();
        loop {
            let name = self.read_name()?;
            if name.is_null() {
                break;
            }
            let entry = self.read_property_entry(name)?;
            properties.push(entry);
        }

        let mut referenceable_byte = [0u8; 1];
        self.input
            .read_exact(&mut referenceable_byte)
            .map_err(|e| map_eof(e, self.offset(), "premature end of bundle before referenceable flag"))?;
        let referenceable = referenceable_byte[0] != 0;

        let mut child_entries = Vec::new();
        loop {
            let id = self.read_node_id()?;
            let Some(id) = id else { break };
            let name = self.read_name()?;
            child_entries.push(BundleChildEntry { id, name });
        }

        let mod_count = crate::varint::read_varint(&mut self.input)?;

        let mut shared_set = Vec::new();
        loop {
            let id = self.read_node_id()?;
            let Some(id) = id else { break };
            shared_set.push(id);
        }

        Ok(NodeBundle {
            primary_type,
            parent_id,
            mixin_types,
            properties,
            referenceable,
            child_entries,
            mod_count,
            shared_set,
            size: self.offset(),
        })
    }

    fn read_node_id(&mut self) -> Result<Option<NodeId>, CodecError> {
        let mut present = [0u8; 1];
        self.input
            .read_exact(&mut present)
            .map_err(|e| map_eof(e, self.offset(), "premature end of bundle reading a node id"))?;
        if present[0] == 0 {
            return Ok(None);
        }
        let mut bytes = [0u8; 16];
        self.input
            .read_exact(&mut bytes)
            .map_err(|e| map_eof(e, self.offset(), "premature end of bundle reading a node id"))?;
        Ok(Some(NodeId::from_bytes(bytes)))
    }

    /// Decodes one name header. The top bit of the first byte distinguishes
    /// a dictionary index (spec §4.2, clear) from an interned/inline name
    /// (set): `1NNN LLLL`, namespace slot then local-name length class.
    /// Whether a slot's URI follows on the wire is inferred from whether
    /// this reader has already populated that slot - the same decision the
    /// writer made when choosing whether to emit it - so both sides must
    /// process names in the exact order they were written.
    fn read_name(&mut self) -> Result<Name, CodecError> {
        let mut header = [0u8; 1];
        self.input
            .read_exact(&mut header)
            .map_err(|e| map_eof(e, self.offset(), "premature end of bundle reading a name"))?;
        let header = header[0];

        if header & 0x80 == 0 {
            if header == bundle_names::NULL_INDEX {
                return Ok(Name::null());
            }
            return bundle_names::index_to_name(header).ok_or_else(|| {
                CodecError::corrupt(
                    format!("unknown BundleNames dictionary index {}", header),
                    self.offset(),
                )
            });
        }

        let slot = ((header >> 4) & 0x07) as usize;
        let l_field = header & 0x0F;

        let uri = if slot == INTERN_SLOT_COUNT {
            // The overflow marker (spec §4.2): all six custom slots are
            // already taken, so this URI is always written out in full and
            // never stored.
            crate::varint::read_string(&mut self.input)?
        } else {
            match &self.intern_slots[slot] {
                Some(uri) => uri.clone(),
                None => {
                    let uri = crate::varint::read_string(&mut self.input)?;
                    self.intern_slots[slot] = Some(uri.clone());
                    uri
                }
            }
        };

        let local_bytes = if l_field < 15 {
            let mut buf = vec![0u8; (l_field as usize) + 1];
            self.input
                .read_exact(&mut buf)
                .map_err(|e| map_eof(e, self.offset(), "premature end of bundle reading a local name"))?;
            buf
        } else {
            crate::varint::read_bytes(&mut self.input, 16)?
        };
        let local_name = String::from_utf8(local_bytes)
            .map_err(|e| CodecError::corrupt(e.to_string(), self.offset()))?;
        Ok(Name::new(uri, local_name))
    }

    fn read_property_entry(&mut self, name: Name) -> Result<BundlePropertyEntry, CodecError> {
        let mut header = [0u8; 1];
        self.input
            .read_exact(&mut header)
            .map_err(|e| map_eof(e, self.offset(), "premature end of bundle reading a property header"))?;
        let header = header[0];
        let type_code = header & 0x0F;
        let m = header >> 4;

        let property_type = PropertyType::from_code(type_code).ok_or_else(|| {
            CodecError::corrupt(format!("unknown property type code {}", type_code), self.offset())
        })?;

        if m == 0 {
            let value = self.read_value(property_type)?;
            return Ok(BundlePropertyEntry {
                name,
                property_type,
                multi_valued: false,
                mod_count: 0,
                values: vec![value],
            });
        }

        let l = if m == 0xF {
            crate::varint::read_varint(&mut self.input)? + 15
        } else {
            m as u32
        };
        let n = l - 1;
        let mod_count = crate::varint::read_varint(&mut self.input)?;
        let mut values = Vec::with_capacity(n as usize);
        for _ in 0..n {
            values.push(self.read_value(property_type)?);
        }
        Ok(BundlePropertyEntry {
            name,
            property_type,
            multi_valued: true,
            mod_count,
            values,
        })
    }

    fn read_value(&mut self, property_type: PropertyType) -> Result<Value, CodecError> {
        Ok(match property_type {
            PropertyType::Long => {
                let mut buf = [0u8; 8];
                self.read_exact_mapped(&mut buf, "premature end of bundle reading a LONG value")?;
                Value::Long(i64::from_be_bytes(buf))
            }
            PropertyType::Double => {
                let mut buf = [0u8; 8];
                self.read_exact_mapped(&mut buf, "premature end of bundle reading a DOUBLE value")?;
                Value::Double(f64::from_be_bytes(buf))
            }
            PropertyType::Boolean => {
                let mut buf = [0u8; 1];
                self.read_exact_mapped(&mut buf, "premature end of bundle reading a BOOLEAN value")?;
                Value::Boolean(buf[0] != 0)
            }
            PropertyType::Decimal => {
                let mut present = [0u8; 1];
                self.read_exact_mapped(&mut present, "premature end of bundle reading a DECIMAL value")?;
                if present[0] == 0 {
                    return Err(CodecError::corrupt(
                        "absent DECIMAL value is not representable",
                        self.offset(),
                    ));
                }
                Value::Decimal(Decimal::new(crate::varint::read_string(&mut self.input)?))
            }
            PropertyType::Name => Value::Name(self.read_name()?),
            PropertyType::Reference => Value::Reference(self.read_node_id()?.ok_or_else(|| {
                CodecError::corrupt("absent REFERENCE value is not representable", self.offset())
            })?),
            PropertyType::WeakReference => {
                Value::WeakReference(self.read_node_id()?.ok_or_else(|| {
                    CodecError::corrupt(
                        "absent WEAKREFERENCE value is not representable",
                        self.offset(),
                    )
                })?)
            }
            PropertyType::Path => Value::Path(crate::varint::read_string(&mut self.input)?),
            PropertyType::String => Value::String(crate::varint::read_string(&mut self.input)?),
            PropertyType::Date => Value::Date(crate::varint::read_string(&mut self.input)?),
            PropertyType::Uri => Value::Uri(crate::varint::read_string(&mut self.input)?),
            PropertyType::Binary => Value::Binary(self.read_binary()?),
        })
    }

    fn read_binary(&mut self) -> Result<BinaryValue, CodecError> {
        let mut buf = [0u8; 4];
        self.read_exact_mapped(&mut buf, "premature end of bundle reading a BINARY length prefix")?;
        let raw = i32::from_be_bytes(buf);
        if raw == BINARY_IN_DATA_STORE {
            let id = crate::varint::read_string(&mut self.input)?;
            Ok(BinaryValue::DataStoreRef(id))
        } else if raw == BINARY_IN_BLOB_STORE {
            let id = crate::varint::read_string(&mut self.input)?;
            Ok(BinaryValue::BlobRef(id))
        } else if raw < 0 {
            Err(CodecError::corrupt(
                format!("invalid binary length sentinel {}", raw),
                self.offset(),
            ))
        } else {
            let len = raw as usize;
            let mut bytes = vec![0u8; len];
            self.input
                .read_exact(&mut bytes)
                .map_err(|e| map_eof(e, self.offset(), "premature end of bundle reading inline binary data"))?;
            Ok(BinaryValue::Inline(bytes))
        }
    }

    fn read_exact_mapped(&mut self, buf: &mut [u8], reason: &str) -> Result<(), CodecError> {
        self.input
            .read_exact(buf)
            .map_err(|e| map_eof(e, self.offset(), reason))
    }
}

fn map_eof(e: std::io::Error, offset: u64, reason: &str) -> CodecError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        CodecError::corrupt(reason, offset)
    } else {
        CodecError::Io(e)
    }
}
