//! Serializes a [`NodeBundle`] to its wire form (spec §4.3).

use std::io::Write;

use tracing::{instrument, warn};

use crate::bundle::NodeBundle;
use crate::bundle_names;
use crate::error::CodecError;
use crate::name::Name;
use crate::node_id::NodeId;
use crate::value::{BinaryValue, Decimal, PropertyType, Value};

use super::binding::BundleBinding;
use super::{is_synthetic_property, BINARY_IN_BLOB_STORE, BINARY_IN_DATA_STORE, FORMAT_VERSION};

/// The number of real (non-overflow) namespace intern slots: index 0 is
/// permanently the default namespace, leaving six for custom URIs before a
/// bundle falls back to writing a URI inline every time it recurs.
const INTERN_SLOT_COUNT: usize = 7;

/// Writes one or more [`NodeBundle`]s to an underlying byte sink, threading
/// a per-instance namespace intern table across every `write_bundle` call.
/// A fresh `BundleWriter` starts its intern table empty (default namespace
/// only); callers that need per-bundle-independent tables should construct
/// a new `BundleWriter` per bundle, matching one physical record per table.
pub struct BundleWriter<W> {
    output: W,
    binding: BundleBinding,
    intern_slots: [Option<String>; INTERN_SLOT_COUNT],
}

impl<W: Write> BundleWriter<W> {
    pub fn new(output: W, binding: BundleBinding) -> Self {
        let mut intern_slots: [Option<String>; INTERN_SLOT_COUNT] = Default::default();
        intern_slots[0] = Some(Name::DEFAULT_NS_URI.to_string());
        BundleWriter {
            output,
            binding,
            intern_slots,
        }
    }

    pub fn into_inner(self) -> W {
        self.output
    }

    /// Writes `bundle`'s wire representation per the output sequence in
    /// spec §4.3, in order: version, primary type, parent id, mixins,
    /// properties (synthetic ones skipped), referenceable flag, child
    /// entries, mod count, shared set.
    ///
    /// `node_id` is the id of the node `bundle` describes (not its parent);
    /// it is not part of the bundle's own fields, since a bundle is keyed
    /// externally by the id of the record it lives under, but the binary
    /// placement policy needs it to mint distinct blob ids per property
    /// value slot.
    #[instrument(level = "trace", skip(self, bundle), fields(primary_type = %bundle.primary_type))]
    pub fn write_bundle(&mut self, node_id: NodeId, bundle: &NodeBundle) -> Result<(), CodecError> {
        self.output.write_all(&[FORMAT_VERSION])?;
        self.write_name(&bundle.primary_type)?;
        self.write_node_id(bundle.parent_id)?;

        for mixin in &bundle.mixin_types {
            self.write_name(mixin)?;
        }
        self.write_name(&Name::null())?;

        for entry in &bundle.properties {
            if is_synthetic_property(&entry.name) {
                continue;
            }
            self.write_name(&entry.name)?;
            self.write_property_entry(node_id, entry)?;
        }
        self.write_name(&Name::null())?;

        self.output
            .write_all(&[if bundle.referenceable { 1 } else { 0 }])?;

        for child in &bundle.child_entries {
            self.write_node_id(Some(child.id))?;
            self.write_name(&child.name)?;
        }
        self.write_node_id(None)?;

        crate::varint::write_varint(&mut self.output, bundle.mod_count)?;

        for shared_id in &bundle.shared_set {
            self.write_node_id(Some(*shared_id))?;
        }
        self.write_node_id(None)?;

        Ok(())
    }

    /// Writes a node id as a presence byte followed by its two 64-bit
    /// halves, or just the absent byte for `None`. Used both for the
    /// parent-id slot and as the terminator convention for child-entry and
    /// shared-set lists (spec §4.3).
    fn write_node_id(&mut self, id: Option<NodeId>) -> Result<(), CodecError> {
        match id {
            Some(id) => {
                self.output.write_all(&[1u8])?;
                self.output.write_all(&id.to_bytes())?;
            }
            None => self.output.write_all(&[0u8])?,
        }
        Ok(())
    }

    /// Encodes one name: a single dictionary-index byte when `name` is in
    /// [`bundle_names`], otherwise a `1NNN LLLL` header (namespace slot,
    /// local-name length class) followed by the namespace URI (on a slot's
    /// first use) and the local name bytes (spec §4.2).
    fn write_name(&mut self, name: &Name) -> Result<(), CodecError> {
        if name.is_null() {
            self.output.write_all(&[bundle_names::NULL_INDEX])?;
            return Ok(());
        }
        let dict_index = bundle_names::name_to_index(name);
        if dict_index >= 0 {
            self.output.write_all(&[dict_index as u8])?;
            return Ok(());
        }

        let (slot, is_new) = self.intern_slot(name.uri());
        let local = name.local_name().as_bytes();
        let l_field = local.len().saturating_sub(1).min(15) as u8;
        let header = 0x80 | (slot << 4) | l_field;
        self.output.write_all(&[header])?;
        if is_new {
            crate::varint::write_string(&mut self.output, name.uri())?;
        }
        if l_field < 15 {
            self.output.write_all(local)?;
        } else {
            crate::varint::write_bytes(&mut self.output, local, 16)?;
        }
        Ok(())
    }

    /// Finds or allocates an intern slot for `uri`, returning `(slot_index,
    /// is_new_use)`. Slots 0..6 persist across the whole bundle; slot 7 is
    /// the overflow marker used once all six custom slots are taken, and is
    /// never retained, so a URI that overflows is written out in full every
    /// time it recurs (spec §4.2).
    fn intern_slot(&mut self, uri: &str) -> (u8, bool) {
        for (i, slot) in self.intern_slots.iter().enumerate() {
            if slot.as_deref() == Some(uri) {
                return (i as u8, false);
            }
        }
        for (i, slot) in self.intern_slots.iter_mut().enumerate().skip(1) {
            if slot.is_none() {
                *slot = Some(uri.to_string());
                return (i as u8, true);
            }
        }
        (INTERN_SLOT_COUNT as u8, true)
    }

    /// Writes one property's header and value(s) (spec §4.3): `M = 0`
    /// single-valued entries carry no mod-count field, since the wire format
    /// only tracks mod-count for multi-valued properties (an asymmetry
    /// carried over unchanged from the source format).
    fn write_property_entry(
        &mut self,
        node_id: NodeId,
        entry: &crate::bundle::BundlePropertyEntry,
    ) -> Result<(), CodecError> {
        let type_code = entry.property_type.code();
        if !entry.multi_valued {
            self.output.write_all(&[type_code])?;
            let value = entry
                .values
                .first()
                .ok_or_else(|| CodecError::corrupt("single-valued property with no value", 0))?;
            self.write_value(node_id, &entry.name, 0, value)?;
            return Ok(());
        }

        let count = entry.values.len() as u32;
        let l = count + 1;
        if l < 15 {
            self.output.write_all(&[((l as u8) << 4) | type_code])?;
        } else {
            self.output.write_all(&[(0xF << 4) | type_code])?;
            crate::varint::write_varint(&mut self.output, l - 15)?;
        }
        crate::varint::write_varint(&mut self.output, entry.mod_count)?;
        for (i, value) in entry.values.iter().enumerate() {
            self.write_value(node_id, &entry.name, i, value)?;
        }
        Ok(())
    }

    fn write_value(
        &mut self,
        node_id: NodeId,
        property_name: &Name,
        value_index: usize,
        value: &Value,
    ) -> Result<(), CodecError> {
        match value {
            Value::Long(v) => self.output.write_all(&v.to_be_bytes())?,
            Value::Double(v) => self.output.write_all(&v.to_be_bytes())?,
            Value::Boolean(b) => self.output.write_all(&[if *b { 1 } else { 0 }])?,
            Value::Decimal(d) => self.write_decimal(d)?,
            Value::Name(n) => self.write_name(n)?,
            Value::Reference(id) => self.write_node_id(Some(*id))?,
            Value::WeakReference(id) => self.write_node_id(Some(*id))?,
            Value::Path(s) | Value::String(s) | Value::Date(s) | Value::Uri(s) => {
                crate::varint::write_string(&mut self.output, s)?
            }
            Value::Binary(b) => self.write_binary(node_id, property_name, value_index, b)?,
        }
        Ok(())
    }

    fn write_decimal(&mut self, d: &Decimal) -> Result<(), CodecError> {
        self.output.write_all(&[1u8])?;
        crate::varint::write_string(&mut self.output, d.canonical_string())?;
        Ok(())
    }

    /// Implements the binary placement policy (spec §4.3 step 4), in
    /// priority order: an already-placed reference is re-emitted without
    /// re-uploading; otherwise a configured `DataStore` takes values under
    /// its threshold, a configured `BlobStore` takes values over
    /// `blob_min_size`, and everything else is inlined.
    fn write_binary(
        &mut self,
        node_id: NodeId,
        property_name: &Name,
        value_index: usize,
        value: &BinaryValue,
    ) -> Result<(), CodecError> {
        match value {
            BinaryValue::DataStoreRef(existing_id) => {
                self.output.write_all(&BINARY_IN_DATA_STORE.to_be_bytes())?;
                crate::varint::write_string(&mut self.output, existing_id)?;
                Ok(())
            }
            BinaryValue::BlobRef(existing_id) => {
                self.output.write_all(&BINARY_IN_BLOB_STORE.to_be_bytes())?;
                crate::varint::write_string(&mut self.output, existing_id)?;
                Ok(())
            }
            BinaryValue::Inline(bytes) => {
                if let Some(data_store) = self.binding.data_store().cloned() {
                    if (bytes.len() as u64) < data_store.min_record_length().saturating_sub(1) {
                        return self.write_small_binary(bytes);
                    }
                    self.output.write_all(&BINARY_IN_DATA_STORE.to_be_bytes())?;
                    let id = data_store
                        .put(&mut &bytes[..])
                        .map_err(|e| CodecError::BlobIoError(e.to_string()))?;
                    crate::varint::write_string(&mut self.output, &id)?;
                    return Ok(());
                }

                if (bytes.len() as u64) > self.binding.blob_min_size() {
                    let property_id =
                        crate::node_id::PropertyId::new(node_id, property_name.clone());
                    let id = self
                        .binding
                        .blob_store()
                        .create_id(&property_id, value_index)
                        .map_err(|e| CodecError::BlobIoError(e.to_string()))?;
                    match self
                        .binding
                        .blob_store()
                        .put(&id, &mut &bytes[..], bytes.len() as u64)
                    {
                        Ok(()) => {
                            self.output.write_all(&BINARY_IN_BLOB_STORE.to_be_bytes())?;
                            crate::varint::write_string(&mut self.output, &id)?;
                            Ok(())
                        }
                        Err(e) => {
                            crate::blob_store::best_effort_cleanup(
                                self.binding.blob_store().as_ref(),
                                &id,
                            );
                            Err(CodecError::BlobIoError(e.to_string()))
                        }
                    }
                } else {
                    self.write_small_binary(bytes)
                }
            }
        }
    }

    /// Writes the small-binary form: a 4-byte length prefix (big-endian,
    /// signed) followed by the raw bytes. A length that can't fit in an
    /// `i32` - the signed-32-bit world the length prefix lives in - can
    /// never arise from a legitimate bundle; rather than silently wrap it
    /// into a negative prefix (which would collide with the placement
    /// sentinels) we log and substitute an empty value, matching the
    /// documented lossy-recovery policy for small-binary write failures
    /// (spec §4.3, §7).
    fn write_small_binary(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        let len = small_binary_length_header(bytes.len());
        if len == 0 && !bytes.is_empty() {
            warn!(len = bytes.len(), "binary value too large for the small-binary length prefix; substituting empty value");
            self.output.write_all(&0i32.to_be_bytes())?;
            return Ok(());
        }
        self.output.write_all(&len.to_be_bytes())?;
        self.output.write_all(bytes)?;
        Ok(())
    }
}

/// The 4-byte length prefix a small-binary value of `len` bytes gets, or
/// `0` if `len` overflows what the signed 32-bit prefix can represent.
fn small_binary_length_header(len: usize) -> i32 {
    if len > i32::MAX as usize {
        0
    } else {
        len as i32
    }
}
