//! The `BlobStore` and `DataStore` collaborators consumed by the bundle
//! codec (spec §6). Both are treated as thread-safe by contract - the
//! codec may invoke them concurrently from different bundle encode/decode
//! calls (spec §5).

use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

use std::collections::HashMap;

use crate::node_id::PropertyId;

/// External large-binary storage, keyed by an opaque string id the store
/// itself mints via [`BlobStore::create_id`].
pub trait BlobStore: Send + Sync {
    /// Allocates a new blob id for the given property value slot. Does not
    /// reserve storage; the id is handed to [`BlobStore::put`] next.
    fn create_id(&self, property_id: &PropertyId, value_index: usize) -> io::Result<String>;

    /// Streams `length` bytes from `reader` into the blob named `id`.
    fn put(&self, id: &str, reader: &mut dyn Read, length: u64) -> io::Result<()>;

    /// Opens a reader over the blob named `id`.
    fn get(&self, id: &str) -> io::Result<Box<dyn Read + Send>>;

    /// Removes the blob named `id`. Used for best-effort cleanup when an
    /// encode aborts after allocating but before committing a blob.
    fn remove(&self, id: &str) -> io::Result<()>;

    /// Optional zero-copy retrieval capability: a store that can mmap or
    /// otherwise hand back a borrowed buffer may implement this; callers
    /// fall back to [`BlobStore::get`] when it returns `None`.
    fn get_resource(&self, _id: &str) -> Option<Arc<[u8]>> {
        None
    }
}

/// A content-addressed small-object store, consulted by the binary
/// placement policy (spec §4.3) before the `BlobStore` threshold.
pub trait DataStore: Send + Sync {
    /// Values shorter than `min_record_length - 1` bytes are written inline
    /// rather than through this store.
    fn min_record_length(&self) -> u64;

    /// Persists `reader`'s content and returns its identifier string.
    fn put(&self, reader: &mut dyn Read) -> io::Result<String>;

    fn get(&self, identifier: &str) -> io::Result<Box<dyn Read + Send>>;
}

/// An in-memory [`BlobStore`] used by tests and as a reference
/// implementation, mirroring the teacher's `MemoryBlobService`.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    next_id: Mutex<u64>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn create_id(&self, property_id: &PropertyId, value_index: usize) -> io::Result<String> {
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        Ok(format!("{}#{}-{}", property_id, value_index, *next_id))
    }

    fn put(&self, id: &str, reader: &mut dyn Read, length: u64) -> io::Result<()> {
        let mut buf = Vec::with_capacity(length as usize);
        reader.read_to_end(&mut buf)?;
        self.blobs.lock().unwrap().insert(id.to_string(), buf);
        Ok(())
    }

    fn get(&self, id: &str) -> io::Result<Box<dyn Read + Send>> {
        let blobs = self.blobs.lock().unwrap();
        match blobs.get(id) {
            Some(bytes) => Ok(Box::new(io::Cursor::new(bytes.clone()))),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "no such blob")),
        }
    }

    fn remove(&self, id: &str) -> io::Result<()> {
        self.blobs.lock().unwrap().remove(id);
        Ok(())
    }
}

/// An in-memory [`DataStore`] used by tests.
pub struct MemoryDataStore {
    min_record_length: u64,
    records: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryDataStore {
    pub fn new(min_record_length: u64) -> Self {
        MemoryDataStore {
            min_record_length,
            records: Mutex::new(HashMap::new()),
        }
    }
}

impl DataStore for MemoryDataStore {
    fn min_record_length(&self) -> u64 {
        self.min_record_length
    }

    fn put(&self, reader: &mut dyn Read) -> io::Result<String> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        let id = format!("sha-stub:{:x}", buf.len() as u64 ^ 0x9e37_79b9);
        self.records.lock().unwrap().insert(id.clone(), buf);
        Ok(id)
    }

    fn get(&self, identifier: &str) -> io::Result<Box<dyn Read + Send>> {
        let records = self.records.lock().unwrap();
        match records.get(identifier) {
            Some(bytes) => Ok(Box::new(io::Cursor::new(bytes.clone()))),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "no such record")),
        }
    }
}

/// Discards a partially-written blob, best-effort. Used on the abort path
/// of the binary placement policy (spec §4.3 step 4, §5).
pub fn best_effort_cleanup(store: &dyn BlobStore, id: &str) {
    let _ = store.remove(id);
}

#[allow(dead_code)]
fn _assert_write_trait_object_safe(_w: &mut dyn Write) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::Name;
    use crate::node_id::NodeId;

    #[test]
    fn memory_blob_store_round_trips() {
        let store = MemoryBlobStore::new();
        let pid = PropertyId::new(NodeId::new(0, 1), Name::in_default_ns("jcr:data"));
        let id = store.create_id(&pid, 0).unwrap();
        let data = b"hello blob store";
        store.put(&id, &mut &data[..], data.len() as u64).unwrap();
        let mut out = Vec::new();
        store.get(&id).unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn remove_makes_subsequent_get_fail() {
        let store = MemoryBlobStore::new();
        let pid = PropertyId::new(NodeId::new(0, 1), Name::in_default_ns("jcr:data"));
        let id = store.create_id(&pid, 0).unwrap();
        store.put(&id, &mut &b"x"[..], 1).unwrap();
        store.remove(&id).unwrap();
        assert!(store.get(&id).is_err());
    }
}
