//! The collaborators and thresholds a [`super::BundleWriter`] /
//! [`super::BundleReader`] pair needs: the external stores binary placement
//! consults, and the blob-size threshold at which placement prefers the
//! `BlobStore` over inlining (spec §4.3, §6).

use std::sync::Arc;

use crate::blob_store::{BlobStore, DataStore};

/// Shared configuration for one bundle persistence layer. Cheap to clone
/// (everything behind an `Arc`); a real repository constructs one of these
/// per workspace and hands clones to every `BundleWriter`/`BundleReader`.
#[derive(Clone)]
pub struct BundleBinding {
    blob_store: Arc<dyn BlobStore>,
    data_store: Option<Arc<dyn DataStore>>,
    blob_min_size: u64,
}

impl BundleBinding {
    /// `blob_min_size` is the byte length above which a binary value with
    /// no configured `DataStore` (or one too small to take it) is placed in
    /// `blob_store` rather than inlined (spec §4.3 step 4).
    pub fn new(blob_store: Arc<dyn BlobStore>, blob_min_size: u64) -> Self {
        BundleBinding {
            blob_store,
            data_store: None,
            blob_min_size,
        }
    }

    pub fn with_data_store(mut self, data_store: Arc<dyn DataStore>) -> Self {
        self.data_store = Some(data_store);
        self
    }

    pub fn blob_store(&self) -> &Arc<dyn BlobStore> {
        &self.blob_store
    }

    pub fn data_store(&self) -> Option<&Arc<dyn DataStore>> {
        self.data_store.as_ref()
    }

    pub fn blob_min_size(&self) -> u64 {
        self.blob_min_size
    }
}
