use thiserror::Error;

/// Errors produced by the [`crate::codec`] bundle writer and reader.
///
/// Mirrors the granularity called for in the wire format spec: a corrupt
/// bundle always carries the byte offset at which the decoder gave up, so
/// callers can report exactly where a store got damaged.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt bundle at offset {offset}: {reason}")]
    CorruptBundle { reason: String, offset: u64 },

    #[error("blob store io error: {0}")]
    BlobIoError(String),
}

impl CodecError {
    pub fn corrupt(reason: impl Into<String>, offset: u64) -> Self {
        CodecError::CorruptBundle {
            reason: reason.into(),
            offset,
        }
    }
}

/// Errors surfaced by the consumed [`crate::item_state_manager::ItemStateManager`]
/// collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ItemStateError {
    #[error("no such item state")]
    NoSuchItemState,

    #[error("item state error: {0}")]
    ItemStateError(String),
}

/// Errors produced while validating or registering privilege definitions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PrivilegeError {
    #[error("cyclic privilege definitions detected involving {0:?}")]
    CyclicDefinitions(String),

    #[error("duplicate privilege name: {0}")]
    DuplicateName(String),

    #[error("privileges {0} and {1} have equivalent effective leaf sets")]
    EquivalentDefinitions(String, String),

    #[error("aggregate privilege {0} transitively includes built-in privilege {1}")]
    AggregationNotSupported(String, String),

    #[error("invalid privilege name: {0}")]
    InvalidName(String),
}

/// Errors produced by the [`crate::hierarchy::CachingHierarchyManager`].
///
/// A `NoSuchItemState` from the underlying [`ItemStateError`] is not an
/// error here: the manager treats it as "no such path" and returns `None`
/// (spec §7). This enum only covers genuine faults.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HierarchyError {
    #[error("item state error: {0}")]
    ItemState(String),
}

impl From<ItemStateError> for HierarchyError {
    fn from(value: ItemStateError) -> Self {
        match value {
            ItemStateError::NoSuchItemState => {
                // Callers resolving paths must intercept NoSuchItemState
                // before it gets here; reaching this arm means a caller
                // used `?` instead of the `Option`-returning resolve path.
                HierarchyError::ItemState("no such item state".to_string())
            }
            ItemStateError::ItemStateError(msg) => HierarchyError::ItemState(msg),
        }
    }
}
