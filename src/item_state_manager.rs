//! The `ItemStateManager` collaborator consumed by the hierarchy manager
//! (spec §6). This core only specifies its interface; a real repository
//! backs it with persistence. [`InMemoryItemStateManager`] is a minimal
//! in-process implementation used by tests, grounded in the teacher's
//! `MemoryDirectoryService` (an in-memory stand-in for a service trait
//! that production code backs with real storage).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::ItemStateError;
use crate::item_id::ItemId;
use crate::item_state::{NodeState, PropertyState};
use crate::node_id::{NodeId, PropertyId};

/// Either a node or property state, as returned by [`ItemStateManager::get_item_state`].
pub enum ItemState {
    Node(Arc<Mutex<NodeState>>),
    Property(Arc<PropertyState>),
}

/// Lookup of item states by id (spec §6). Implementations must be safe to
/// call from multiple threads concurrently (spec §5).
pub trait ItemStateManager: Send + Sync {
    fn get_item_state(&self, id: &ItemId) -> Result<ItemState, ItemStateError>;

    fn get_node_state(&self, id: NodeId) -> Result<Arc<Mutex<NodeState>>, ItemStateError> {
        match self.get_item_state(&ItemId::Node(id))? {
            ItemState::Node(state) => Ok(state),
            ItemState::Property(_) => Err(ItemStateError::ItemStateError(
                "expected a node state".to_string(),
            )),
        }
    }

    fn get_property_state(&self, id: &PropertyId) -> Result<Arc<PropertyState>, ItemStateError> {
        match self.get_item_state(&ItemId::Property(id.clone()))? {
            ItemState::Property(state) => Ok(state),
            ItemState::Node(_) => Err(ItemStateError::ItemStateError(
                "expected a property state".to_string(),
            )),
        }
    }

    fn has_item_state(&self, id: &ItemId) -> bool {
        self.get_item_state(id).is_ok()
    }

    fn get_node_references(&self, id: NodeId) -> Vec<PropertyId>;

    fn has_node_references(&self, id: NodeId) -> bool {
        !self.get_node_references(id).is_empty()
    }
}

/// A minimal in-process `ItemStateManager`, sufficient for unit tests. Not
/// part of the spec's hard core; it exists only so the hierarchy manager's
/// tests have something concrete to drive against.
#[derive(Default)]
pub struct InMemoryItemStateManager {
    nodes: Mutex<HashMap<NodeId, Arc<Mutex<NodeState>>>>,
    properties: Mutex<HashMap<PropertyId, Arc<PropertyState>>>,
}

impl InMemoryItemStateManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_node(&self, state: NodeState) -> Arc<Mutex<NodeState>> {
        let id = state.id();
        let handle = Arc::new(Mutex::new(state));
        self.nodes.lock().insert(id, handle.clone());
        handle
    }

    pub fn insert_property(&self, state: PropertyState) -> Arc<PropertyState> {
        let handle = Arc::new(state);
        self.properties
            .lock()
            .insert(handle.id().clone(), handle.clone());
        handle
    }

    pub fn remove_node(&self, id: NodeId) -> Option<Arc<Mutex<NodeState>>> {
        self.nodes.lock().remove(&id)
    }

    pub fn node_handle(&self, id: NodeId) -> Option<Arc<Mutex<NodeState>>> {
        self.nodes.lock().get(&id).cloned()
    }
}

impl ItemStateManager for InMemoryItemStateManager {
    fn get_item_state(&self, id: &ItemId) -> Result<ItemState, ItemStateError> {
        match id {
            ItemId::Node(node_id) => self
                .nodes
                .lock()
                .get(node_id)
                .cloned()
                .map(ItemState::Node)
                .ok_or(ItemStateError::NoSuchItemState),
            ItemId::Property(property_id) => self
                .properties
                .lock()
                .get(property_id)
                .cloned()
                .map(ItemState::Property)
                .ok_or(ItemStateError::NoSuchItemState),
        }
    }

    fn get_node_references(&self, _id: NodeId) -> Vec<PropertyId> {
        // Reference tracking is part of the out-of-scope ACL/type surface;
        // this stub always reports no references, which is a valid (if
        // uninteresting) answer for every caller in this core.
        Vec::new()
    }
}
