//! In-memory item state entities and the structural-mutation listener
//! contract (spec §3, §4.5).
//!
//! Per the "cyclic ownership" design note (spec §9), a [`NodeState`] never
//! owns its parent or children directly - those are [`NodeId`] values, kept
//! in an arena elsewhere (the [`crate::item_state_manager::ItemStateManager`]
//! collaborator). This breaks the parent/child reference cycle and makes
//! eviction in the hierarchy cache well-defined.

use std::sync::Arc;

use crate::name::Name;
use crate::node_id::{NodeId, PropertyId};
use crate::value::{PropertyType, Value};

/// Lifecycle status of a [`NodeState`] or [`PropertyState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    New,
    Existing,
    Modified,
    Removed,
}

/// One entry in a node's ordered child list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildEntry {
    pub name: Name,
    pub id: NodeId,
}

/// Receives structural mutation events from a single subscribed
/// [`NodeState`], delivered synchronously under that state's mutation
/// critical section (spec §4.5). A `NodeState` holds at most one listener;
/// in this core, that's always the [`crate::hierarchy::CachingHierarchyManager`].
pub trait NodeStateListener: Send + Sync {
    /// A new child entry was added at 1-based SNS `child_index`.
    fn node_added(&self, parent: NodeId, child_name: &Name, child_index: u32, child_id: NodeId);

    /// A child entry was removed. Any surviving entries with the same name
    /// and a higher SNS index shift down by one.
    fn node_removed(&self, parent: NodeId, child_name: &Name, child_index: u32, child_id: NodeId);

    /// An opaque change to `state` (property add/remove, non-structural).
    fn node_modified(&self, state: NodeId);

    /// The child-entry list of `state` was replaced wholesale (reorder);
    /// SNS indexes for every name must be recomputed by observers.
    fn nodes_replaced(&self, state: NodeId);

    /// `state` is being evicted from memory.
    fn state_discarded(&self, state: NodeId);
}

/// The in-memory aggregate for one node (spec §3).
pub struct NodeState {
    id: NodeId,
    primary_type: Name,
    parent_id: Option<NodeId>,
    status: Status,
    child_entries: Vec<ChildEntry>,
    property_names: Vec<Name>,
    shared_set: Vec<NodeId>,
    listener: Option<Arc<dyn NodeStateListener>>,
}

impl NodeState {
    pub fn new(id: NodeId, primary_type: Name, parent_id: Option<NodeId>) -> Self {
        NodeState {
            id,
            primary_type,
            parent_id,
            status: Status::New,
            child_entries: Vec::new(),
            property_names: Vec::new(),
            shared_set: Vec::new(),
            listener: None,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn primary_type(&self) -> &Name {
        &self.primary_type
    }

    pub fn parent_id(&self) -> Option<NodeId> {
        self.parent_id
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    pub fn child_entries(&self) -> &[ChildEntry] {
        &self.child_entries
    }

    pub fn property_names(&self) -> impl Iterator<Item = &Name> {
        self.property_names.iter()
    }

    pub fn has_property(&self, name: &Name) -> bool {
        self.property_names.contains(name)
    }

    pub fn shared_set(&self) -> &[NodeId] {
        &self.shared_set
    }

    pub fn is_shareable(&self) -> bool {
        !self.shared_set.is_empty()
    }

    /// At most one listener slot is supported in this core (spec §4.5).
    pub fn set_listener(&mut self, listener: Option<Arc<dyn NodeStateListener>>) {
        self.listener = listener;
    }

    pub fn listener(&self) -> Option<Arc<dyn NodeStateListener>> {
        self.listener.clone()
    }

    /// Returns the index (into `child_entries`) of the `index`-th (1-based)
    /// same-name sibling named `name`, if it exists.
    fn position_of(&self, name: &Name, index: u32) -> Option<usize> {
        let mut seen = 0u32;
        for (i, entry) in self.child_entries.iter().enumerate() {
            if &entry.name == name {
                seen += 1;
                if seen == index {
                    return Some(i);
                }
            }
        }
        None
    }

    /// Adds a new child entry, computing its 1-based SNS index from the
    /// count of existing same-named siblings, and fires `node_added`.
    pub fn add_child(&mut self, name: Name, id: NodeId) -> u32 {
        let index = self
            .child_entries
            .iter()
            .filter(|e| e.name == name)
            .count() as u32
            + 1;
        self.child_entries.push(ChildEntry {
            name: name.clone(),
            id,
        });
        if let Some(listener) = self.listener.clone() {
            listener.node_added(self.id, &name, index, id);
        }
        index
    }

    /// Removes the `index`-th (1-based) same-named sibling `name`, firing
    /// `node_removed` on success.
    pub fn remove_child(&mut self, name: &Name, index: u32) -> Option<NodeId> {
        let pos = self.position_of(name, index)?;
        let entry = self.child_entries.remove(pos);
        if let Some(listener) = self.listener.clone() {
            listener.node_removed(self.id, name, index, entry.id);
        }
        Some(entry.id)
    }

    /// Replaces the child-entry list wholesale and fires `nodes_replaced`.
    /// Callers must supply a permutation of the existing entries.
    pub fn reorder(&mut self, new_order: Vec<ChildEntry>) {
        debug_assert_eq!(new_order.len(), self.child_entries.len());
        self.child_entries = new_order;
        if let Some(listener) = self.listener.clone() {
            listener.nodes_replaced(self.id);
        }
    }

    /// Moves the child entry for `child_id` to just before `before_id`
    /// (or to the end, if `before_id` is `None`). Fires `nodes_replaced`,
    /// since SNS indexes of same-named siblings may shift.
    pub fn order_before(&mut self, child_id: NodeId, before_id: Option<NodeId>) -> bool {
        let Some(pos) = self.child_entries.iter().position(|e| e.id == child_id) else {
            return false;
        };
        let entry = self.child_entries.remove(pos);
        let insert_at = match before_id {
            Some(bid) => self
                .child_entries
                .iter()
                .position(|e| e.id == bid)
                .unwrap_or(self.child_entries.len()),
            None => self.child_entries.len(),
        };
        self.child_entries.insert(insert_at, entry);
        if let Some(listener) = self.listener.clone() {
            listener.nodes_replaced(self.id);
        }
        true
    }

    /// Renames the `index`-th (1-based) same-named sibling `name` to
    /// `new_name`, expressed as `node_removed` + `node_added` (spec §4.6).
    /// Returns the new SNS index of the renamed child.
    pub fn rename_child(&mut self, name: &Name, index: u32, new_name: Name) -> Option<u32> {
        let id = self.remove_child(name, index)?;
        Some(self.add_child(new_name, id))
    }

    pub fn add_share(&mut self, parent_id: NodeId) {
        if !self.shared_set.contains(&parent_id) {
            self.shared_set.push(parent_id);
        }
    }

    pub fn remove_share(&mut self, parent_id: NodeId) {
        self.shared_set.retain(|p| *p != parent_id);
    }

    pub fn set_parent_id(&mut self, parent_id: Option<NodeId>) {
        self.parent_id = parent_id;
    }

    pub fn add_property(&mut self, name: Name) {
        if !self.property_names.contains(&name) {
            self.property_names.push(name);
            if let Some(listener) = self.listener.clone() {
                listener.node_modified(self.id);
            }
        }
    }

    pub fn remove_property(&mut self, name: &Name) -> bool {
        let existed = self.property_names.iter().position(|n| n == name);
        if let Some(pos) = existed {
            self.property_names.remove(pos);
            if let Some(listener) = self.listener.clone() {
                listener.node_modified(self.id);
            }
            true
        } else {
            false
        }
    }

    /// Fires `state_discarded` on the subscribed listener, if any.
    pub fn discard(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.state_discarded(self.id);
        }
        self.status = Status::Removed;
    }
}

/// The in-memory aggregate for one property (spec §3).
pub struct PropertyState {
    id: PropertyId,
    property_type: PropertyType,
    multi_valued: bool,
    mod_count: u32,
    values: Vec<Value>,
}

impl PropertyState {
    pub fn new(id: PropertyId, property_type: PropertyType, multi_valued: bool, values: Vec<Value>) -> Self {
        PropertyState {
            id,
            property_type,
            multi_valued,
            mod_count: 0,
            values,
        }
    }

    pub fn id(&self) -> &PropertyId {
        &self.id
    }

    pub fn property_type(&self) -> PropertyType {
        self.property_type
    }

    pub fn is_multi_valued(&self) -> bool {
        self.multi_valued
    }

    pub fn mod_count(&self) -> u32 {
        self.mod_count
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn set_values(&mut self, values: Vec<Value>) {
        self.values = values;
        self.mod_count = self.mod_count.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct RecordingListener {
        events: Mutex<Vec<String>>,
    }

    impl NodeStateListener for RecordingListener {
        fn node_added(&self, _parent: NodeId, name: &Name, index: u32, _id: NodeId) {
            self.events
                .lock()
                .push(format!("added({},{})", name.local_name(), index));
        }
        fn node_removed(&self, _parent: NodeId, name: &Name, index: u32, _id: NodeId) {
            self.events
                .lock()
                .push(format!("removed({},{})", name.local_name(), index));
        }
        fn node_modified(&self, _state: NodeId) {
            self.events.lock().push("modified".to_string());
        }
        fn nodes_replaced(&self, _state: NodeId) {
            self.events.lock().push("replaced".to_string());
        }
        fn state_discarded(&self, _state: NodeId) {
            self.events.lock().push("discarded".to_string());
        }
    }

    #[test]
    fn sns_indexes_assigned_in_insertion_order() {
        let mut node = NodeState::new(NodeId::new(0, 1), Name::in_default_ns("nt:unstructured"), None);
        let b = Name::in_default_ns("b");
        let idx1 = node.add_child(b.clone(), NodeId::new(0, 2));
        let idx2 = node.add_child(b.clone(), NodeId::new(0, 3));
        let idx3 = node.add_child(b.clone(), NodeId::new(0, 4));
        assert_eq!((idx1, idx2, idx3), (1, 2, 3));
    }

    #[test]
    fn remove_fires_listener_with_correct_index() {
        let listener = Arc::new(RecordingListener::default());
        let mut node = NodeState::new(NodeId::new(0, 1), Name::in_default_ns("nt:unstructured"), None);
        node.set_listener(Some(listener.clone()));
        let b = Name::in_default_ns("b");
        node.add_child(b.clone(), NodeId::new(0, 2));
        node.add_child(b.clone(), NodeId::new(0, 3));
        node.remove_child(&b, 1);
        assert_eq!(
            *listener.events.lock(),
            vec!["added(b,1)", "added(b,2)", "removed(b,1)"]
        );
    }

    #[test]
    fn discard_clears_listener_and_fires_once() {
        let listener = Arc::new(RecordingListener::default());
        let mut node = NodeState::new(NodeId::new(0, 1), Name::in_default_ns("nt:base"), None);
        node.set_listener(Some(listener.clone()));
        node.discard();
        assert_eq!(*listener.events.lock(), vec!["discarded"]);
        assert!(node.listener().is_none());
    }

    #[test]
    fn order_before_moves_entry_and_fires_replaced() {
        let listener = Arc::new(RecordingListener::default());
        let mut node = NodeState::new(NodeId::new(0, 1), Name::in_default_ns("nt:unstructured"), None);
        node.set_listener(Some(listener.clone()));
        let b = Name::in_default_ns("b");
        let b1 = NodeId::new(0, 1);
        let b2 = NodeId::new(0, 2);
        let b3 = NodeId::new(0, 3);
        node.add_child(b.clone(), b1);
        node.add_child(b.clone(), b2);
        node.add_child(b.clone(), b3);
        node.order_before(b2, Some(b1));
        assert_eq!(
            node.child_entries().iter().map(|e| e.id).collect::<Vec<_>>(),
            vec![b2, b1, b3]
        );
    }
}
