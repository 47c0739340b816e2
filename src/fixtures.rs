//! Reusable test fixtures, mirroring the teacher's `src/fixtures.rs`: here,
//! a small mutable node tree backed by an [`InMemoryItemStateManager`],
//! used by the `hierarchy` and `item_state` test suites to drive real
//! structural mutations (add/remove/move/reorder/share) rather than hand-
//! building individual `NodeState`s.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::item_state::NodeState;
use crate::item_state_manager::InMemoryItemStateManager;
use crate::name::Name;
use crate::node_id::NodeId;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn fresh_id() -> NodeId {
    NodeId::new(0, NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

/// A tiny in-memory node tree, rooted at `root_id`, that test suites grow
/// with [`TreeFixture::add_child`] and mutate with the other methods. Every
/// mutation goes through the real [`NodeState`] structural operations, so
/// the listener events a [`crate::hierarchy::CachingHierarchyManager`]
/// observes are exactly what production code would fire.
pub struct TreeFixture {
    pub manager: Arc<InMemoryItemStateManager>,
    pub root_id: NodeId,
}

impl Default for TreeFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeFixture {
    pub fn new() -> Self {
        let manager = Arc::new(InMemoryItemStateManager::new());
        let root_id = fresh_id();
        manager.insert_node(NodeState::new(
            root_id,
            Name::in_default_ns("nt:unstructured"),
            None,
        ));
        TreeFixture { manager, root_id }
    }

    fn handle(&self, id: NodeId) -> Arc<parking_lot::Mutex<NodeState>> {
        self.manager
            .node_handle(id)
            .unwrap_or_else(|| panic!("no such node in fixture: {id}"))
    }

    /// Adds a new child named `name` under `parent_id`, creating its
    /// `NodeState` with `parent_id` as its sole (primary) parent.
    pub fn add_child(&mut self, parent_id: NodeId, name: &str) -> NodeId {
        let id = fresh_id();
        self.handle(parent_id)
            .lock()
            .add_child(Name::in_default_ns(name), id);
        self.manager.insert_node(NodeState::new(
            id,
            Name::in_default_ns("nt:unstructured"),
            Some(parent_id),
        ));
        id
    }

    pub fn add_property(&mut self, node_id: NodeId, name: &str) {
        self.handle(node_id).lock().add_property(Name::in_default_ns(name));
    }

    /// Removes the `index`-th same-named child `name` of `parent_id`. If
    /// the removed node's primary parent was `parent_id` and it has no
    /// alternate parents left in its shared-set, the node is fully
    /// discarded and dropped from the manager (spec §3's "destroyed when no
    /// referent holds it"); otherwise the next entry in its shared-set is
    /// promoted to primary parent.
    pub fn remove_child(&mut self, parent_id: NodeId, name: &str, index: u32) -> Option<NodeId> {
        let removed = self
            .handle(parent_id)
            .lock()
            .remove_child(&Name::in_default_ns(name), index)?;

        let child = self.handle(removed);
        let mut guard = child.lock();
        if guard.parent_id() == Some(parent_id) {
            if let Some(&next_parent) = guard.shared_set().first() {
                guard.remove_share(next_parent);
                guard.set_parent_id(Some(next_parent));
            } else {
                guard.discard();
                drop(guard);
                self.manager.remove_node(removed);
            }
        } else {
            guard.remove_share(parent_id);
        }
        Some(removed)
    }

    /// Adds `node_id` as a child of `new_parent_id` under `name`, without
    /// removing it from any existing parent - a clone/share (spec §4.6).
    pub fn add_share(&mut self, node_id: NodeId, new_parent_id: NodeId, name: &str) {
        self.handle(new_parent_id)
            .lock()
            .add_child(Name::in_default_ns(name), node_id);
        self.handle(node_id).lock().add_share(new_parent_id);
    }

    /// Moves the `old_index`-th same-named child `old_name` of `old_parent`
    /// to `new_parent` under `new_name` (spec §4.6: move = remove + add).
    pub fn move_child(
        &mut self,
        old_parent: NodeId,
        old_name: &str,
        old_index: u32,
        new_parent: NodeId,
        new_name: &str,
    ) -> Option<NodeId> {
        let id = self
            .handle(old_parent)
            .lock()
            .remove_child(&Name::in_default_ns(old_name), old_index)?;
        self.handle(new_parent)
            .lock()
            .add_child(Name::in_default_ns(new_name), id);
        self.handle(id).lock().set_parent_id(Some(new_parent));
        Some(id)
    }

    /// Renames the `index`-th same-named child `name` of `parent_id` to
    /// `new_name`.
    pub fn rename_child(
        &mut self,
        parent_id: NodeId,
        name: &str,
        index: u32,
        new_name: &str,
    ) -> Option<u32> {
        self.handle(parent_id).lock().rename_child(
            &Name::in_default_ns(name),
            index,
            Name::in_default_ns(new_name),
        )
    }

    /// Reorders `child_id` to just before `before_id` (or to the end, if
    /// `None`) among `parent_id`'s children.
    pub fn order_before(&mut self, parent_id: NodeId, child_id: NodeId, before_id: Option<NodeId>) -> bool {
        self.handle(parent_id).lock().order_before(child_id, before_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_child_links_parent_and_child() {
        let mut fx = TreeFixture::new();
        let a = fx.add_child(fx.root_id, "a");
        let b = fx.add_child(a, "b");
        assert_eq!(fx.handle(b).lock().parent_id(), Some(a));
        assert_eq!(fx.handle(a).lock().child_entries().len(), 1);
    }

    #[test]
    fn remove_child_without_shares_drops_the_node() {
        let mut fx = TreeFixture::new();
        let a = fx.add_child(fx.root_id, "a");
        let b = fx.add_child(a, "b");
        fx.remove_child(a, "b", 1);
        assert!(fx.manager.node_handle(b).is_none());
    }

    #[test]
    fn remove_child_with_shares_promotes_alternate_parent() {
        let mut fx = TreeFixture::new();
        let a1 = fx.add_child(fx.root_id, "a1");
        let a2 = fx.add_child(fx.root_id, "a2");
        let b = fx.add_child(a1, "b1");
        fx.add_share(b, a2, "b2");
        fx.remove_child(a1, "b1", 1);
        assert!(fx.manager.node_handle(b).is_some());
        assert_eq!(fx.handle(b).lock().parent_id(), Some(a2));
    }
}
