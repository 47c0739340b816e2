//! The codec-level representation of a node bundle (spec §3).

use crate::name::Name;
use crate::node_id::NodeId;
use crate::value::{PropertyType, Value};

/// One property entry inside a [`NodeBundle`].
#[derive(Debug, Clone, PartialEq)]
pub struct BundlePropertyEntry {
    pub name: Name,
    pub property_type: PropertyType,
    pub multi_valued: bool,
    pub mod_count: u32,
    pub values: Vec<Value>,
}

/// One child entry inside a [`NodeBundle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleChildEntry {
    pub id: NodeId,
    pub name: Name,
}

/// The wire-level shape of a node and all its inlined properties, mixins,
/// child references and shared-parent set (spec §3). This is the unit the
/// bundle codec (`crate::codec`) serializes and deserializes; it is a
/// plain data snapshot, distinct from the mutable [`crate::item_state::NodeState`]
/// it is built from / materialized into.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeBundle {
    pub primary_type: Name,
    pub parent_id: Option<NodeId>,
    pub mixin_types: Vec<Name>,
    pub properties: Vec<BundlePropertyEntry>,
    pub referenceable: bool,
    pub child_entries: Vec<BundleChildEntry>,
    pub mod_count: u32,
    pub shared_set: Vec<NodeId>,
    /// Measured size of the last encoded form of this bundle, in bytes.
    /// Recomputed on every encode; not meaningful before the first encode.
    pub size: u64,
}

impl NodeBundle {
    pub fn new(primary_type: Name, parent_id: Option<NodeId>) -> Self {
        NodeBundle {
            primary_type,
            parent_id,
            mixin_types: Vec::new(),
            properties: Vec::new(),
            referenceable: false,
            child_entries: Vec::new(),
            mod_count: 0,
            shared_set: Vec::new(),
            size: 0,
        }
    }
}
