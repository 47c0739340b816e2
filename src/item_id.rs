//! The tagged union identifying either a node or a property, used as the
//! value type of the hierarchy cache's `byPath` map (spec §4.6) and as the
//! argument/result type of the `ItemStateManager` collaborator (spec §6).

use std::fmt;

use crate::node_id::{NodeId, PropertyId};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemId {
    Node(NodeId),
    Property(PropertyId),
}

impl ItemId {
    pub fn as_node_id(&self) -> Option<NodeId> {
        match self {
            ItemId::Node(id) => Some(*id),
            ItemId::Property(_) => None,
        }
    }

    pub fn as_property_id(&self) -> Option<&PropertyId> {
        match self {
            ItemId::Node(_) => None,
            ItemId::Property(id) => Some(id),
        }
    }

    pub fn is_node(&self) -> bool {
        matches!(self, ItemId::Node(_))
    }
}

impl From<NodeId> for ItemId {
    fn from(value: NodeId) -> Self {
        ItemId::Node(value)
    }
}

impl From<PropertyId> for ItemId {
    fn from(value: PropertyId) -> Self {
        ItemId::Property(value)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Node(id) => write!(f, "{}", id),
            ItemId::Property(id) => write!(f, "{}", id),
        }
    }
}
