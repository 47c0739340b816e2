use std::fmt;

use crate::name::Name;

/// A 128-bit opaque node identifier, represented as two 64-bit halves
/// (most-significant, least-significant). Equality is bitwise equality;
/// `Ord` is lexicographic over (msb, lsb), used only to give deterministic
/// iteration order in maps/sets - it has no bearing on the JCR data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    msb: u64,
    lsb: u64,
}

impl NodeId {
    pub const fn new(msb: u64, lsb: u64) -> Self {
        NodeId { msb, lsb }
    }

    pub const fn msb(&self) -> u64 {
        self.msb
    }

    pub const fn lsb(&self) -> u64 {
        self.lsb
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        let msb = u64::from_be_bytes(bytes[0..8].try_into().unwrap());
        let lsb = u64::from_be_bytes(bytes[8..16].try_into().unwrap());
        NodeId::new(msb, lsb)
    }

    pub fn to_bytes(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..8].copy_from_slice(&self.msb.to_be_bytes());
        out[8..16].copy_from_slice(&self.lsb.to_be_bytes());
        out
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}-{:016x}", self.msb, self.lsb)
    }
}

/// Identifies a property: the id of its owning node plus the property's
/// local `Name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PropertyId {
    parent_id: NodeId,
    name: Name,
}

impl PropertyId {
    pub fn new(parent_id: NodeId, name: Name) -> Self {
        PropertyId { parent_id, name }
    }

    pub fn parent_id(&self) -> NodeId {
        self.parent_id
    }

    pub fn name(&self) -> &Name {
        &self.name
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.parent_id, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn round_trips_through_bytes() {
        let id = NodeId::new(0x0102_0304_0506_0708, 0x090a_0b0c_0d0e_0f10);
        assert_eq!(NodeId::from_bytes(id.to_bytes()), id);
    }

    #[test]
    fn from_bytes_matches_a_known_wire_encoding() {
        let bytes = hex!("000000000000002a00000000000000ff");
        let id = NodeId::from_bytes(bytes);
        assert_eq!(id, NodeId::new(42, 255));
        assert_eq!(id.to_bytes(), bytes);
    }

    #[test]
    fn equality_is_bitwise() {
        assert_eq!(NodeId::new(1, 2), NodeId::new(1, 2));
        assert_ne!(NodeId::new(1, 2), NodeId::new(1, 3));
        assert_ne!(NodeId::new(1, 2), NodeId::new(2, 2));
    }
}
