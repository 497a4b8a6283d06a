//! Small type-safe wrappers shared across the crate.
//!
//! [`NodeId`] indexes the constraint tree arena, [`Sort`] names the theory
//! a symbolic expression lives in.
use std::fmt;

/// Index of a node in the [`ConstraintTree`][crate::tree::ConstraintTree] arena.
///
/// # Invariants
///
/// - Id `0` is always the root ("no predicate yet")
/// - Ids are assigned in creation order and never reused
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(u32);

impl NodeId {
    /// The root of every constraint tree.
    pub const ROOT: NodeId = NodeId(0);

    pub const fn new(id: u32) -> Self {
        NodeId(id)
    }

    /// Returns the raw id as a `u32`.
    pub const fn id(self) -> u32 {
        self.0
    }

    /// Returns the arena index of this node.
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub const fn is_root(self) -> bool {
        self.0 == 0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        NodeId::ROOT
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<NodeId> for u32 {
    fn from(node: NodeId) -> Self {
        node.0
    }
}

/// Theory of a symbolic value.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Sort {
    Int,
    Bool,
    Str,
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sort::Int => write!(f, "int"),
            Sort::Bool => write!(f, "bool"),
            Sort::Str => write!(f, "str"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    #[test]
    fn test_node_id_root() {
        assert!(NodeId::ROOT.is_root());
        assert!(!NodeId::new(3).is_root());
        assert_eq!(NodeId::new(3).index(), 3);
        assert!(NodeId::new(1) < NodeId::new(2));
    }

    #[test]
    fn test_display() {
        assert_eq!(NodeId::new(7).to_string(), "#7");
        assert_eq!(Sort::Str.to_string(), "str");
    }
}
