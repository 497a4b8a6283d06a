//! The constraint tree: branch history accumulated across concrete runs.
//!
//! Nodes live in an arena indexed by [`NodeId`]; parent links are indices, so
//! lookups by id are O(1) and the tree has no reference cycles. The root
//! (id 0) carries no predicate. Every other node holds the predicate of one
//! branch, and a path from the root spells out the branch decisions of a run.
//!
//! # Invariants
//!
//! - A node has at most one child per outcome
//! - Nodes are never removed; giving up on a branch leaves an archived node
//!   whose `inputs` are `None`

use std::fmt;
use std::ops::Index;

use crate::binding::Inputs;
use crate::predicate::Predicate;
use crate::types::NodeId;

/// Why a branch was given up after the last rung of the timeout ladder.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum GiveUpReason {
    /// The solver proved the branch infeasible.
    Unsatisfiable,
    /// The solver never answered within the ladder.
    Undecided,
}

impl fmt::Display for GiveUpReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GiveUpReason::Unsatisfiable => write!(f, "unsat"),
            GiveUpReason::Undecided => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConstraintNode {
    pub(crate) id: NodeId,
    pub(crate) predicate: Option<Predicate>,
    pub(crate) parent: Option<NodeId>,
    /// Children indexed by outcome: `[false, true]`.
    pub(crate) children: [Option<NodeId>; 2],
    pub(crate) depth: usize,
    pub(crate) processed: bool,
    pub(crate) inputs: Option<Inputs>,
    pub(crate) branch_label: Option<String>,
    pub(crate) archived: Option<GiveUpReason>,
}

impl ConstraintNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Branch predicate; `None` only for the root.
    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn child(&self, outcome: bool) -> Option<NodeId> {
        self.children[outcome as usize]
    }

    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children.iter().flatten().copied()
    }

    /// Number of predicates on the path from the root.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_processed(&self) -> bool {
        self.processed
    }

    /// Inputs of the run that reached this node.
    pub fn inputs(&self) -> Option<&Inputs> {
        self.inputs.as_ref()
    }

    pub fn branch_label(&self) -> Option<&str> {
        self.branch_label.as_deref()
    }

    pub fn archived(&self) -> Option<GiveUpReason> {
        self.archived
    }

    pub fn is_archived(&self) -> bool {
        self.archived.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct ConstraintTree {
    nodes: Vec<ConstraintNode>,
}

impl Default for ConstraintTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstraintTree {
    pub fn new() -> Self {
        let root = ConstraintNode {
            id: NodeId::ROOT,
            predicate: None,
            parent: None,
            children: [None, None],
            depth: 0,
            processed: true,
            inputs: None,
            branch_label: None,
            archived: None,
        };
        ConstraintTree { nodes: vec![root] }
    }

    pub fn root(&self) -> &ConstraintNode {
        &self.nodes[0]
    }

    pub fn get(&self, id: NodeId) -> Option<&ConstraintNode> {
        self.nodes.get(id.index())
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut ConstraintNode> {
        self.nodes.get_mut(id.index())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConstraintNode> {
        self.nodes.iter()
    }

    pub fn child(&self, id: NodeId, outcome: bool) -> Option<NodeId> {
        self.get(id)?.child(outcome)
    }

    /// The node for the opposite outcome of the same branch.
    pub fn sibling(&self, id: NodeId) -> Option<NodeId> {
        let node = self.get(id)?;
        let outcome = node.predicate.as_ref()?.outcome();
        self.child(node.parent?, !outcome)
    }

    /// Appends a child for `predicate.outcome()` under `parent`.
    ///
    /// Panics if the slot is taken or `parent` does not exist.
    pub(crate) fn insert_child(&mut self, parent: NodeId, predicate: Predicate, label: Option<String>) -> NodeId {
        let outcome = predicate.outcome();
        let depth = self[parent].depth + 1;
        assert!(self[parent].child(outcome).is_none(), "{} already has a {} child", parent, outcome);

        let id = NodeId::new(self.nodes.len() as u32);
        self.nodes.push(ConstraintNode {
            id,
            predicate: Some(predicate),
            parent: Some(parent),
            children: [None, None],
            depth,
            processed: false,
            inputs: None,
            branch_label: label,
            archived: None,
        });
        self.nodes[parent.index()].children[outcome as usize] = Some(id);
        id
    }

    /// Nodes from the first branch below the root down to `id`, inclusive.
    pub fn path_to(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut current = Some(id);
        while let Some(n) = current {
            if n.is_root() {
                break;
            }
            path.push(n);
            current = self.get(n).and_then(|node| node.parent);
        }
        path.reverse();
        path
    }

    /// Predicates along [`path_to`][Self::path_to].
    pub fn predicates_to(&self, id: NodeId) -> Vec<Predicate> {
        self.path_to(id)
            .into_iter()
            .filter_map(|n| self.get(n).and_then(|node| node.predicate.clone()))
            .collect()
    }

    /// Solver query for flipping the branch at `id`.
    ///
    /// Returns the predicates from the root to the parent of `id`, and the
    /// predicate of `id` with its outcome negated.
    pub fn query_for(&self, id: NodeId) -> Option<(Vec<Predicate>, Predicate)> {
        let node = self.get(id)?;
        let goal = node.predicate.as_ref()?.negated();
        let asserts = match node.parent {
            Some(parent) => self.predicates_to(parent),
            None => Vec::new(),
        };
        Some((asserts, goal))
    }

    /// Records that the opposite branch of `id` could not be reached.
    ///
    /// Creates the sibling node if needed, with no inputs. A sibling that was
    /// already reached by some run is left untouched.
    pub(crate) fn archive_sibling(&mut self, id: NodeId, reason: GiveUpReason) -> Option<NodeId> {
        let node = self.get(id)?;
        let parent = node.parent?;
        let negated = node.predicate.as_ref()?.negated();
        let label = node.branch_label.clone();

        let sibling = match self.child(parent, negated.outcome()) {
            Some(s) => {
                if self[s].inputs.is_some() {
                    return Some(s);
                }
                s
            }
            None => self.insert_child(parent, negated, label),
        };
        let s = &mut self.nodes[sibling.index()];
        s.processed = true;
        s.inputs = None;
        s.archived = Some(reason);
        Some(sibling)
    }

    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats {
            nodes: self.nodes.len(),
            ..TreeStats::default()
        };
        for node in &self.nodes {
            stats.max_depth = stats.max_depth.max(node.depth);
            if node.archived.is_some() {
                stats.archived += 1;
            } else if node.inputs.is_some() {
                stats.reached += 1;
            }
        }
        stats
    }
}

impl Index<NodeId> for ConstraintTree {
    type Output = ConstraintNode;

    fn index(&self, id: NodeId) -> &ConstraintNode {
        &self.nodes[id.index()]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeStats {
    /// All nodes, root included.
    pub nodes: usize,
    /// Nodes reached by a concrete run.
    pub reached: usize,
    pub archived: usize,
    pub max_depth: usize,
}
