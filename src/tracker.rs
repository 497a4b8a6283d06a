//! Path tracking during a concrete run.
//!
//! The [`PathTracker`] owns the [`ConstraintTree`] and is the only code that
//! links nodes. Each run starts with [`reset`][PathTracker::reset] and then
//! reports every symbolic branch through
//! [`record_predicate`][PathTracker::record_predicate]: existing nodes are
//! replayed, unseen branches become new nodes and are queued as new
//! constraints for the scheduler to pick up.

use log::{debug, warn};

use crate::expr::SymExpr;
use crate::predicate::Predicate;
use crate::tree::{ConstraintNode, ConstraintTree};
use crate::types::NodeId;

#[derive(Debug, Default)]
pub struct PathTracker {
    tree: ConstraintTree,
    current: NodeId,
    /// Branch decisions the current run is expected to repeat.
    expected: Vec<Predicate>,
    position: usize,
    diverged: bool,
    divergences: usize,
    fresh: Vec<NodeId>,
    revived: Vec<NodeId>,
}

impl PathTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepares for a new run.
    ///
    /// With `Some(target)`, the run is expected to follow the path to the
    /// parent of `target` and then take the opposite outcome at `target`.
    /// With `None` there are no expectations.
    pub fn reset(&mut self, target: Option<NodeId>) {
        self.current = NodeId::ROOT;
        self.position = 0;
        self.diverged = false;
        self.expected = match target.and_then(|t| self.tree.query_for(t)) {
            Some((mut asserts, goal)) => {
                asserts.push(goal);
                asserts
            }
            None => Vec::new(),
        };
    }

    /// Records a symbolic branch condition and the outcome the run took.
    ///
    /// Returns the node for this branch, creating it if this is the first
    /// time the branch is taken from the current position.
    pub fn record_predicate(&mut self, expr: SymExpr, outcome: bool, label: Option<String>) -> NodeId {
        let predicate = Predicate::new(expr, outcome);
        self.check_expected(&predicate, label.as_deref());
        self.position += 1;

        if let Some(existing) = self.tree.child(self.current, outcome) {
            if self.tree[existing].is_archived() {
                self.revived.push(existing);
            }
            self.current = existing;
            return existing;
        }

        let id = self.tree.insert_child(self.current, predicate, label);
        if let Some(sibling) = self.tree.sibling(id) {
            // Both outcomes of this branch are now covered.
            for n in [id, sibling] {
                if let Some(node) = self.tree.get_mut(n) {
                    node.processed = true;
                }
            }
        }
        debug!("new constraint {} at depth {}", id, self.tree[id].depth());
        self.fresh.push(id);
        self.current = id;
        id
    }

    fn check_expected(&mut self, predicate: &Predicate, label: Option<&str>) {
        if self.diverged {
            return;
        }
        if let Some(expected) = self.expected.get(self.position) {
            if expected != predicate {
                self.diverged = true;
                self.divergences += 1;
                warn!(
                    "path divergence at depth {} ({}): expected {}, got {}",
                    self.position + 1,
                    label.unwrap_or("?"),
                    expected,
                    predicate
                );
            }
        }
    }

    /// Whether the current run has left the expected path.
    pub fn diverged(&self) -> bool {
        self.diverged
    }

    pub fn divergences(&self) -> usize {
        self.divergences
    }

    /// The node reached by the last recorded branch.
    pub fn current(&self) -> NodeId {
        self.current
    }

    pub fn find_constraint(&self, id: NodeId) -> Option<&ConstraintNode> {
        self.tree.get(id)
    }

    /// Nodes created since the last call, in creation order.
    pub fn take_new_constraints(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.fresh)
    }

    /// Archived nodes reached since the last call.
    pub fn take_revived(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.revived)
    }

    pub fn tree(&self) -> &ConstraintTree {
        &self.tree
    }

    pub(crate) fn tree_mut(&mut self) -> &mut ConstraintTree {
        &mut self.tree
    }

    pub fn into_tree(self) -> ConstraintTree {
        self.tree
    }
}
