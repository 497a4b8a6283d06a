//! Branch predicates: a symbolic condition and the outcome a run observed.

use std::fmt;

use crate::expr::SymExpr;

/// A branch condition together with the direction the run took.
///
/// Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Predicate {
    expr: SymExpr,
    outcome: bool,
}

impl Predicate {
    pub fn new(expr: SymExpr, outcome: bool) -> Self {
        Predicate { expr, outcome }
    }

    pub fn expr(&self) -> &SymExpr {
        &self.expr
    }

    pub fn outcome(&self) -> bool {
        self.outcome
    }

    /// The same condition with the opposite outcome.
    pub fn negated(&self) -> Self {
        Predicate {
            expr: self.expr.clone(),
            outcome: !self.outcome,
        }
    }

    /// Boolean formula asserting that the condition evaluates to the outcome.
    pub fn assertion(&self) -> SymExpr {
        if self.outcome {
            self.expr.clone()
        } else {
            self.expr.clone().not()
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.outcome {
            write!(f, "{}", self.expr)
        } else {
            write!(f, "!{}", self.expr)
        }
    }
}
