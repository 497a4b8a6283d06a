//! Solver interface used by the exploration workers.
//!
//! A [`SolverAdapter`] answers one [`SolverQuery`]: is there an assignment to
//! the symbolic inputs under which every predicate on the path to a node
//! holds and the node's own branch goes the other way? Adapters run on
//! worker threads and must return promptly once the [`CancelToken`] fires
//! or the query's time budget is spent. Any internal failure is reported as
//! [`SolveResult::Unknown`].
//!
//! Two adapters are provided:
//!
//! - [`SearchSolver`][search::SearchSolver]: in-process interval propagation
//!   and bounded candidate search
//! - [`ProcessSolver`][process::ProcessSolver]: an external SMT solver
//!   (`z3`, `cvc5`) driven over SMT-LIB2 in a child process

pub mod interval;
pub mod process;
pub mod search;
pub mod smtlib;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::binding::Inputs;
use crate::expr::{Bindings, SymExpr};
use crate::predicate::Predicate;
use crate::types::{NodeId, Sort};
use crate::value::Value;

/// Variable assignment returned with a SAT answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Model {
    values: BTreeMap<String, Value>,
}

impl Model {
    pub fn new(values: BTreeMap<String, Value>) -> Self {
        Model { values }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl Bindings for Model {
    fn value_of(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} = {}", name, value)?;
        }
        write!(f, "}}")
    }
}

/// Result of one solver attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveResult {
    Sat(Model),
    Unsat,
    /// No answer within the budget, cancelled, or the backend failed.
    Unknown(String),
}

impl SolveResult {
    pub fn is_sat(&self) -> bool {
        matches!(self, SolveResult::Sat(_))
    }

    pub fn model(&self) -> Option<&Model> {
        match self {
            SolveResult::Sat(m) => Some(m),
            _ => None,
        }
    }
}

impl fmt::Display for SolveResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveResult::Sat(_) => write!(f, "sat"),
            SolveResult::Unsat => write!(f, "unsat"),
            SolveResult::Unknown(reason) => write!(f, "unknown ({})", reason),
        }
    }
}

/// One attempt at flipping a branch.
#[derive(Debug, Clone)]
pub struct SolverQuery {
    /// Node whose branch is being flipped.
    pub constraint: NodeId,
    /// Predicates on the path from the root to the node's parent.
    pub asserts: Vec<Predicate>,
    /// The node's predicate with its outcome negated.
    pub goal: Predicate,
    pub timeout: Duration,
    /// Inputs of the run that created the node.
    pub hint: Option<Inputs>,
}

impl SolverQuery {
    /// All formulas that must hold, path first and goal last.
    pub fn assertions(&self) -> Vec<SymExpr> {
        self.asserts.iter().chain(std::iter::once(&self.goal)).map(Predicate::assertion).collect()
    }

    pub fn variables(&self) -> BTreeMap<String, Sort> {
        let mut vars = BTreeMap::new();
        for p in self.asserts.iter().chain(std::iter::once(&self.goal)) {
            p.expr().collect_variables(&mut vars);
        }
        vars
    }

    /// Whether every assertion evaluates to `true` under `env`.
    pub fn is_satisfied_by(&self, env: &impl Bindings) -> bool {
        self.assertions()
            .iter()
            .all(|a| matches!(a.eval(env), Ok(Value::Bool(true))))
    }

    pub fn deadline_from(&self, start: Instant) -> Instant {
        start + self.timeout
    }
}

/// Cooperative cancellation flag shared between the scheduler and a worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Backend that decides solver queries.
pub trait SolverAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Decides `query`, giving up with `Unknown` when `cancel` fires or the
    /// query's timeout elapses.
    ///
    /// The worker pool cannot stop a thread. An attempt still running past its
    /// timeout plus the configured grace is reported as `Unknown` and its
    /// thread is left to finish on its own; it is not joined at shutdown
    /// either. Adapters that need a hard stop do the work in a child process
    /// and kill it, as [`ProcessSolver`][process::ProcessSolver] does.
    fn solve(&self, query: &SolverQuery, cancel: &CancelToken) -> SolveResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::expr::CompareOp;

    use test_log::test;

    #[test]
    fn test_query_assertions() {
        let x = SymExpr::var("x", Sort::Int);
        let s = SymExpr::var("s", Sort::Str);
        let query = SolverQuery {
            constraint: NodeId::new(2),
            asserts: vec![Predicate::new(SymExpr::compare(CompareOp::Gt, x.clone(), SymExpr::int(0)), true)],
            goal: Predicate::new(SymExpr::compare(CompareOp::Eq, s, SymExpr::Str("a".into())), false).negated(),
            timeout: Duration::from_millis(10),
            hint: None,
        };
        assert_eq!(query.assertions().len(), 2);
        assert_eq!(query.variables().len(), 2);

        let mut model = Model::default();
        model.insert("x", Value::from(1));
        model.insert("s", Value::from("a"));
        assert!(query.is_satisfied_by(&model));
        model.insert("x", Value::from(0));
        assert!(!query.is_satisfied_by(&model));
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
