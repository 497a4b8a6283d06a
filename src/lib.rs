//! # concolic-rs: Concolic exploration of program paths
//!
//! **`concolic-rs`** runs a function on concrete inputs while tracking, for every
//! branch that depends on a symbolic input, the predicate that decided it.
//! Negating those predicates one at a time and asking a solver for a model yields
//! new inputs that drive the function down paths it has not taken yet.
//!
//! ## How it works
//!
//! - Every run records its branch predicates into a [`ConstraintTree`][crate::tree::ConstraintTree]
//!   through the [`PathTracker`][crate::tracker::PathTracker]. New nodes become pending constraints.
//! - The [`ExplorationEngine`][crate::engine::ExplorationEngine] schedules solver attempts on a
//!   bounded pool of preemptible workers, ordered by timeout and arrival.
//! - A failed attempt is retried with the next timeout of the [`TimeoutLadder`][crate::config::TimeoutLadder];
//!   after the last one the opposite branch is archived.
//! - A model re-runs the function with new inputs, which extends the tree.
//!
//! ## Basic Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use concolic_rs::config::ExplorationConfig;
//! use concolic_rs::engine::ExplorationEngine;
//! use concolic_rs::runner::FnTarget;
//! use concolic_rs::solver::search::SearchSolver;
//!
//! let target = FnTarget::new("classify", ["x"], |args, ctx| {
//!     if ctx.branch(&args["x"].gt(10)) {
//!         Ok("big".into())
//!     } else {
//!         Ok("small".into())
//!     }
//! });
//! let invocation = target.invocation().build().unwrap();
//!
//! let engine = ExplorationEngine::new(invocation, target, Arc::new(SearchSolver::new()), ExplorationConfig::default()).unwrap();
//! let result = engine.explore();
//!
//! assert_eq!(result.generated_inputs.len(), 2);
//! assert_eq!(result.tree.len(), 3);
//! ```
//!
//! ## Core Components
//!
//! - **[`engine`]**: the scheduler loop and session results.
//! - **[`tracker`]** and **[`tree`]**: path recording and the constraint tree.
//! - **[`solver`]**: the [`SolverAdapter`][crate::solver::SolverAdapter] contract, an in-process
//!   search solver and an SMT-LIB2 process solver.
//! - **[`runner`]**: the [`TargetRunner`][crate::runner::TargetRunner] contract and native targets.
//! - **[`script`]**: targets written as small script modules.
//! - **[`dot`]**: Graphviz export of the constraint tree.

pub mod binding;
pub mod config;
pub mod dot;
pub mod engine;
pub mod expr;
pub mod pool;
pub mod predicate;
pub mod queue;
pub mod runner;
pub mod script;
pub mod solver;
pub mod sym;
pub mod tracker;
pub mod tree;
pub mod types;
pub mod value;
