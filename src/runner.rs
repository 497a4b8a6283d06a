//! Target runners: running the explored function once on concrete inputs.
//!
//! A [`TargetRunner`] receives the [`Arguments`] of one run and a
//! [`RunContext`] through which it reports symbolic branches. Faults end the
//! run with a [`Fault`] tagged by the location in the target that raised it;
//! panics are caught and tagged with the panic location.
//!
//! ```
//! use concolic_rs::runner::FnTarget;
//!
//! let target = FnTarget::new("f", ["x"], |args, ctx| {
//!     if ctx.branch(&args["x"].gt(10)) {
//!         Ok("big".into())
//!     } else {
//!         Ok("small".into())
//!     }
//! });
//! let invocation = target.invocation().build().unwrap();
//! assert_eq!(invocation.name(), "f");
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe, Location};
use std::sync::Once;

use crate::binding::{Arguments, Invocation, InvocationBuilder};
use crate::sym::Sym;
use crate::tracker::PathTracker;
use crate::types::NodeId;
use crate::value::Value;

/// A failure raised by the target, tagged with where it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    /// `file:line` inside the target.
    pub location: String,
    pub message: String,
}

impl Fault {
    pub fn new(location: impl Into<String>, message: impl Into<String>) -> Self {
        Fault {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Fault at the caller's location.
    #[track_caller]
    pub fn here(message: impl Into<String>) -> Self {
        let loc = Location::caller();
        Fault::new(format!("{}:{}", loc.file(), loc.line()), message)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

/// Result of one concrete run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Normal(Value),
    Failure(Fault),
}

impl RunOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, RunOutcome::Failure(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            RunOutcome::Normal(v) => Some(v),
            RunOutcome::Failure(_) => None,
        }
    }

    pub fn fault(&self) -> Option<&Fault> {
        match self {
            RunOutcome::Normal(_) => None,
            RunOutcome::Failure(f) => Some(f),
        }
    }
}

impl From<Result<Value, Fault>> for RunOutcome {
    fn from(r: Result<Value, Fault>) -> Self {
        match r {
            Ok(v) => RunOutcome::Normal(v),
            Err(f) => RunOutcome::Failure(f),
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Normal(v) => write!(f, "{}", v),
            RunOutcome::Failure(fault) => write!(f, "failure at {}", fault),
        }
    }
}

/// Branch recording for one run.
pub struct RunContext<'a> {
    tracker: &'a mut PathTracker,
    branches: usize,
}

impl<'a> RunContext<'a> {
    pub fn new(tracker: &'a mut PathTracker) -> Self {
        RunContext { tracker, branches: 0 }
    }

    /// Decides a branch on `cond`, recording it if `cond` is symbolic.
    ///
    /// The branch is labeled with the caller's `file:line`.
    #[track_caller]
    pub fn branch(&mut self, cond: &Sym) -> bool {
        let loc = Location::caller();
        self.branch_at(cond, format!("{}:{}", loc.file(), loc.line()))
    }

    /// Like [`branch`][Self::branch], with an explicit label.
    pub fn branch_at(&mut self, cond: &Sym, label: impl Into<String>) -> bool {
        let cond = cond.truthy();
        let outcome = cond.value().truthy();
        if let Some(expr) = cond.expr() {
            self.tracker.record_predicate(expr.clone(), outcome, Some(label.into()));
            self.branches += 1;
        }
        outcome
    }

    /// Number of symbolic branches recorded so far.
    pub fn branches(&self) -> usize {
        self.branches
    }

    /// The node of the last recorded branch.
    pub fn position(&self) -> NodeId {
        self.tracker.current()
    }
}

/// The function under exploration.
pub trait TargetRunner {
    fn name(&self) -> &str;

    /// Runs the target once, reporting symbolic branches through `ctx`.
    fn run(&self, args: &Arguments, ctx: &mut RunContext<'_>) -> RunOutcome;
}

thread_local! {
    static CAPTURING: Cell<bool> = const { Cell::new(false) };
    static LAST_PANIC: RefCell<Option<Fault>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

fn install_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if !CAPTURING.with(Cell::get) {
                previous(info);
                return;
            }
            let location = info
                .location()
                .map(|l| format!("{}:{}", l.file(), l.line()))
                .unwrap_or_else(|| "<unknown>".to_string());
            let payload = info.payload();
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "panic".to_string()
            };
            LAST_PANIC.with(|p| *p.borrow_mut() = Some(Fault { location, message }));
        }));
    });
}

/// Runs `f`, turning a panic into a [`RunOutcome::Failure`] at the panic location.
///
/// Panics raised on this thread while `f` runs are not printed.
pub fn capture_panics(f: impl FnOnce() -> RunOutcome) -> RunOutcome {
    install_hook();
    let was_capturing = CAPTURING.with(|c| c.replace(true));
    LAST_PANIC.with(|p| p.borrow_mut().take());
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    CAPTURING.with(|c| c.set(was_capturing));
    match result {
        Ok(outcome) => outcome,
        Err(_) => {
            let fault = LAST_PANIC
                .with(|p| p.borrow_mut().take())
                .unwrap_or_else(|| Fault::new("<unknown>", "panic"));
            RunOutcome::Failure(fault)
        }
    }
}

/// Target backed by a Rust closure.
pub struct FnTarget<F> {
    name: String,
    params: Vec<String>,
    f: F,
}

impl<F> FnTarget<F>
where
    F: Fn(&Arguments, &mut RunContext<'_>) -> Result<Value, Fault>,
{
    pub fn new<S: Into<String>>(name: impl Into<String>, params: impl IntoIterator<Item = S>, f: F) -> Self {
        FnTarget {
            name: name.into(),
            params: params.into_iter().map(Into::into).collect(),
            f,
        }
    }

    /// Starts binding this target's parameters.
    pub fn invocation(&self) -> InvocationBuilder {
        Invocation::builder(self.name.clone(), self.params.iter().cloned())
    }
}

impl<F> TargetRunner for FnTarget<F>
where
    F: Fn(&Arguments, &mut RunContext<'_>) -> Result<Value, Fault>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, args: &Arguments, ctx: &mut RunContext<'_>) -> RunOutcome {
        capture_panics(|| (self.f)(args, ctx).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::binding::Inputs;

    use test_log::test;

    #[test]
    fn test_branch_records_only_symbolic_conditions() {
        let mut tracker = PathTracker::new();
        tracker.reset(None);
        let x = Sym::symbolic("x", Value::from(3)).unwrap();
        let mut ctx = RunContext::new(&mut tracker);
        assert!(!ctx.branch(&x.gt(10)));
        assert!(ctx.branch(&Sym::concrete(true)));
        assert!(ctx.branch(&x));
        assert_eq!(ctx.branches(), 2);
        assert_eq!(tracker.take_new_constraints().len(), 2);
    }

    #[test]
    fn test_branch_label_is_caller_location() {
        let mut tracker = PathTracker::new();
        tracker.reset(None);
        let x = Sym::symbolic("x", Value::from(3)).unwrap();
        let mut ctx = RunContext::new(&mut tracker);
        let line = line!() + 1;
        ctx.branch(&x.lt(0));
        let node = ctx.position();
        let label = tracker.find_constraint(node).unwrap().branch_label().unwrap().to_string();
        assert_eq!(label, format!("{}:{}", file!(), line));
    }

    #[test]
    fn test_fn_target_captures_panic_location() {
        let line = line!() + 2;
        let target = FnTarget::new("f", ["x"], |args, _ctx| {
            let y = &args["x"] / 0;
            Ok(y.into_value())
        });
        let inv = target.invocation().build().unwrap();
        let mut tracker = PathTracker::new();
        let mut ctx = RunContext::new(&mut tracker);
        let outcome = target.run(&inv.arguments(&Inputs::new()), &mut ctx);
        let fault = outcome.fault().unwrap();
        assert_eq!(fault.location, format!("{}:{}", file!(), line));
        assert_eq!(fault.message, "division by zero");
    }

    #[test]
    fn test_fault_here() {
        let line = line!() + 1;
        let fault = Fault::here("bad");
        assert_eq!(fault.to_string(), format!("{}:{}: bad", file!(), line));
    }

    #[test]
    fn test_normal_outcome() {
        let outcome = capture_panics(|| RunOutcome::Normal(Value::from(1)));
        assert_eq!(outcome.value(), Some(&Value::from(1)));
        assert!(!outcome.is_failure());
    }
}
