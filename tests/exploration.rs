//! End-to-end exploration sessions over native targets.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use concolic_rs::binding::Arguments;
use concolic_rs::config::{ExplorationConfig, TimeoutLadder};
use concolic_rs::engine::{ExplorationEngine, ExplorationResult};
use concolic_rs::runner::{Fault, FnTarget, RunContext, RunOutcome};
use concolic_rs::solver::search::SearchSolver;
use concolic_rs::solver::{CancelToken, Model, SolveResult, SolverAdapter, SolverQuery};
use concolic_rs::tree::GiveUpReason;
use concolic_rs::types::NodeId;
use concolic_rs::value::Value;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn config(ladder: &[u64]) -> ExplorationConfig {
    ExplorationConfig::default()
        .with_ladder(TimeoutLadder::from_millis(ladder).unwrap())
        .with_poll_interval(ms(1))
}

fn outcomes(result: &ExplorationResult) -> Vec<String> {
    result.return_values.iter().map(|o| o.to_string()).collect()
}

/// Records every attempt and answers with `answer(query)`.
struct Scripted<F> {
    answer: F,
    log: Mutex<Vec<(NodeId, Duration)>>,
    /// Attempts currently inside `solve`, per constraint.
    active: Mutex<HashMap<NodeId, usize>>,
    max_active: AtomicUsize,
    live: AtomicUsize,
}

impl<F> Scripted<F>
where
    F: Fn(&SolverQuery, &CancelToken) -> SolveResult + Send + Sync,
{
    fn new(answer: F) -> Arc<Self> {
        Arc::new(Scripted {
            answer,
            log: Mutex::new(Vec::new()),
            active: Mutex::new(HashMap::new()),
            max_active: AtomicUsize::new(0),
            live: AtomicUsize::new(0),
        })
    }

    fn attempts(&self) -> Vec<(NodeId, Duration)> {
        self.log.lock().unwrap().clone()
    }
}

impl<F> SolverAdapter for Scripted<F>
where
    F: Fn(&SolverQuery, &CancelToken) -> SolveResult + Send + Sync,
{
    fn name(&self) -> &str {
        "scripted"
    }

    fn solve(&self, query: &SolverQuery, cancel: &CancelToken) -> SolveResult {
        self.live.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push((query.constraint, query.timeout));
        {
            let mut active = self.active.lock().unwrap();
            let n = active.entry(query.constraint).or_insert(0);
            *n += 1;
            self.max_active.fetch_max(*n, Ordering::SeqCst);
        }
        let _leave = Leave {
            active: &self.active,
            live: &self.live,
            constraint: query.constraint,
        };
        (self.answer)(query, cancel)
    }
}

/// Undoes the bookkeeping of one attempt, even when the answer panics.
struct Leave<'a> {
    active: &'a Mutex<HashMap<NodeId, usize>>,
    live: &'a AtomicUsize,
    constraint: NodeId,
}

impl Drop for Leave<'_> {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.lock() {
            *active.entry(self.constraint).or_insert(1) -= 1;
        }
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Blocks until `cancel` fires, giving up after `limit`.
fn until_cancelled(cancel: &CancelToken, limit: Duration) -> SolveResult {
    let start = Instant::now();
    while !cancel.is_cancelled() && start.elapsed() < limit {
        thread::sleep(ms(1));
    }
    SolveResult::Unknown("cancelled".to_string())
}

/// Panic payload that panics again when dropped, so the worker thread dies
/// after its solver call returned control.
struct Poison;

impl Drop for Poison {
    fn drop(&mut self) {
        panic!("poisoned payload");
    }
}

// ─── Scenarios ─────────────────────────────────────────────────────────────────

#[test]
fn single_branch_takes_two_runs() {
    let target = FnTarget::new("f", ["x"], |args, ctx| {
        if ctx.branch(&args["x"].gt(10)) {
            Ok(Value::from("big"))
        } else {
            Ok(Value::from("small"))
        }
    });
    let invocation = target.invocation().build().unwrap();
    let engine = ExplorationEngine::new(invocation, target, Arc::new(SearchSolver::new()), config(&[1000])).unwrap();
    let result = engine.explore();

    assert_eq!(result.generated_inputs.len(), 2);
    assert_eq!(result.generated_inputs[0].get("x"), Some(&Value::from(0)));
    let x = result.generated_inputs[1].get("x").and_then(Value::as_int).unwrap().clone();
    assert!(x > 10.into());
    assert_eq!(outcomes(&result), vec!["\"small\"", "\"big\""]);
    assert_eq!(result.tree.len(), 3);
    assert_eq!(result.tree.stats().archived, 0);
    assert_eq!(result.stats.processed_constraints, 1);
}

#[test]
fn unsat_on_every_rung_archives_sibling() {
    let solver = Scripted::new(|_, _| SolveResult::Unsat);
    let target = FnTarget::new("f", ["x"], |args, ctx| Ok(Value::from(ctx.branch(&args["x"].gt(10)))));
    let invocation = target.invocation().build().unwrap();
    let engine = ExplorationEngine::new(invocation, target, solver.clone(), config(&[10, 20, 40])).unwrap();
    let result = engine.explore();

    assert_eq!(result.generated_inputs.len(), 1);
    assert_eq!(result.tree.len(), 3);

    let node = NodeId::new(1);
    let sibling = result.tree.sibling(node).unwrap();
    let archived = &result.tree[sibling];
    assert_eq!(archived.inputs(), None);
    assert_eq!(archived.archived(), Some(GiveUpReason::Unsatisfiable));
    assert!(archived.is_processed());
    assert!(archived.predicate().unwrap().outcome());

    let expected = vec![(node, ms(10)), (node, ms(20)), (node, ms(40))];
    assert_eq!(solver.attempts(), expected);
    assert_eq!(result.stats.attempts, expected);
    assert_eq!(result.stats.archived, 1);
}

#[test]
fn fault_in_second_run_is_tagged_and_exploration_continues() {
    let fault_line = line!() + 3;
    let target = FnTarget::new("f", ["x"], |args, ctx| {
        if ctx.branch(&args["x"].gt(10)) {
            return Err(Fault::here("too big"));
        }
        if ctx.branch(&args["x"].lt(-5)) {
            return Ok(Value::from("negative"));
        }
        Ok(Value::from("small"))
    });
    let invocation = target.invocation().build().unwrap();
    let engine = ExplorationEngine::new(invocation, target, Arc::new(SearchSolver::new()), config(&[1000])).unwrap();
    let result = engine.explore();

    assert_eq!(result.return_values.len(), 3);
    let RunOutcome::Failure(fault) = &result.return_values[1] else {
        panic!("second run should fail: {:?}", result.return_values);
    };
    assert_eq!(fault.location, format!("{}:{}", file!(), fault_line));
    assert_eq!(fault.message, "too big");
    assert_eq!(result.return_values[2], RunOutcome::Normal(Value::from("negative")));
    assert_eq!(result.failures().count(), 1);
}

#[test]
fn panic_in_target_is_a_failure_at_panic_site() {
    let panic_line = line!() + 3;
    let target = FnTarget::new("f", ["x"], |args, ctx| {
        if ctx.branch(&args["x"].equals(7)) {
            panic!("seven");
        }
        Ok(Value::Unit)
    });
    let invocation = target.invocation().build().unwrap();
    let engine = ExplorationEngine::new(invocation, target, Arc::new(SearchSolver::new()), config(&[1000])).unwrap();
    let result = engine.explore();

    assert_eq!(result.generated_inputs.len(), 2);
    assert_eq!(result.generated_inputs[1].get("x"), Some(&Value::from(7)));
    let fault = result.return_values[1].fault().unwrap();
    assert_eq!(fault.location, format!("{}:{}", file!(), panic_line));
    assert_eq!(fault.message, "seven");
}

// ─── Scheduling properties ─────────────────────────────────────────────────────

#[test]
fn escalation_climbs_the_ladder_in_order() {
    let solver = Scripted::new(|q, c| {
        if q.timeout < ms(40) {
            SolveResult::Unknown("too short".to_string())
        } else {
            SearchSolver::new().solve(q, c)
        }
    });
    let target = FnTarget::new("f", ["x", "y"], |args, ctx| {
        let (x, y) = (&args["x"], &args["y"]);
        let a = ctx.branch(&x.equals(3));
        let b = ctx.branch(&y.lt(-1));
        Ok(Value::from(a && b))
    });
    let invocation = target.invocation().build().unwrap();
    let engine = ExplorationEngine::new(invocation, target, solver.clone(), config(&[10, 20, 40, 80])).unwrap();
    let result = engine.explore();

    for node in result.tree.iter().skip(1) {
        let tried = result.stats.attempts_for(node.id());
        if tried.is_empty() {
            continue;
        }
        let rungs = [ms(10), ms(20), ms(40)];
        assert_eq!(tried, rungs[..tried.len()].to_vec(), "attempts for {}", node.id());
    }
    assert_eq!(result.tree.stats().archived, 0);
    assert!(result.return_values.contains(&RunOutcome::Normal(Value::from(true))));
}

#[test]
fn no_constraint_is_solved_twice_at_once_and_no_worker_leaks() {
    let solver = Scripted::new(|q, c| {
        for _ in 0..5 {
            if c.is_cancelled() {
                return SolveResult::Unknown("cancelled".to_string());
            }
            thread::sleep(ms(1));
        }
        SearchSolver::new().solve(q, c)
    });
    let target = FnTarget::new("f", ["a", "b", "c"], |args, ctx| {
        let mut n = 0i64;
        for name in ["a", "b", "c"] {
            if ctx.branch(&args[name].gt(0)) {
                n += 1;
            }
        }
        Ok(Value::from(n))
    });
    let invocation = target.invocation().build().unwrap();
    let engine = ExplorationEngine::new(
        invocation,
        target,
        solver.clone(),
        config(&[1000]).with_workers(4),
    )
    .unwrap();
    let result = engine.explore();

    // Every combination of the three branches is reached.
    let mut values: Vec<String> = outcomes(&result);
    values.sort();
    values.dedup();
    assert_eq!(values, vec!["0", "1", "2", "3"]);
    assert_eq!(result.tree.stats().archived, 0);

    assert_eq!(solver.max_active.load(Ordering::SeqCst), 1);
    assert_eq!(solver.live.load(Ordering::SeqCst), 0);
}

#[test]
fn unknown_everywhere_terminates() {
    let solver = Scripted::new(|_, _| SolveResult::Unknown("gave up".to_string()));
    let target = FnTarget::new("f", ["x", "y"], |args, ctx| {
        let mut hits = 0i64;
        if ctx.branch(&args["x"].gt(5)) {
            hits += 1;
        }
        if ctx.branch(&args["y"].gt(5)) {
            hits += 1;
        }
        Ok(Value::from(hits))
    });
    let invocation = target.invocation().build().unwrap();
    let engine = ExplorationEngine::new(invocation, target, solver.clone(), config(&[5, 10]).with_workers(2)).unwrap();
    let result = engine.explore();

    assert_eq!(result.generated_inputs.len(), 1);
    assert_eq!(result.stats.archived, 2);
    assert_eq!(solver.attempts().len(), 4);
    for node in result.tree.iter().filter(|n| n.is_archived()) {
        assert_eq!(node.archived(), Some(GiveUpReason::Undecided));
        assert_eq!(node.inputs(), None);
    }
    assert_eq!(solver.live.load(Ordering::SeqCst), 0);
}

// ─── Worker lifecycle ──────────────────────────────────────────────────────────

/// `f(x, y)` branching on `x > 10`, then on `y > 10`.
fn two_thresholds() -> FnTarget<impl Fn(&Arguments, &mut RunContext<'_>) -> Result<Value, Fault>> {
    FnTarget::new("f", ["x", "y"], |args, ctx| {
        let a = ctx.branch(&args["x"].gt(10));
        let b = ctx.branch(&args["y"].gt(10));
        Ok(Value::from(a as i64 + b as i64))
    })
}

#[test]
fn covered_sibling_cancels_its_running_attempt() {
    let cancelled = Arc::new(AtomicUsize::new(0));
    let seen = cancelled.clone();
    let solver = Scripted::new(move |q, c| match q.constraint.index() {
        // `x > 10` stays busy until the engine gives up on it.
        1 => {
            let r = until_cancelled(c, Duration::from_secs(10));
            if c.is_cancelled() {
                seen.fetch_add(1, Ordering::SeqCst);
            }
            r
        }
        // The model for `y > 10` happens to flip `x > 10` too.
        2 => {
            let mut model = Model::default();
            model.insert("x", Value::from(11));
            model.insert("y", Value::from(11));
            SolveResult::Sat(model)
        }
        _ => SearchSolver::new().solve(q, c),
    });
    let target = two_thresholds();
    let invocation = target.invocation().build().unwrap();
    let engine = ExplorationEngine::new(invocation, target, solver.clone(), config(&[1000]).with_workers(2)).unwrap();
    let start = Instant::now();
    let result = engine.explore();

    assert!(start.elapsed() < Duration::from_secs(5), "explore took {:?}", start.elapsed());
    let x_false = NodeId::new(1);
    assert_eq!(result.stats.attempts_for(x_false), vec![ms(1000)]);
    assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    assert_eq!(result.tree[x_false].archived(), None);
    let x_true = result.tree.sibling(x_false).unwrap();
    assert!(result.tree[x_true].inputs().is_some());
    assert_eq!(result.generated_inputs[1].get("x"), Some(&Value::from(11)));
    assert_eq!(result.stats.archived, 0);
    assert_eq!(result.stats.abandoned_workers, 0);
    assert_eq!(solver.live.load(Ordering::SeqCst), 0);
}

#[test]
fn lost_worker_is_requeued_at_the_same_timeout() {
    let poisoned = Arc::new(AtomicBool::new(false));
    let flag = poisoned.clone();
    let solver = Scripted::new(move |q, c| {
        if !flag.swap(true, Ordering::SeqCst) {
            std::panic::panic_any(Poison);
        }
        SearchSolver::new().solve(q, c)
    });
    let target = FnTarget::new("f", ["x"], |args, ctx| Ok(Value::from(ctx.branch(&args["x"].gt(10)))));
    let invocation = target.invocation().build().unwrap();
    let engine = ExplorationEngine::new(invocation, target, solver.clone(), config(&[50, 100])).unwrap();
    let result = engine.explore();

    let node = NodeId::new(1);
    assert_eq!(result.stats.lost_workers, 1);
    assert_eq!(solver.attempts(), vec![(node, ms(50)), (node, ms(50))]);
    assert_eq!(result.stats.attempts_for(node), vec![ms(50), ms(50)]);
    assert_eq!(outcomes(&result), vec!["false", "true"]);
    assert_eq!(result.stats.archived, 0);
    assert_eq!(solver.live.load(Ordering::SeqCst), 0);
}

#[test]
fn iteration_cap_cancels_running_workers() {
    let started = Arc::new(AtomicBool::new(false));
    let flag = started.clone();
    let solver = Scripted::new(move |q, c| match q.constraint.index() {
        1 => {
            // Answer only once the other worker is busy.
            let start = Instant::now();
            while !flag.load(Ordering::SeqCst) && start.elapsed() < Duration::from_secs(5) {
                thread::sleep(ms(1));
            }
            SearchSolver::new().solve(q, c)
        }
        _ => {
            flag.store(true, Ordering::SeqCst);
            until_cancelled(c, Duration::from_secs(10))
        }
    });
    let target = two_thresholds();
    let invocation = target.invocation().build().unwrap();
    let config = config(&[1000]).with_workers(2).with_max_iterations(2);
    let engine = ExplorationEngine::new(invocation, target, solver.clone(), config).unwrap();
    let start = Instant::now();
    let result = engine.explore();

    assert!(start.elapsed() < Duration::from_secs(5), "explore took {:?}", start.elapsed());
    assert_eq!(result.generated_inputs.len(), 2);
    assert_eq!(result.stats.attempts_for(NodeId::new(1)), vec![ms(1000)]);
    assert_eq!(result.stats.attempts_for(NodeId::new(2)), vec![ms(1000)]);
    assert_eq!(result.stats.abandoned_workers, 0);
    assert_eq!(solver.live.load(Ordering::SeqCst), 0);
}

#[test]
fn worker_ignoring_cancellation_does_not_hold_up_the_session() {
    let started = Arc::new(AtomicBool::new(false));
    let flag = started.clone();
    let solver = Scripted::new(move |q, c| match q.constraint.index() {
        1 => {
            let start = Instant::now();
            while !flag.load(Ordering::SeqCst) && start.elapsed() < Duration::from_secs(5) {
                thread::sleep(ms(1));
            }
            SearchSolver::new().solve(q, c)
        }
        _ => {
            flag.store(true, Ordering::SeqCst);
            thread::sleep(Duration::from_secs(3));
            SolveResult::Unknown("slept".to_string())
        }
    });
    let target = two_thresholds();
    let invocation = target.invocation().build().unwrap();
    let config = config(&[100]).with_workers(2).with_max_iterations(2).with_grace(ms(50));
    let engine = ExplorationEngine::new(invocation, target, solver.clone(), config).unwrap();
    let start = Instant::now();
    let result = engine.explore();

    assert!(start.elapsed() < Duration::from_millis(1500), "explore took {:?}", start.elapsed());
    assert_eq!(result.generated_inputs.len(), 2);
    assert_eq!(result.stats.abandoned_workers, 1);
}

#[test]
fn overrunning_attempt_escalates_like_a_timeout() {
    let solver = Scripted::new(|q, c| {
        if q.timeout == ms(20) {
            thread::sleep(Duration::from_secs(2));
            return SolveResult::Unknown("slept".to_string());
        }
        SearchSolver::new().solve(q, c)
    });
    let target = FnTarget::new("f", ["x"], |args, ctx| Ok(Value::from(ctx.branch(&args["x"].gt(10)))));
    let invocation = target.invocation().build().unwrap();
    let engine = ExplorationEngine::new(invocation, target, solver.clone(), config(&[20, 40]).with_grace(ms(30))).unwrap();
    let start = Instant::now();
    let result = engine.explore();

    assert!(start.elapsed() < Duration::from_millis(1500), "explore took {:?}", start.elapsed());
    let node = NodeId::new(1);
    assert_eq!(result.stats.attempts_for(node), vec![ms(20), ms(40)]);
    assert_eq!(result.stats.overruns, 1);
    assert_eq!(outcomes(&result), vec!["false", "true"]);
    assert_eq!(result.stats.abandoned_workers, 1);
}
