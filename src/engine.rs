//! The exploration driver.
//!
//! [`ExplorationEngine::explore`] alternates between concrete runs of the
//! target and solver attempts on the branches those runs uncovered:
//!
//! 1. Run the target on the initial inputs. Every branch seen for the first
//!    time becomes a pending constraint at the smallest timeout.
//! 2. Until no work is left: hand the oldest solver result to
//!    [`process_completion`][ExplorationEngine::process_completion], or launch
//!    the next pending constraint on a free worker, or wait.
//! 3. A model runs the target again, aimed at the flipped branch. A failed
//!    attempt is retried at the next timeout of the ladder; after the last
//!    rung the opposite branch is archived as unreachable.
//!
//! The control loop is single-threaded. Solver attempts run on the
//! [`WorkerPool`] and report through its completions channel. Every worker
//! is cancelled and joined before `explore` returns.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::binding::{Inputs, Invocation};
use crate::config::{ConfigError, ExplorationConfig};
use crate::pool::{Completion, Displaced, WorkerPool};
use crate::queue::{Pending, PendingQueue};
use crate::runner::{capture_panics, RunContext, RunOutcome, TargetRunner};
use crate::solver::{SolveResult, SolverAdapter, SolverQuery};
use crate::tracker::PathTracker;
use crate::tree::{ConstraintTree, GiveUpReason};
use crate::types::NodeId;

/// Counters collected during one session.
#[derive(Debug, Clone, Default)]
pub struct ExplorationStats {
    /// Concrete runs, the initial one included.
    pub iterations: usize,
    /// Constraints whose branch was flipped by a model.
    pub processed_constraints: usize,
    /// Solver attempts in launch order.
    pub attempts: Vec<(NodeId, Duration)>,
    /// Branches given up after the last rung.
    pub archived: usize,
    pub preemptions: usize,
    /// Workers that ended without reporting.
    pub lost_workers: usize,
    /// Attempts still running past their timeout plus the grace period.
    pub overruns: usize,
    /// Workers still running when the session ended.
    pub abandoned_workers: usize,
    /// Runs that left the path their model was solved for.
    pub divergences: usize,
    pub elapsed: Duration,
}

impl ExplorationStats {
    /// Timeouts tried for `node`, in order.
    pub fn attempts_for(&self, node: NodeId) -> Vec<Duration> {
        self.attempts.iter().filter(|(n, _)| *n == node).map(|(_, t)| *t).collect()
    }
}

/// Output of [`ExplorationEngine::explore`].
#[derive(Debug)]
pub struct ExplorationResult {
    /// Inputs of every run, in run order.
    pub generated_inputs: Vec<Inputs>,
    /// Outcome of every run, index-aligned with `generated_inputs`.
    pub return_values: Vec<RunOutcome>,
    pub tree: ConstraintTree,
    pub stats: ExplorationStats,
}

impl ExplorationResult {
    pub fn runs(&self) -> impl Iterator<Item = (&Inputs, &RunOutcome)> {
        self.generated_inputs.iter().zip(&self.return_values)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Inputs, &RunOutcome)> {
        self.runs().filter(|(_, o)| o.is_failure())
    }
}

pub struct ExplorationEngine<R: TargetRunner> {
    invocation: Invocation,
    runner: R,
    config: ExplorationConfig,
    tracker: PathTracker,
    queue: PendingQueue,
    pool: WorkerPool,
    /// Constraints that are never scheduled again.
    solved: HashSet<NodeId>,
    /// In-flight attempts per `(constraint, timeout)`.
    attempts: HashMap<(NodeId, Duration), usize>,
    generated_inputs: Vec<Inputs>,
    return_values: Vec<RunOutcome>,
    stats: ExplorationStats,
}

impl<R: TargetRunner> ExplorationEngine<R> {
    pub fn new(invocation: Invocation, runner: R, solver: Arc<dyn SolverAdapter>, config: ExplorationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let pool = WorkerPool::new(config.workers, solver).with_grace(config.grace);
        Ok(ExplorationEngine {
            invocation,
            runner,
            config,
            tracker: PathTracker::new(),
            queue: PendingQueue::new(),
            pool,
            solved: HashSet::new(),
            attempts: HashMap::new(),
            generated_inputs: Vec::new(),
            return_values: Vec::new(),
            stats: ExplorationStats::default(),
        })
    }

    /// Runs the session to completion.
    pub fn explore(mut self) -> ExplorationResult {
        let start = Instant::now();
        info!(
            "exploring `{}` with {} worker(s), timeouts [{}]",
            self.runner.name(),
            self.config.workers,
            self.config.ladder
        );

        let initial = self.invocation.initial_inputs();
        self.run_once(None, initial);

        while !self.is_complete() {
            if let Some(max) = self.config.max_iterations {
                if self.stats.iterations >= max {
                    info!("maximum number of iterations ({}) reached", max);
                    break;
                }
            }

            if let Some(completion) = self.pool.next_completion() {
                self.process_completion(completion);
                continue;
            }

            for lost in self.pool.reap_dead() {
                self.stats.lost_workers += 1;
                self.requeue(lost);
            }
            for late in self.pool.reap_overdue() {
                self.stats.overruns += 1;
                let reason = format!("no answer within {:?}", late.timeout);
                self.process_completion(Completion::failed(late.slot, late.constraint, late.timeout, reason));
            }

            if self.queue.is_empty() || self.pool.free_slot().is_none() {
                self.pool.wait(self.config.poll_interval);
                continue;
            }

            match self.select_next() {
                Some(entry) => self.launch(entry),
                None => self.pool.wait(self.config.poll_interval),
            }
        }

        self.pool.shutdown();
        self.stats.abandoned_workers = self.pool.abandoned();
        self.stats.divergences = self.tracker.divergences();
        self.stats.elapsed = start.elapsed();
        info!(
            "explored `{}`: {} run(s), {} constraint(s) flipped, {} archived in {:?}",
            self.runner.name(),
            self.stats.iterations,
            self.stats.processed_constraints,
            self.stats.archived,
            self.stats.elapsed
        );

        ExplorationResult {
            generated_inputs: self.generated_inputs,
            return_values: self.return_values,
            tree: self.tracker.into_tree(),
            stats: self.stats,
        }
    }

    /// No pending constraint, no busy worker and no unprocessed result.
    pub fn is_complete(&mut self) -> bool {
        self.queue.is_empty() && self.pool.busy() == 0 && !self.pool.has_completion()
    }

    /// Runs the target on `inputs`, aiming at the opposite branch of `target`.
    fn run_once(&mut self, target: Option<NodeId>, inputs: Inputs) {
        self.stats.iterations += 1;
        let run = self.stats.iterations;
        self.generated_inputs.push(inputs.clone());
        self.tracker.reset(target);

        let args = self.invocation.arguments(&inputs);
        let outcome = {
            let mut ctx = RunContext::new(&mut self.tracker);
            let runner = &self.runner;
            capture_panics(|| runner.run(&args, &mut ctx))
        };
        info!("run {} {}: {}", run, inputs, outcome);
        self.return_values.push(outcome);

        let first = self.config.ladder.first();
        for id in self.tracker.take_new_constraints() {
            if let Some(node) = self.tracker.tree_mut().get_mut(id) {
                node.inputs = Some(inputs.clone());
            }
            match self.tracker.tree().sibling(id) {
                Some(sibling) => {
                    // Both outcomes of the branch are reached.
                    debug!("{} covers the opposite branch of {}", id, sibling);
                    self.solved.insert(id);
                    self.mark_solved(sibling);
                }
                None => self.queue.push(id, first),
            }
        }

        for id in self.tracker.take_revived() {
            debug!("{} reached after being archived", id);
            if let Some(node) = self.tracker.tree_mut().get_mut(id) {
                node.inputs = Some(inputs.clone());
                node.archived = None;
            }
        }
    }

    /// Marks `id` solved and cancels its running attempts.
    fn mark_solved(&mut self, id: NodeId) {
        self.solved.insert(id);
        for slot in self.pool.running(id) {
            if let Some(d) = self.pool.cancel(slot) {
                self.finish_attempt(d.constraint, d.timeout);
            }
        }
    }

    fn finish_attempt(&mut self, id: NodeId, timeout: Duration) {
        if let Some(n) = self.attempts.get_mut(&(id, timeout)) {
            *n = n.saturating_sub(1);
        }
    }

    fn in_flight(&self, id: NodeId, timeout: Duration) -> usize {
        self.attempts.get(&(id, timeout)).copied().unwrap_or(0)
    }

    /// Puts a job that lost its worker back at its original timeout.
    fn requeue(&mut self, job: Displaced) {
        self.finish_attempt(job.constraint, job.timeout);
        if self.solved.contains(&job.constraint) {
            return;
        }
        if let Some(node) = self.tracker.tree_mut().get_mut(job.constraint) {
            node.processed = false;
        }
        self.queue.push(job.constraint, job.timeout);
    }

    /// Takes the first pending entry whose constraint is neither solved nor running.
    ///
    /// Entries for solved constraints are dropped; entries for running ones
    /// go back unchanged.
    fn select_next(&mut self) -> Option<Pending> {
        let mut skipped = Vec::new();
        let mut selected = None;
        while let Some(entry) = self.queue.pop() {
            if self.solved.contains(&entry.node) {
                debug!("dropping {}: already solved", entry.node);
                continue;
            }
            if self.pool.is_running(entry.node) {
                skipped.push(entry);
                continue;
            }
            selected = Some(entry);
            break;
        }
        for entry in skipped {
            self.queue.restore(entry);
        }
        selected
    }

    fn launch(&mut self, entry: Pending) {
        let id = entry.node;
        let Some(slot) = self.pool.free_slot() else {
            self.queue.restore(entry);
            return;
        };
        let Some((asserts, goal)) = self.tracker.tree().query_for(id) else {
            warn!("cannot build a query for {}", id);
            self.solved.insert(id);
            return;
        };
        let hint = self.tracker.find_constraint(id).and_then(|n| n.inputs().cloned());
        let query = SolverQuery {
            constraint: id,
            asserts,
            goal,
            timeout: entry.timeout,
            hint,
        };

        if let Some(node) = self.tracker.tree_mut().get_mut(id) {
            node.processed = true;
        }
        *self.attempts.entry((id, entry.timeout)).or_insert(0) += 1;
        self.stats.attempts.push((id, entry.timeout));

        match self.pool.launch(slot, query) {
            Ok(None) => {}
            Ok(Some(displaced)) => {
                warn!("slot {} was busy with {}, requeueing it", displaced.slot, displaced.constraint);
                self.stats.preemptions += 1;
                self.requeue(displaced);
            }
            Err(e) => {
                warn!("{} for {}", e, id);
                if let Some(displaced) = e.displaced {
                    self.stats.preemptions += 1;
                    self.requeue(displaced);
                }
                self.process_completion(Completion::failed(slot, id, entry.timeout, e.source.to_string()));
            }
        }
    }

    /// Handles one solver result.
    pub fn process_completion(&mut self, completion: Completion) {
        let id = completion.constraint;
        let timeout = completion.timeout;
        self.finish_attempt(id, timeout);

        if self.solved.contains(&id) {
            debug!("{}: stale result at {:?}", id, timeout);
            return;
        }
        let Some(node) = self.tracker.find_constraint(id) else {
            warn!("result for unknown constraint {}", id);
            return;
        };
        debug!(
            "{} ({}): {} at {:?}",
            id,
            node.branch_label().unwrap_or("-"),
            completion.result,
            timeout
        );

        let unsat = matches!(completion.result, SolveResult::Unsat);
        match completion.result {
            SolveResult::Sat(model) => {
                let base = node.inputs().cloned().unwrap_or_else(|| self.invocation.initial_inputs());
                let inputs = self.invocation.apply_model(&base, &model);
                for slot in self.pool.running(id) {
                    if let Some(d) = self.pool.cancel(slot) {
                        self.finish_attempt(d.constraint, d.timeout);
                    }
                }
                self.run_once(Some(id), inputs);
                self.solved.insert(id);
                self.stats.processed_constraints += 1;
            }
            SolveResult::Unsat | SolveResult::Unknown(_) => {
                if self.pool.is_running(id) || self.in_flight(id, timeout) > 0 {
                    return;
                }
                if self.queue.contains(id) {
                    if let Some(node) = self.tracker.tree_mut().get_mut(id) {
                        node.processed = false;
                    }
                    return;
                }
                match self.config.ladder.next_after(timeout) {
                    Some(next) => {
                        debug!("{}: escalating to {:?}", id, next);
                        if let Some(node) = self.tracker.tree_mut().get_mut(id) {
                            node.processed = false;
                        }
                        self.queue.push(id, next);
                    }
                    None => {
                        let reason = if unsat {
                            GiveUpReason::Unsatisfiable
                        } else {
                            GiveUpReason::Undecided
                        };
                        if let Some(sibling) = self.tracker.tree_mut().archive_sibling(id, reason) {
                            info!("giving up on {} ({}): archived as {}", id, reason, sibling);
                        }
                        self.stats.archived += 1;
                        self.solved.insert(id);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::TimeoutLadder;
    use crate::runner::FnTarget;
    use crate::solver::search::SearchSolver;
    use crate::solver::CancelToken;
    use crate::value::Value;

    use test_log::test;

    struct AlwaysUnknown;

    impl SolverAdapter for AlwaysUnknown {
        fn name(&self) -> &str {
            "unknown"
        }

        fn solve(&self, _query: &SolverQuery, _cancel: &CancelToken) -> SolveResult {
            SolveResult::Unknown("no idea".to_string())
        }
    }

    fn config() -> ExplorationConfig {
        ExplorationConfig::default()
            .with_ladder(TimeoutLadder::from_millis(&[50, 100]).unwrap())
            .with_poll_interval(Duration::from_millis(1))
    }

    #[test]
    fn test_two_nested_branches() {
        let target = FnTarget::new("f", ["x", "y"], |args, ctx| {
            let (x, y) = (&args["x"], &args["y"]);
            if ctx.branch(&x.gt(0)) {
                if ctx.branch(&y.equals(x + 3)) {
                    return Ok(Value::from("both"));
                }
                return Ok(Value::from("x"));
            }
            Ok(Value::from("none"))
        });
        let inv = target.invocation().build().unwrap();
        let engine = ExplorationEngine::new(inv, target, Arc::new(SearchSolver::new()), config()).unwrap();
        let result = engine.explore();

        let values: Vec<String> = result.return_values.iter().map(|o| o.to_string()).collect();
        assert_eq!(values, vec!["\"none\"", "\"x\"", "\"both\""]);
        assert_eq!(result.tree.len(), 5);
        assert_eq!(result.stats.processed_constraints, 2);
        assert_eq!(result.stats.divergences, 0);
    }

    #[test]
    fn test_unknown_archives_with_reason() {
        let target = FnTarget::new("f", ["x"], |args, ctx| Ok(Value::from(ctx.branch(&args["x"].lt(0)))));
        let inv = target.invocation().build().unwrap();
        let engine = ExplorationEngine::new(inv, target, Arc::new(AlwaysUnknown), config()).unwrap();
        let result = engine.explore();

        assert_eq!(result.generated_inputs.len(), 1);
        let archived: Vec<_> = result.tree.iter().filter(|n| n.is_archived()).collect();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].archived(), Some(GiveUpReason::Undecided));
        assert_eq!(
            result.stats.attempts_for(NodeId::new(1)),
            vec![Duration::from_millis(50), Duration::from_millis(100)]
        );
    }

    #[test]
    fn test_iteration_cap() {
        let target = FnTarget::new("f", ["x"], |args, ctx| {
            let x = &args["x"];
            let mut n = 0;
            for k in 0..10i64 {
                if ctx.branch(&x.equals(k)) {
                    n = k;
                }
            }
            Ok(Value::from(n))
        });
        let inv = target.invocation().build().unwrap();
        let engine = ExplorationEngine::new(inv, target, Arc::new(SearchSolver::new()), config().with_max_iterations(3)).unwrap();
        let result = engine.explore();
        assert_eq!(result.generated_inputs.len(), 3);
        assert_eq!(result.return_values.len(), 3);
        assert_eq!(result.stats.abandoned_workers, 0);
    }

    #[test]
    fn test_invalid_config() {
        let target = FnTarget::new("f", ["x"], |_, _| Ok(Value::Unit));
        let inv = target.invocation().build().unwrap();
        let err = ExplorationEngine::new(inv, target, Arc::new(AlwaysUnknown), config().with_workers(0)).err();
        assert_eq!(err, Some(ConfigError::NoWorkers));
    }
}
