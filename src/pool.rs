//! Fixed-size pool of preemptible solver workers.
//!
//! Each busy slot runs one [`SolverQuery`] on its own thread. Workers talk
//! back only through the completions channel; the control loop owns the
//! slots and is the only code that frees them. A completion is accepted only
//! if the slot that produced it still holds the same job (matched by
//! ticket), so results of cancelled or preempted workers are dropped.
//!
//! # Invariants
//!
//! - A slot holds at most one job
//! - Freeing a slot (by completion, cancellation or reaping) happens on the
//!   control thread, so no completion can arrive for a slot after it is
//!   reused
//! - A job still running past its timeout plus the grace period is taken
//!   off its slot by [`reap_overdue`][WorkerPool::reap_overdue]
//! - [`shutdown`][WorkerPool::shutdown] joins every thread that finishes
//!   within the grace period and abandons the rest

use std::collections::VecDeque;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, warn};
use thiserror::Error;

use crate::solver::{CancelToken, SolveResult, SolverAdapter, SolverQuery};
use crate::types::NodeId;

/// Result reported by a worker.
#[derive(Debug, Clone)]
pub struct Completion {
    ticket: u64,
    pub slot: usize,
    pub constraint: NodeId,
    pub timeout: Duration,
    pub result: SolveResult,
}

impl Completion {
    /// Completion for an attempt that never started or never answered.
    pub(crate) fn failed(slot: usize, constraint: NodeId, timeout: Duration, reason: String) -> Self {
        Completion {
            ticket: u64::MAX,
            slot,
            constraint,
            timeout,
            result: SolveResult::Unknown(reason),
        }
    }
}

/// A job taken off a slot before it reported.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Displaced {
    pub slot: usize,
    pub constraint: NodeId,
    pub timeout: Duration,
}

/// A worker thread could not be started.
///
/// The slot's previous occupant, if any, was already cancelled and is
/// handed back for requeueing.
#[derive(Debug, Error)]
#[error("failed to start a solver worker: {source}")]
pub struct SpawnError {
    #[source]
    pub source: io::Error,
    pub displaced: Option<Displaced>,
}

struct Slot {
    ticket: u64,
    constraint: NodeId,
    timeout: Duration,
    deadline: Instant,
    cancel: CancelToken,
    handle: JoinHandle<()>,
}

pub struct WorkerPool {
    solver: Arc<dyn SolverAdapter>,
    slots: Vec<Option<Slot>>,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
    /// Accepted completions not yet handed out, oldest first.
    ready: VecDeque<Completion>,
    /// Threads of cancelled or finished jobs, joined on shutdown.
    retired: Vec<JoinHandle<()>>,
    next_ticket: u64,
    grace: Duration,
    abandoned: usize,
}

const DEFAULT_GRACE: Duration = Duration::from_millis(500);

impl WorkerPool {
    pub fn new(size: usize, solver: Arc<dyn SolverAdapter>) -> Self {
        let (tx, rx) = unbounded();
        WorkerPool {
            solver,
            slots: (0..size).map(|_| None).collect(),
            tx,
            rx,
            ready: VecDeque::new(),
            retired: Vec::new(),
            next_ticket: 0,
            grace: DEFAULT_GRACE,
            abandoned: 0,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots holding a job.
    pub fn busy(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.is_none())
    }

    /// Slots currently working on `constraint`.
    pub fn running(&self, constraint: NodeId) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.as_ref().map_or(false, |s| s.constraint == constraint))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn is_running(&self, constraint: NodeId) -> bool {
        self.slots.iter().flatten().any(|s| s.constraint == constraint)
    }

    /// Starts `query` on `slot`.
    ///
    /// An occupant of the slot is cancelled first and returned so the caller
    /// can requeue it.
    pub fn launch(&mut self, slot: usize, query: SolverQuery) -> Result<Option<Displaced>, SpawnError> {
        let displaced = self.cancel(slot);

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let constraint = query.constraint;
        let timeout = query.timeout;
        let cancel = CancelToken::new();

        let solver = Arc::clone(&self.solver);
        let tx = self.tx.clone();
        let token = cancel.clone();
        let spawned = thread::Builder::new().name(format!("solver-{}", slot)).spawn(move || {
            let result = match panic::catch_unwind(AssertUnwindSafe(|| solver.solve(&query, &token))) {
                Ok(result) => result,
                Err(_) => SolveResult::Unknown("solver panicked".to_string()),
            };
            if !token.is_cancelled() {
                let _ = tx.send(Completion {
                    ticket,
                    slot,
                    constraint,
                    timeout,
                    result,
                });
            }
        });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(source) => return Err(SpawnError { source, displaced }),
        };

        debug!("slot {}: solving {} with timeout {:?}", slot, constraint, timeout);
        self.slots[slot] = Some(Slot {
            ticket,
            constraint,
            timeout,
            deadline: Instant::now() + timeout + self.grace,
            cancel,
            handle,
        });
        Ok(displaced)
    }

    /// Cancels the job on `slot` and frees the slot. Idempotent.
    pub fn cancel(&mut self, slot: usize) -> Option<Displaced> {
        let s = self.slots.get_mut(slot)?.take()?;
        s.cancel.cancel();
        self.retired.push(s.handle);
        debug!("slot {}: cancelled {}", slot, s.constraint);
        Some(Displaced {
            slot,
            constraint: s.constraint,
            timeout: s.timeout,
        })
    }

    fn accept(&mut self, completion: Completion) {
        let matches = self
            .slots
            .get(completion.slot)
            .and_then(|s| s.as_ref())
            .map_or(false, |s| s.ticket == completion.ticket);
        if !matches {
            debug!("dropping stale completion for {}", completion.constraint);
            return;
        }
        if let Some(s) = self.slots[completion.slot].take() {
            self.retired.push(s.handle);
        }
        self.ready.push_back(completion);
    }

    /// Moves everything the workers have reported into the ready queue.
    pub fn poll(&mut self) {
        while let Ok(c) = self.rx.try_recv() {
            self.accept(c);
        }
    }

    /// Frees slots whose worker ended without reporting, returning their jobs.
    pub fn reap_dead(&mut self) -> Vec<Displaced> {
        let finished: Vec<(usize, u64)> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().filter(|s| s.handle.is_finished()).map(|s| (i, s.ticket)))
            .collect();
        if finished.is_empty() {
            return Vec::new();
        }
        // A finished worker's completion, if any, is already in the channel.
        self.poll();

        let mut lost = Vec::new();
        for (i, ticket) in finished {
            if self.slots[i].as_ref().map_or(false, |s| s.ticket == ticket) {
                if let Some(d) = self.cancel(i) {
                    warn!("slot {}: worker for {} died without reporting", i, d.constraint);
                    lost.push(d);
                }
            }
        }
        lost
    }

    /// Cancels jobs still running past their timeout plus the grace period
    /// and returns them. Their threads are retired, not joined.
    pub fn reap_overdue(&mut self) -> Vec<Displaced> {
        let now = Instant::now();
        if !self.slots.iter().flatten().any(|s| s.deadline <= now) {
            return Vec::new();
        }
        // A result that made it in time wins over the deadline.
        self.poll();

        let overdue: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().filter(|s| s.deadline <= now).map(|_| i))
            .collect();
        let mut jobs = Vec::new();
        for i in overdue {
            if let Some(d) = self.cancel(i) {
                warn!("slot {}: worker for {} overran {:?}", i, d.constraint, d.timeout);
                jobs.push(d);
            }
        }
        jobs
    }

    pub fn has_completion(&mut self) -> bool {
        self.poll();
        !self.ready.is_empty()
    }

    /// The oldest accepted completion.
    pub fn next_completion(&mut self) -> Option<Completion> {
        self.poll();
        self.ready.pop_front()
    }

    /// Blocks up to `timeout` for a completion to arrive.
    pub fn wait(&mut self, timeout: Duration) {
        self.join_finished();
        if !self.ready.is_empty() {
            return;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(c) => self.accept(c),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {}
        }
    }

    fn join_finished(&mut self) {
        let (done, running): (Vec<_>, Vec<_>) = self.retired.drain(..).partition(|h| h.is_finished());
        self.retired = running;
        for h in done {
            let _ = h.join();
        }
    }

    /// Threads that have not finished yet, busy or cancelled.
    pub fn live_workers(&self) -> usize {
        let busy = self.slots.iter().flatten().filter(|s| !s.handle.is_finished()).count();
        let retired = self.retired.iter().filter(|h| !h.is_finished()).count();
        busy + retired
    }

    /// Workers left running by [`shutdown`][WorkerPool::shutdown].
    pub fn abandoned(&self) -> usize {
        self.abandoned
    }

    /// Cancels every job and joins the worker threads, waiting at most the
    /// grace period for them to stop.
    pub fn shutdown(&mut self) {
        for i in 0..self.slots.len() {
            self.cancel(i);
        }
        let deadline = Instant::now() + self.grace;
        loop {
            self.join_finished();
            if self.retired.is_empty() || Instant::now() >= deadline {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        if !self.retired.is_empty() {
            warn!("abandoning {} solver worker(s) that ignored cancellation", self.retired.len());
            self.abandoned += self.retired.len();
            self.retired.clear();
        }
        self.ready.clear();
        while self.rx.try_recv().is_ok() {}
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
