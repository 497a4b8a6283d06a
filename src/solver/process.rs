//! External SMT solver in a child process.
//!
//! Each query spawns a fresh solver, writes the SMT-LIB2 script to its
//! stdin and reads the answer from stdout. The child is killed when the
//! cancel token fires or the deadline (the query timeout plus a grace
//! period) passes, so a cancelled attempt never outlives its slot.
//!
//! Both pipes are served by helper threads, so a child that stops reading
//! cannot block the deadline check. Helpers are joined for at most the grace
//! period after the child exits; a helper kept busy by a grandchild that
//! inherited the pipes is left behind.

use std::io::{self, Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, warn};
use thiserror::Error;

use super::smtlib::{parse_response, query_script};
use super::{CancelToken, SolveResult, SolverAdapter, SolverQuery};

#[derive(Debug, Error)]
pub enum ProcessSolverError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("solver I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("solver error: {0}")]
    Solver(String),
    #[error("failed to parse solver output: {0}")]
    Parse(String),
    #[error("solver missed its deadline")]
    Deadline,
    #[error("cancelled")]
    Cancelled,
}

/// Kills and reaps the child when dropped.
struct ChildGuard(Child);

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Ok(None) = self.0.try_wait() {
            let _ = self.0.kill();
        }
        let _ = self.0.wait();
    }
}

/// Joins `handle` if it finishes before `until`.
fn join_by<T>(handle: JoinHandle<T>, until: Instant) -> Option<thread::Result<T>> {
    while !handle.is_finished() {
        if Instant::now() >= until {
            return None;
        }
        thread::sleep(Duration::from_millis(1));
    }
    Some(handle.join())
}

/// Solver adapter running an SMT-LIB2 solver binary.
#[derive(Debug, Clone)]
pub struct ProcessSolver {
    name: String,
    program: String,
    args: Vec<String>,
    /// Per-query time limit flag; `{ms}` is replaced by the timeout in milliseconds.
    timeout_flag: Option<String>,
    /// Extra time granted to the child before it is killed.
    pub grace: Duration,
    /// How often the child is polled for exit.
    pub poll_interval: Duration,
}

impl ProcessSolver {
    pub fn new<S: Into<String>>(program: impl Into<String>, args: impl IntoIterator<Item = S>) -> Self {
        let program = program.into();
        Self {
            name: program.clone(),
            program,
            args: args.into_iter().map(Into::into).collect(),
            timeout_flag: None,
            grace: Duration::from_millis(100),
            poll_interval: Duration::from_millis(2),
        }
    }

    pub fn z3() -> Self {
        Self::new("z3", ["-in", "-smt2"]).with_timeout_flag("-t:{ms}")
    }

    pub fn cvc5() -> Self {
        Self::new("cvc5", ["--lang", "smt2"]).with_timeout_flag("--tlimit-per={ms}")
    }

    pub fn with_timeout_flag(mut self, flag: impl Into<String>) -> Self {
        self.timeout_flag = Some(flag.into());
        self
    }

    fn run(&self, query: &SolverQuery, cancel: &CancelToken) -> Result<SolveResult, ProcessSolverError> {
        let start = Instant::now();
        let deadline = query.deadline_from(start) + self.grace;
        let script = query_script(query);

        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(flag) = &self.timeout_flag {
            command.arg(flag.replace("{ms}", &query.timeout.as_millis().max(1).to_string()));
        }
        let child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| ProcessSolverError::Spawn {
                command: self.program.clone(),
                source,
            })?;
        let mut child = ChildGuard(child);

        let stdin = child
            .0
            .stdin
            .take()
            .ok_or_else(|| ProcessSolverError::Solver("failed to capture stdin".into()))?;
        let mut stdout = child
            .0
            .stdout
            .take()
            .ok_or_else(|| ProcessSolverError::Solver("failed to capture stdout".into()))?;

        let reader = thread::spawn(move || {
            let mut out = String::new();
            stdout.read_to_string(&mut out).map(|_| out)
        });
        let writer = thread::spawn(move || {
            let mut stdin = stdin;
            stdin.write_all(script.as_bytes())
        });

        if let Err(e) = self.wait_for_exit(&mut child, cancel, deadline) {
            drop(child);
            let until = Instant::now() + self.grace;
            let _ = join_by(writer, until);
            let _ = join_by(reader, until);
            return Err(e);
        }

        let until = Instant::now() + self.grace;
        match join_by(writer, until) {
            Some(Ok(Err(e))) if e.kind() != io::ErrorKind::BrokenPipe => return Err(e.into()),
            Some(Err(_)) => return Err(ProcessSolverError::Solver("input writer panicked".into())),
            _ => {}
        }
        let out = match join_by(reader, until) {
            Some(Ok(out)) => out?,
            Some(Err(_)) => return Err(ProcessSolverError::Solver("output reader panicked".into())),
            None => return Err(ProcessSolverError::Solver("solver output was not closed".into())),
        };
        debug!("{}: {} answered in {:?}", query.constraint, self.name, start.elapsed());

        let result = parse_response(&out, &query.variables())?;
        if let SolveResult::Sat(model) = &result {
            // Division by zero is unspecified in SMT-LIB but a fault when run.
            if !query.is_satisfied_by(model) {
                return Ok(SolveResult::Unknown("model does not evaluate".to_string()));
            }
        }
        Ok(result)
    }
}

impl ProcessSolver {
    fn wait_for_exit(&self, child: &mut ChildGuard, cancel: &CancelToken, deadline: Instant) -> Result<(), ProcessSolverError> {
        loop {
            if cancel.is_cancelled() {
                return Err(ProcessSolverError::Cancelled);
            }
            if Instant::now() >= deadline {
                return Err(ProcessSolverError::Deadline);
            }
            if child.0.try_wait()?.is_some() {
                return Ok(());
            }
            thread::sleep(self.poll_interval);
        }
    }
}

impl SolverAdapter for ProcessSolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn solve(&self, query: &SolverQuery, cancel: &CancelToken) -> SolveResult {
        match self.run(query, cancel) {
            Ok(result) => result,
            Err(ProcessSolverError::Cancelled) => SolveResult::Unknown("cancelled".to_string()),
            Err(ProcessSolverError::Deadline) => SolveResult::Unknown("timeout".to_string()),
            Err(e) => {
                warn!("{}: {}", self.name, e);
                SolveResult::Unknown(e.to_string())
            }
        }
    }
}
