//! Exploration settings and configuration errors.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Errors detected before exploration starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("`{function}` has no parameter named `{name}`")]
    UnknownParameter { function: String, name: String },
    #[error("parameter `{0}` is declared twice")]
    DuplicateParameter(String),
    #[error("parameter `{0}` is bound twice")]
    DuplicateBinding(String),
    #[error("parameter `{0}` is bound both concretely and symbolically")]
    ConflictingBinding(String),
    #[error("parameter `{name}`: no symbolic type for values of type {type_name}")]
    NoSymbolicType { name: String, type_name: &'static str },
    #[error("the timeout ladder is empty")]
    EmptyLadder,
    #[error("timeouts must be positive")]
    ZeroTimeout,
    #[error("at least one worker is required")]
    NoWorkers,
    #[error("the poll interval must be positive")]
    ZeroPollInterval,
}

/// Solver time budgets, tried in ascending order.
///
/// # Invariants
///
/// - Non-empty
/// - Strictly ascending (duplicates are removed on construction)
/// - Every rung is positive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutLadder {
    rungs: Vec<Duration>,
}

/// 0.13 s doubling up to 33.28 s.
const DEFAULT_LADDER_MS: [u64; 9] = [130, 260, 520, 1040, 2080, 4160, 8320, 16640, 33280];

impl TimeoutLadder {
    pub fn new(timeouts: impl IntoIterator<Item = Duration>) -> Result<Self, ConfigError> {
        let mut rungs: Vec<Duration> = timeouts.into_iter().collect();
        if rungs.is_empty() {
            return Err(ConfigError::EmptyLadder);
        }
        if rungs.iter().any(|d| d.is_zero()) {
            return Err(ConfigError::ZeroTimeout);
        }
        rungs.sort();
        rungs.dedup();
        Ok(TimeoutLadder { rungs })
    }

    pub fn from_millis(ms: &[u64]) -> Result<Self, ConfigError> {
        Self::new(ms.iter().map(|&m| Duration::from_millis(m)))
    }

    pub fn first(&self) -> Duration {
        self.rungs[0]
    }

    pub fn last(&self) -> Duration {
        self.rungs[self.rungs.len() - 1]
    }

    /// The next larger rung, or `None` when `timeout` is the last one.
    pub fn next_after(&self, timeout: Duration) -> Option<Duration> {
        self.rungs.iter().copied().find(|&d| d > timeout)
    }

    pub fn contains(&self, timeout: Duration) -> bool {
        self.rungs.binary_search(&timeout).is_ok()
    }

    pub fn rungs(&self) -> &[Duration] {
        &self.rungs
    }

    pub fn len(&self) -> usize {
        self.rungs.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for TimeoutLadder {
    fn default() -> Self {
        TimeoutLadder {
            rungs: DEFAULT_LADDER_MS.iter().map(|&m| Duration::from_millis(m)).collect(),
        }
    }
}

impl fmt::Display for TimeoutLadder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, d) in self.rungs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:?}", d)?;
        }
        Ok(())
    }
}

/// Configuration for an exploration session.
#[derive(Debug, Clone)]
pub struct ExplorationConfig {
    /// Number of concurrent solver workers.
    pub workers: usize,
    /// Time budgets tried for each constraint.
    pub ladder: TimeoutLadder,
    /// Stop after this many main-loop iterations.
    pub max_iterations: Option<usize>,
    /// How long the control loop blocks waiting for a completion.
    pub poll_interval: Duration,
    /// Slack past an attempt's timeout before its worker is abandoned, and
    /// the bound on joining workers at shutdown.
    pub grace: Duration,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            ladder: TimeoutLadder::default(),
            max_iterations: None,
            poll_interval: Duration::from_millis(20),
            grace: Duration::from_millis(500),
        }
    }
}

impl ExplorationConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_ladder(mut self, ladder: TimeoutLadder) -> Self {
        self.ladder = ladder;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    #[test]
    fn test_default_ladder() {
        let ladder = TimeoutLadder::default();
        assert_eq!(ladder.len(), 9);
        assert_eq!(ladder.first(), Duration::from_millis(130));
        assert_eq!(ladder.last(), Duration::from_millis(33280));
        assert_eq!(ladder.next_after(Duration::from_millis(130)), Some(Duration::from_millis(260)));
        assert_eq!(ladder.next_after(ladder.last()), None);
    }

    #[test]
    fn test_ladder_is_sorted_and_deduplicated() {
        let ladder = TimeoutLadder::from_millis(&[40, 10, 20, 10]).unwrap();
        assert_eq!(
            ladder.rungs(),
            &[Duration::from_millis(10), Duration::from_millis(20), Duration::from_millis(40)]
        );
        assert!(ladder.contains(Duration::from_millis(20)));
        assert!(!ladder.contains(Duration::from_millis(30)));
    }

    #[test]
    fn test_ladder_rejects_invalid() {
        assert_eq!(TimeoutLadder::from_millis(&[]), Err(ConfigError::EmptyLadder));
        assert_eq!(TimeoutLadder::from_millis(&[0, 5]), Err(ConfigError::ZeroTimeout));
    }

    #[test]
    fn test_validate() {
        assert!(ExplorationConfig::default().validate().is_ok());
        assert_eq!(ExplorationConfig::default().with_workers(0).validate(), Err(ConfigError::NoWorkers));
    }
}
