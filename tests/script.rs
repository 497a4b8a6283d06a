//! Loading and exploring script modules.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use concolic_rs::config::{ExplorationConfig, TimeoutLadder};
use concolic_rs::engine::{ExplorationEngine, ExplorationResult};
use concolic_rs::runner::RunOutcome;
use concolic_rs::script::{load_module, LoadError};
use concolic_rs::solver::search::SearchSolver;
use concolic_rs::value::Value;

const CLASSIFY: &str = r#"// Sorts an integer into one of four buckets.
symbolic x = 0;
concrete limit = 10;

fn sign(v) {
    if v < 0 {
        return -1;
    }
    return 1;
}

fn classify(x, limit) {
    if x > limit {
        if x % 2 == 0 {
            return "big even";
        }
        return "big odd";
    }
    if sign(x) < 0 {
        fail "negative";
    }
    return "small";
}
"#;

const GREET: &str = r#"symbolic name = "";

fn greet(name) {
    if len(name) > 2 {
        if name == "bob" {
            return "hi bob";
        }
        return "hi stranger";
    }
    return "too short";
}
"#;

fn write_module(dir: &tempfile::TempDir, file: &str, src: &str) -> PathBuf {
    let path = dir.path().join(file);
    fs::write(&path, src).unwrap();
    path
}

fn explore(path: &PathBuf) -> ExplorationResult {
    let target = load_module(path).unwrap();
    let invocation = target.invocation().clone();
    let config = ExplorationConfig::default()
        .with_ladder(TimeoutLadder::new([Duration::from_secs(1)]).unwrap())
        .with_poll_interval(Duration::from_millis(1));
    ExplorationEngine::new(invocation, target, Arc::new(SearchSolver::new()), config)
        .unwrap()
        .explore()
}

#[test]
fn classify_reaches_every_bucket() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_module(&dir, "classify.cl", CLASSIFY);
    let result = explore(&path);

    assert_eq!(result.generated_inputs.len(), 4);
    assert_eq!(result.return_values[0], RunOutcome::Normal(Value::from("small")));
    for expected in ["big even", "big odd"] {
        assert!(result.return_values.contains(&RunOutcome::Normal(Value::from(expected))));
    }

    let failures: Vec<_> = result.failures().collect();
    assert_eq!(failures.len(), 1);
    let (inputs, outcome) = failures[0];
    let x = inputs.get("x").and_then(Value::as_int).unwrap();
    assert!(*x < 0.into());
    let fault = outcome.fault().unwrap();
    assert_eq!(fault.location, format!("{}:20", path.display()));
    assert_eq!(fault.message, "negative");

    // `limit` is concrete and never part of the inputs.
    assert!(result.generated_inputs.iter().all(|i| i.get("limit").is_none()));
}

#[test]
fn branch_labels_point_into_the_module() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_module(&dir, "classify.cl", CLASSIFY);
    let result = explore(&path);

    let mut labels: Vec<String> = result
        .tree
        .iter()
        .filter_map(|n| n.branch_label().map(str::to_string))
        .collect();
    labels.sort();
    labels.dedup();
    let prefix = path.display().to_string();
    let expected: Vec<String> = [13, 14, 6].iter().map(|l| format!("{}:{}", prefix, l)).collect();
    for label in &expected {
        assert!(labels.contains(label), "missing {} in {:?}", label, labels);
    }
    assert_eq!(labels.len(), 3);
}

#[test]
fn string_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_module(&dir, "greet.cl", GREET);
    let result = explore(&path);

    let values: Vec<String> = result.return_values.iter().map(|o| o.to_string()).collect();
    assert_eq!(values, vec!["\"too short\"", "\"hi stranger\"", "\"hi bob\""]);
    assert_eq!(result.generated_inputs[2].get("name"), Some(&Value::from("bob")));
}

#[test]
fn runaway_loop_is_a_failure() {
    let dir = tempfile::tempdir().unwrap();
    let src = "fn spin(x) {\n    while x >= 0 {\n        x = x + 1;\n    }\n    return x;\n}\n";
    let path = write_module(&dir, "spin.cl", src);
    let target = load_module(&path).unwrap().with_step_limit(500);
    let invocation = target.invocation().clone();
    let config = ExplorationConfig::default().with_max_iterations(1);
    let result = ExplorationEngine::new(invocation, target, Arc::new(SearchSolver::new()), config)
        .unwrap()
        .explore();

    let fault = result.return_values[0].fault().unwrap();
    assert!(fault.message.contains("step limit"));
    assert!(fault.location.ends_with(":2") || fault.location.ends_with(":3"));
}

#[test]
fn load_errors() {
    let dir = tempfile::tempdir().unwrap();

    let path = write_module(&dir, "broken.cl", "fn broken(x) {\n    return x +;\n}\n");
    let err = load_module(&path).unwrap_err();
    assert!(matches!(err, LoadError::Syntax { ref error, .. } if error.line == 2));
    assert!(err.to_string().contains("line 2"));

    let path = write_module(&dir, "entry.cl", "fn other(x) { return x; }\n");
    assert!(matches!(load_module(&path), Err(LoadError::MissingEntry { name, .. }) if name == "entry"));
}
