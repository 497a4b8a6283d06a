//! In-process solver: interval propagation followed by a bounded search.
//!
//! # Algorithm
//!
//! 1. **Propagate**: narrow each integer variable with the linear atoms of
//!    the query (see [`interval`][super::interval]). An empty domain proves
//!    the query unsatisfiable.
//! 2. **Seed**: start from the inputs of the run that created the node,
//!    moved into the propagated domains.
//! 3. **Search**: try single-variable changes, then combinations of
//!    candidate values (bounds, constants of the query and their
//!    neighbours), then widening offsets around the seed. Every candidate is
//!    verified by concrete evaluation, so a `Sat` answer is always a model.
//!
//! When every variable has a small finite domain, step 3 enumerates it
//! completely and a failed search proves `Unsat`. Otherwise the answer is
//! `Unknown`. The search checks the deadline and the cancel token before
//! every candidate.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use log::debug;
use num_bigint::BigInt;
use num_traits::ToPrimitive;

use super::interval::{propagate, Interval, Propagation};
use super::{CancelToken, Model, SolveResult, SolverAdapter, SolverQuery};
use crate::expr::SymExpr;
use crate::types::Sort;
use crate::value::Value;

/// Candidate-search solver for integer, boolean and string queries.
#[derive(Debug, Clone)]
pub struct SearchSolver {
    /// Upper bound on the number of combinations tried in the product phase.
    pub product_limit: usize,
    /// Largest offset (as a power of two) tried around the seed.
    pub max_widening_bits: u32,
}

impl Default for SearchSolver {
    fn default() -> Self {
        Self {
            product_limit: 50_000,
            max_widening_bits: 48,
        }
    }
}

impl SearchSolver {
    pub fn new() -> Self {
        Self::default()
    }
}

enum Stop {
    Found(BTreeMap<String, Value>),
    Cancelled,
    Timeout,
}

struct Search<'a> {
    assertions: &'a [SymExpr],
    deadline: Instant,
    cancel: &'a CancelToken,
    checks: usize,
}

impl Search<'_> {
    fn check(&mut self, env: &BTreeMap<String, Value>) -> Result<(), Stop> {
        if self.cancel.is_cancelled() {
            return Err(Stop::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(Stop::Timeout);
        }
        self.checks += 1;
        let holds = self.assertions.iter().all(|a| matches!(a.eval(env), Ok(Value::Bool(true))));
        if holds {
            Err(Stop::Found(env.clone()))
        } else {
            Ok(())
        }
    }
}

/// Integer and string literals mentioned by the query.
fn literals(assertions: &[SymExpr]) -> (BTreeSet<BigInt>, BTreeSet<String>) {
    let mut ints = BTreeSet::new();
    let mut strs = BTreeSet::new();
    for a in assertions {
        a.walk(&mut |e| match e {
            SymExpr::Int(n) => {
                ints.insert(n.clone());
            }
            SymExpr::Str(s) => {
                strs.insert(s.clone());
            }
            _ => {}
        });
    }
    (ints, strs)
}

fn int_candidates(interval: &Interval, seed: &BigInt, constants: &BTreeSet<BigInt>) -> Vec<BigInt> {
    let mut raw: Vec<BigInt> = vec![seed.clone()];
    raw.extend(interval.lo.iter().flat_map(|lo| [lo.clone(), lo + 1]));
    raw.extend(interval.hi.iter().flat_map(|hi| [hi.clone(), hi - 1]));
    for c in constants {
        raw.extend([c.clone(), c + 1, c - 1, -c]);
    }
    raw.extend([BigInt::from(0), BigInt::from(1), BigInt::from(-1)]);

    let mut out = Vec::new();
    let mut seen = BTreeSet::new();
    for v in raw {
        if let Some(v) = interval.pick(&v) {
            if seen.insert(v.clone()) {
                out.push(v);
            }
        }
    }
    out
}

fn str_candidates(seed: &str, literals: &BTreeSet<String>, constants: &BTreeSet<BigInt>) -> Vec<String> {
    let mut raw = vec![seed.to_string(), String::new(), "a".to_string()];
    for s in literals {
        raw.push(s.clone());
        raw.push(format!("{}a", s));
        raw.push(format!("a{}", s));
        if !s.is_empty() {
            let mut chars = s.chars();
            chars.next_back();
            raw.push(chars.as_str().to_string());
        }
    }
    for c in constants {
        for n in [c - 1, c.clone(), c + 1] {
            if let Some(n) = n.to_usize().filter(|&n| n <= 64) {
                raw.push("a".repeat(n));
            }
        }
    }
    let mut seen = BTreeSet::new();
    raw.into_iter().filter(|s| seen.insert(s.clone())).collect()
}

impl SearchSolver {
    fn search(
        &self,
        search: &mut Search<'_>,
        vars: &BTreeMap<String, Sort>,
        seed: &BTreeMap<String, Value>,
        domains: &[(String, Vec<Value>)],
        exhaustive: bool,
        prop: &Propagation,
    ) -> Result<(), Stop> {
        search.check(seed)?;

        // One variable at a time.
        for (name, candidates) in domains {
            let mut env = seed.clone();
            for v in candidates {
                env.insert(name.clone(), v.clone());
                search.check(&env)?;
            }
        }

        // Combinations, odometer order.
        let mut indices = vec![0usize; domains.len()];
        let mut tried = 0usize;
        'product: loop {
            if tried >= self.product_limit && !exhaustive {
                break;
            }
            let env: BTreeMap<String, Value> = domains
                .iter()
                .zip(&indices)
                .map(|((name, values), &i)| (name.clone(), values[i].clone()))
                .collect();
            search.check(&env)?;
            tried += 1;

            let mut k = 0;
            loop {
                if k == indices.len() {
                    break 'product;
                }
                indices[k] += 1;
                if indices[k] < domains[k].1.len() {
                    break;
                }
                indices[k] = 0;
                k += 1;
            }
        }
        if exhaustive {
            return Ok(());
        }

        // Widening offsets around the seed.
        let ints: Vec<&String> = vars.iter().filter(|(_, s)| **s == Sort::Int).map(|(n, _)| n).collect();
        for bits in 1..=self.max_widening_bits {
            let offset = BigInt::from(1) << bits;
            for sign in [1, -1] {
                let mut joint = seed.clone();
                for name in &ints {
                    let Some(Value::Int(base)) = seed.get(*name) else {
                        continue;
                    };
                    let Some(v) = prop.interval(name).pick(&(base + &offset * sign)) else {
                        continue;
                    };
                    let mut env = seed.clone();
                    env.insert((*name).clone(), Value::Int(v.clone()));
                    search.check(&env)?;
                    joint.insert((*name).clone(), Value::Int(v));
                }
                search.check(&joint)?;
            }
        }
        Ok(())
    }
}

impl SolverAdapter for SearchSolver {
    fn name(&self) -> &str {
        "search"
    }

    fn solve(&self, query: &SolverQuery, cancel: &CancelToken) -> SolveResult {
        let start = Instant::now();
        let assertions = query.assertions();
        let vars = query.variables();

        let prop = propagate(&assertions);
        if prop.infeasible {
            debug!("{}: domains empty after propagation", query.constraint);
            return SolveResult::Unsat;
        }

        let (int_lits, str_lits) = literals(&assertions);
        let mut seed = BTreeMap::new();
        let mut domains = Vec::new();
        let mut finite = true;
        let mut size = 1usize;
        for (name, sort) in &vars {
            let hinted = query
                .hint
                .as_ref()
                .and_then(|h| h.get(name))
                .filter(|v| v.sort() == Some(*sort))
                .cloned()
                .unwrap_or_else(|| Value::default_for(*sort));
            let candidates: Vec<Value> = match (sort, &hinted) {
                (Sort::Int, Value::Int(h)) => {
                    let interval = prop.interval(name);
                    match interval.values(64) {
                        Some(all) => {
                            size = size.saturating_mul(all.len());
                            all.into_iter().map(Value::Int).collect()
                        }
                        None => {
                            finite = false;
                            int_candidates(&interval, h, &int_lits).into_iter().map(Value::Int).collect()
                        }
                    }
                }
                (Sort::Bool, _) => match prop.bools.get(name) {
                    Some(&b) => vec![Value::Bool(b)],
                    None => {
                        size = size.saturating_mul(2);
                        vec![hinted.clone(), Value::Bool(hinted.as_bool() != Some(true))]
                    }
                },
                (Sort::Str, Value::Str(h)) => {
                    finite = false;
                    str_candidates(h, &str_lits, &int_lits).into_iter().map(Value::Str).collect()
                }
                _ => vec![hinted.clone()],
            };
            let Some(first) = candidates.first().cloned() else {
                return if finite {
                    SolveResult::Unsat
                } else {
                    SolveResult::Unknown(format!("no candidates for `{}`", name))
                };
            };
            seed.insert(name.clone(), first);
            domains.push((name.clone(), candidates));
        }
        let exhaustive = finite && size <= self.product_limit;

        let mut search = Search {
            assertions: &assertions,
            deadline: query.deadline_from(start),
            cancel,
            checks: 0,
        };
        let outcome = self.search(&mut search, &vars, &seed, &domains, exhaustive, &prop);
        debug!("{}: {} candidates checked in {:?}", query.constraint, search.checks, start.elapsed());
        match outcome {
            Err(Stop::Found(values)) => SolveResult::Sat(Model::new(values)),
            Err(Stop::Cancelled) => SolveResult::Unknown("cancelled".to_string()),
            Err(Stop::Timeout) => SolveResult::Unknown("timeout".to_string()),
            Ok(()) if exhaustive => SolveResult::Unsat,
            Ok(()) => SolveResult::Unknown("search exhausted".to_string()),
        }
    }
}
