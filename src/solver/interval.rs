//! Interval propagation over single-variable linear atoms.
//!
//! Handles conjuncts of the form `k*x + c op 0` (after moving everything to
//! one side) and boolean literals `b` / `!b`. Other conjuncts are ignored,
//! so an empty interval proves the whole query unsatisfiable while a
//! non-empty one only narrows the search space.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use num_bigint::BigInt;
use num_traits::{One, Signed, Zero};

use crate::expr::{euclid_div, euclid_rem, BinaryOp, CompareOp, SymExpr, UnaryOp};
use crate::types::Sort;

/// Integer interval with optional bounds and a set of excluded points.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interval {
    pub lo: Option<BigInt>,
    pub hi: Option<BigInt>,
    /// Values ruled out by `!=` atoms.
    pub excluded: BTreeSet<BigInt>,
}

impl Interval {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn point(c: BigInt) -> Self {
        Interval {
            lo: Some(c.clone()),
            hi: Some(c),
            excluded: BTreeSet::new(),
        }
    }

    fn raise_lo(&mut self, c: BigInt) {
        if self.lo.as_ref().map_or(true, |lo| c > *lo) {
            self.lo = Some(c);
        }
    }

    fn lower_hi(&mut self, c: BigInt) {
        if self.hi.as_ref().map_or(true, |hi| c < *hi) {
            self.hi = Some(c);
        }
    }

    /// Intersects with `{ x | x op c }`.
    pub fn constrain(&mut self, op: CompareOp, c: BigInt) {
        match op {
            CompareOp::Lt => self.lower_hi(c - 1),
            CompareOp::Le => self.lower_hi(c),
            CompareOp::Gt => self.raise_lo(c + 1),
            CompareOp::Ge => self.raise_lo(c),
            CompareOp::Eq => {
                self.raise_lo(c.clone());
                self.lower_hi(c);
            }
            CompareOp::Ne => {
                self.excluded.insert(c);
            }
        }
    }

    pub fn contains(&self, v: &BigInt) -> bool {
        self.lo.as_ref().map_or(true, |lo| v >= lo) && self.hi.as_ref().map_or(true, |hi| v <= hi) && !self.excluded.contains(v)
    }

    /// Number of integers between the bounds, ignoring exclusions.
    pub fn size(&self) -> Option<BigInt> {
        match (&self.lo, &self.hi) {
            (Some(lo), Some(hi)) if lo > hi => Some(BigInt::zero()),
            (Some(lo), Some(hi)) => Some(hi - lo + 1),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self.size() {
            Some(n) if n.is_zero() => true,
            Some(n) if n <= BigInt::from(self.excluded.len()) => self.values(self.excluded.len()).map_or(false, |v| v.is_empty()),
            _ => false,
        }
    }

    /// All members, if there are at most `limit` integers between the bounds.
    pub fn values(&self, limit: usize) -> Option<Vec<BigInt>> {
        let size = self.size()?;
        if size > BigInt::from(limit) {
            return None;
        }
        let (lo, hi) = (self.lo.clone()?, self.hi.clone()?);
        let mut out = Vec::new();
        let mut v = lo;
        while v <= hi {
            if !self.excluded.contains(&v) {
                out.push(v.clone());
            }
            v += 1;
        }
        Some(out)
    }

    /// The member closest to `preferred`, if one is found near it.
    pub fn pick(&self, preferred: &BigInt) -> Option<BigInt> {
        let mut v = preferred.clone();
        if let Some(lo) = &self.lo {
            if v < *lo {
                v = lo.clone();
            }
        }
        if let Some(hi) = &self.hi {
            if v > *hi {
                v = hi.clone();
            }
        }
        for step in 0..=(self.excluded.len() as i64 + 1) {
            for candidate in [&v + step, &v - step] {
                if self.contains(&candidate) {
                    return Some(candidate);
                }
            }
        }
        None
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.lo {
            Some(lo) => write!(f, "[{}", lo)?,
            None => write!(f, "(-inf")?,
        }
        match &self.hi {
            Some(hi) => write!(f, ", {}]", hi)?,
            None => write!(f, ", +inf)")?,
        }
        for e in &self.excluded {
            write!(f, " \\ {}", e)?;
        }
        Ok(())
    }
}

/// Linear combination `sum(coeff * var) + constant`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Linear {
    coeffs: BTreeMap<String, BigInt>,
    constant: BigInt,
}

impl Linear {
    fn scale(mut self, k: &BigInt) -> Self {
        for c in self.coeffs.values_mut() {
            *c *= k;
        }
        self.constant *= k;
        self
    }

    fn add(mut self, other: Linear) -> Self {
        for (name, c) in other.coeffs {
            *self.coeffs.entry(name).or_insert_with(BigInt::zero) += c;
        }
        self.constant += other.constant;
        self.coeffs.retain(|_, c| !c.is_zero());
        self
    }

    fn as_constant(&self) -> Option<&BigInt> {
        self.coeffs.is_empty().then_some(&self.constant)
    }

    fn of(expr: &SymExpr) -> Option<Linear> {
        match expr {
            SymExpr::Var(name, Sort::Int) => {
                let mut coeffs = BTreeMap::new();
                coeffs.insert(name.clone(), BigInt::one());
                Some(Linear {
                    coeffs,
                    constant: BigInt::zero(),
                })
            }
            SymExpr::Int(n) => Some(Linear {
                coeffs: BTreeMap::new(),
                constant: n.clone(),
            }),
            SymExpr::Unary(UnaryOp::Neg, e) => Some(Linear::of(e)?.scale(&BigInt::from(-1))),
            SymExpr::Binary(BinaryOp::Add, l, r) => Some(Linear::of(l)?.add(Linear::of(r)?)),
            SymExpr::Binary(BinaryOp::Sub, l, r) => Some(Linear::of(l)?.add(Linear::of(r)?.scale(&BigInt::from(-1)))),
            SymExpr::Binary(BinaryOp::Mul, l, r) => {
                let (l, r) = (Linear::of(l)?, Linear::of(r)?);
                if let Some(k) = l.as_constant() {
                    Some(r.scale(k))
                } else {
                    let k = r.as_constant()?.clone();
                    Some(l.scale(&k))
                }
            }
            _ => None,
        }
    }
}

fn floor_div(a: &BigInt, k: &BigInt) -> BigInt {
    euclid_div(a, k)
}

fn ceil_div(a: &BigInt, k: &BigInt) -> BigInt {
    -euclid_div(&-a, k)
}

/// Result of propagating a conjunction of assertions.
#[derive(Debug, Clone, Default)]
pub struct Propagation {
    pub ints: BTreeMap<String, Interval>,
    pub bools: BTreeMap<String, bool>,
    /// Some conjunct is false under every assignment.
    pub infeasible: bool,
}

impl Propagation {
    pub fn interval(&self, name: &str) -> Interval {
        self.ints.get(name).cloned().unwrap_or_default()
    }
}

/// Narrows variable domains using the atoms of `assertions` that it understands.
pub fn propagate(assertions: &[SymExpr]) -> Propagation {
    let mut p = Propagation::default();
    let mut conjuncts: Vec<&SymExpr> = assertions.iter().collect();
    while let Some(e) = conjuncts.pop() {
        match e {
            SymExpr::Binary(BinaryOp::And, l, r) => {
                conjuncts.push(l);
                conjuncts.push(r);
            }
            SymExpr::Bool(false) => p.infeasible = true,
            SymExpr::Var(name, Sort::Bool) => assign_bool(&mut p, name, true),
            SymExpr::Unary(UnaryOp::Not, inner) => {
                if let SymExpr::Var(name, Sort::Bool) = inner.as_ref() {
                    assign_bool(&mut p, name, false);
                }
            }
            SymExpr::Compare(op, l, r) => {
                if let (Some(l), Some(r)) = (Linear::of(l), Linear::of(r)) {
                    constrain_linear(&mut p, *op, l.add(r.scale(&BigInt::from(-1))));
                }
            }
            _ => {}
        }
    }
    p.infeasible = p.infeasible || p.ints.values().any(Interval::is_empty);
    p
}

fn assign_bool(p: &mut Propagation, name: &str, value: bool) {
    match p.bools.get(name) {
        Some(&v) if v != value => p.infeasible = true,
        _ => {
            p.bools.insert(name.to_string(), value);
        }
    }
}

/// Applies `lin op 0`.
fn constrain_linear(p: &mut Propagation, op: CompareOp, lin: Linear) {
    if lin.coeffs.is_empty() {
        let c = &lin.constant;
        let zero = BigInt::zero();
        let holds = match op {
            CompareOp::Lt => *c < zero,
            CompareOp::Le => *c <= zero,
            CompareOp::Gt => *c > zero,
            CompareOp::Ge => *c >= zero,
            CompareOp::Eq => c.is_zero(),
            CompareOp::Ne => !c.is_zero(),
        };
        if !holds {
            p.infeasible = true;
        }
        return;
    }
    if lin.coeffs.len() != 1 {
        return;
    }
    let Some((name, k)) = lin.coeffs.into_iter().next() else {
        return;
    };

    // k*x op d, normalized to k > 0.
    let (k, d, op) = if k.is_negative() {
        (-k, lin.constant, op.flip())
    } else {
        (k, -lin.constant, op)
    };

    let interval = p.ints.entry(name).or_default();
    match op {
        CompareOp::Lt => interval.constrain(CompareOp::Le, floor_div(&(d - 1), &k)),
        CompareOp::Le => interval.constrain(CompareOp::Le, floor_div(&d, &k)),
        CompareOp::Gt => interval.constrain(CompareOp::Ge, ceil_div(&(d + 1), &k)),
        CompareOp::Ge => interval.constrain(CompareOp::Ge, ceil_div(&d, &k)),
        CompareOp::Eq => {
            if euclid_rem(&d, &k).is_zero() {
                interval.constrain(CompareOp::Eq, floor_div(&d, &k));
            } else {
                p.infeasible = true;
            }
        }
        CompareOp::Ne => {
            if euclid_rem(&d, &k).is_zero() {
                interval.constrain(CompareOp::Ne, floor_div(&d, &k));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    fn x() -> SymExpr {
        SymExpr::var("x", Sort::Int)
    }

    fn cmp(op: CompareOp, l: SymExpr, r: SymExpr) -> SymExpr {
        SymExpr::compare(op, l, r)
    }

    #[test]
    fn test_simple_bounds() {
        let p = propagate(&[cmp(CompareOp::Gt, x(), SymExpr::int(10)), cmp(CompareOp::Le, x(), SymExpr::int(20))]);
        assert!(!p.infeasible);
        let i = p.interval("x");
        assert_eq!(i.lo, Some(BigInt::from(11)));
        assert_eq!(i.hi, Some(BigInt::from(20)));
        assert_eq!(i.to_string(), "[11, 20]");
    }

    #[test]
    fn test_contradiction() {
        let p = propagate(&[cmp(CompareOp::Gt, x(), SymExpr::int(10)), cmp(CompareOp::Le, x(), SymExpr::int(10))]);
        assert!(p.infeasible);
    }

    #[test]
    fn test_scaled_and_negated_atoms() {
        // 3*x + 1 > 10  <=>  x >= 4
        let lhs = SymExpr::binary(BinaryOp::Add, SymExpr::binary(BinaryOp::Mul, SymExpr::int(3), x()), SymExpr::int(1));
        let p = propagate(&[cmp(CompareOp::Gt, lhs, SymExpr::int(10))]);
        assert_eq!(p.interval("x").lo, Some(BigInt::from(4)));

        // 5 - x < 0  <=>  x > 5
        let lhs = SymExpr::binary(BinaryOp::Sub, SymExpr::int(5), x());
        let p = propagate(&[cmp(CompareOp::Lt, lhs, SymExpr::int(0))]);
        assert_eq!(p.interval("x").lo, Some(BigInt::from(6)));
    }

    #[test]
    fn test_equality_without_integer_solution() {
        // 2*x == 7
        let lhs = SymExpr::binary(BinaryOp::Mul, x(), SymExpr::int(2));
        let p = propagate(&[cmp(CompareOp::Eq, lhs, SymExpr::int(7))]);
        assert!(p.infeasible);
    }

    #[test]
    fn test_exclusions_empty_a_point() {
        let p = propagate(&[cmp(CompareOp::Eq, x(), SymExpr::int(3)), cmp(CompareOp::Ne, x(), SymExpr::int(3))]);
        assert!(p.infeasible);
    }

    #[test]
    fn test_bool_literals() {
        let b = SymExpr::var("b", Sort::Bool);
        let p = propagate(&[b.clone(), b.clone().not()]);
        assert!(p.infeasible);
        let p = propagate(&[b.clone().and(cmp(CompareOp::Ge, x(), SymExpr::int(0)))]);
        assert!(!p.infeasible);
        assert_eq!(p.bools.get("b"), Some(&true));
    }

    #[test]
    fn test_pick_avoids_excluded() {
        let mut i = Interval::unbounded();
        i.constrain(CompareOp::Ge, BigInt::from(0));
        i.constrain(CompareOp::Ne, BigInt::from(0));
        assert_eq!(i.pick(&BigInt::from(-5)), Some(BigInt::from(1)));
        assert_eq!(i.size(), None);
        assert!(Interval::point(BigInt::from(2)).values(10).is_some());
    }
}
