//! Symbolic expressions over integers, booleans and strings.
//!
//! A [`SymExpr`] is the symbolic half of a [`Sym`][crate::sym::Sym]: the
//! term that a branch condition denotes in terms of the symbolic inputs.
//! The same operator semantics are used for concrete evaluation here and
//! for the SMT-LIB encoding in [`solver::smtlib`][crate::solver::smtlib], so
//! division and remainder are Euclidean (the remainder is never negative).

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use thiserror::Error;

use crate::types::Sort;
use crate::value::Value;

/// Errors raised while evaluating an operator on concrete values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("unsupported operand types for `{op}`: {lhs} and {rhs}")]
    TypeMismatch { op: String, lhs: &'static str, rhs: &'static str },
    #[error("unsupported operand type for `{op}`: {operand}")]
    BadOperand { op: String, operand: &'static str },
    #[error("division by zero")]
    DivisionByZero,
    #[error("unbound variable `{0}`")]
    UnboundVariable(String),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
    Len,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Neg => write!(f, "-"),
            UnaryOp::Not => write!(f, "!"),
            UnaryOp::Len => write!(f, "len"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Concat,
    And,
    Or,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::Add => write!(f, "+"),
            BinaryOp::Sub => write!(f, "-"),
            BinaryOp::Mul => write!(f, "*"),
            BinaryOp::Div => write!(f, "/"),
            BinaryOp::Rem => write!(f, "%"),
            BinaryOp::Concat => write!(f, "++"),
            BinaryOp::And => write!(f, "&&"),
            BinaryOp::Or => write!(f, "||"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CompareOp {
    /// Returns the negation of this operator.
    pub fn negate(self) -> Self {
        match self {
            CompareOp::Lt => CompareOp::Ge,
            CompareOp::Le => CompareOp::Gt,
            CompareOp::Gt => CompareOp::Le,
            CompareOp::Ge => CompareOp::Lt,
            CompareOp::Eq => CompareOp::Ne,
            CompareOp::Ne => CompareOp::Eq,
        }
    }

    /// Returns the operator with swapped operands: `a op b` iff `b op.flip() a`.
    pub fn flip(self) -> Self {
        match self {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
            CompareOp::Eq => CompareOp::Eq,
            CompareOp::Ne => CompareOp::Ne,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareOp::Lt => write!(f, "<"),
            CompareOp::Le => write!(f, "<="),
            CompareOp::Gt => write!(f, ">"),
            CompareOp::Ge => write!(f, ">="),
            CompareOp::Eq => write!(f, "=="),
            CompareOp::Ne => write!(f, "!="),
        }
    }
}

/// A symbolic term.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SymExpr {
    /// Symbolic input, by parameter name.
    Var(String, Sort),
    Int(BigInt),
    Bool(bool),
    Str(String),
    Unary(UnaryOp, Box<SymExpr>),
    Binary(BinaryOp, Box<SymExpr>, Box<SymExpr>),
    Compare(CompareOp, Box<SymExpr>, Box<SymExpr>),
}

/// Lookup of concrete values for symbolic variables.
pub trait Bindings {
    fn value_of(&self, name: &str) -> Option<&Value>;
}

impl Bindings for BTreeMap<String, Value> {
    fn value_of(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

impl Bindings for HashMap<String, Value> {
    fn value_of(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

#[allow(clippy::should_implement_trait)]
impl SymExpr {
    pub fn var(name: impl Into<String>, sort: Sort) -> Self {
        SymExpr::Var(name.into(), sort)
    }

    pub fn int(n: impl Into<BigInt>) -> Self {
        SymExpr::Int(n.into())
    }

    /// Literal expression for a concrete value; `None` for [`Value::Unit`].
    pub fn literal(value: &Value) -> Option<Self> {
        match value {
            Value::Int(n) => Some(SymExpr::Int(n.clone())),
            Value::Bool(b) => Some(SymExpr::Bool(*b)),
            Value::Str(s) => Some(SymExpr::Str(s.clone())),
            Value::Unit => None,
        }
    }

    pub fn unary(op: UnaryOp, e: SymExpr) -> Self {
        SymExpr::Unary(op, Box::new(e))
    }

    pub fn binary(op: BinaryOp, lhs: SymExpr, rhs: SymExpr) -> Self {
        SymExpr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn compare(op: CompareOp, lhs: SymExpr, rhs: SymExpr) -> Self {
        SymExpr::Compare(op, Box::new(lhs), Box::new(rhs))
    }

    /// Logical negation, folding double negations and comparison operators.
    pub fn not(self) -> Self {
        match self {
            SymExpr::Bool(b) => SymExpr::Bool(!b),
            SymExpr::Unary(UnaryOp::Not, inner) => *inner,
            SymExpr::Compare(op, l, r) => SymExpr::Compare(op.negate(), l, r),
            other => SymExpr::Unary(UnaryOp::Not, Box::new(other)),
        }
    }

    pub fn and(self, other: SymExpr) -> Self {
        SymExpr::binary(BinaryOp::And, self, other)
    }

    pub fn or(self, other: SymExpr) -> Self {
        SymExpr::binary(BinaryOp::Or, self, other)
    }

    pub fn sort(&self) -> Sort {
        match self {
            SymExpr::Var(_, sort) => *sort,
            SymExpr::Int(_) => Sort::Int,
            SymExpr::Bool(_) => Sort::Bool,
            SymExpr::Str(_) => Sort::Str,
            SymExpr::Unary(UnaryOp::Neg | UnaryOp::Len, _) => Sort::Int,
            SymExpr::Unary(UnaryOp::Not, _) => Sort::Bool,
            SymExpr::Binary(op, _, _) => match op {
                BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => Sort::Int,
                BinaryOp::Concat => Sort::Str,
                BinaryOp::And | BinaryOp::Or => Sort::Bool,
            },
            SymExpr::Compare(..) => Sort::Bool,
        }
    }

    /// Visits this expression and all of its subexpressions, parents first.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a SymExpr)) {
        f(self);
        match self {
            SymExpr::Unary(_, e) => e.walk(f),
            SymExpr::Binary(_, l, r) | SymExpr::Compare(_, l, r) => {
                l.walk(f);
                r.walk(f);
            }
            _ => {}
        }
    }

    /// Collects the symbolic variables mentioned in this expression.
    pub fn collect_variables(&self, out: &mut BTreeMap<String, Sort>) {
        self.walk(&mut |e| {
            if let SymExpr::Var(name, sort) = e {
                out.insert(name.clone(), *sort);
            }
        });
    }

    pub fn variables(&self) -> BTreeMap<String, Sort> {
        let mut vars = BTreeMap::new();
        self.collect_variables(&mut vars);
        vars
    }

    /// Evaluates the expression under the given variable bindings.
    pub fn eval(&self, env: &impl Bindings) -> Result<Value, EvalError> {
        match self {
            SymExpr::Var(name, _) => env
                .value_of(name)
                .cloned()
                .ok_or_else(|| EvalError::UnboundVariable(name.clone())),
            SymExpr::Int(n) => Ok(Value::Int(n.clone())),
            SymExpr::Bool(b) => Ok(Value::Bool(*b)),
            SymExpr::Str(s) => Ok(Value::Str(s.clone())),
            SymExpr::Unary(op, e) => apply_unary(*op, &e.eval(env)?),
            SymExpr::Binary(op, l, r) => apply_binary(*op, &l.eval(env)?, &r.eval(env)?),
            SymExpr::Compare(op, l, r) => apply_compare(*op, &l.eval(env)?, &r.eval(env)?),
        }
    }
}

impl fmt::Display for SymExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymExpr::Var(name, _) => write!(f, "{}", name),
            SymExpr::Int(n) => write!(f, "{}", n),
            SymExpr::Bool(b) => write!(f, "{}", b),
            SymExpr::Str(s) => write!(f, "\"{}\"", s.escape_debug()),
            SymExpr::Unary(UnaryOp::Len, e) => write!(f, "len({})", e),
            SymExpr::Unary(op, e) => write!(f, "{}{}", op, e),
            SymExpr::Binary(op, l, r) => write!(f, "({} {} {})", l, op, r),
            SymExpr::Compare(op, l, r) => write!(f, "({} {} {})", l, op, r),
        }
    }
}

pub(crate) fn euclid_div(a: &BigInt, b: &BigInt) -> BigInt {
    let q = a / b;
    let r = a % b;
    if r.is_negative() {
        if b.is_positive() {
            q - 1
        } else {
            q + 1
        }
    } else {
        q
    }
}

pub(crate) fn euclid_rem(a: &BigInt, b: &BigInt) -> BigInt {
    let r = a % b;
    if r.is_negative() {
        r + b.abs()
    } else {
        r
    }
}

pub(crate) fn apply_unary(op: UnaryOp, v: &Value) -> Result<Value, EvalError> {
    match (op, v) {
        (UnaryOp::Neg, Value::Int(n)) => Ok(Value::Int(-n)),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Len, Value::Str(s)) => Ok(Value::Int(BigInt::from(s.chars().count()))),
        (op, v) => Err(EvalError::BadOperand {
            op: op.to_string(),
            operand: v.type_name(),
        }),
    }
}

pub(crate) fn apply_binary(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, EvalError> {
    match (op, l, r) {
        (BinaryOp::Add, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
        (BinaryOp::Sub, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a - b)),
        (BinaryOp::Mul, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a * b)),
        (BinaryOp::Div | BinaryOp::Rem, Value::Int(_), Value::Int(b)) if b.is_zero() => Err(EvalError::DivisionByZero),
        (BinaryOp::Div, Value::Int(a), Value::Int(b)) => Ok(Value::Int(euclid_div(a, b))),
        (BinaryOp::Rem, Value::Int(a), Value::Int(b)) => Ok(Value::Int(euclid_rem(a, b))),
        (BinaryOp::Concat, Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
        (BinaryOp::And, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a && *b)),
        (BinaryOp::Or, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a || *b)),
        (op, l, r) => Err(EvalError::TypeMismatch {
            op: op.to_string(),
            lhs: l.type_name(),
            rhs: r.type_name(),
        }),
    }
}

pub(crate) fn apply_compare(op: CompareOp, l: &Value, r: &Value) -> Result<Value, EvalError> {
    let mismatch = || EvalError::TypeMismatch {
        op: op.to_string(),
        lhs: l.type_name(),
        rhs: r.type_name(),
    };
    let result = match op {
        CompareOp::Eq | CompareOp::Ne => {
            if l.sort().is_none() || l.sort() != r.sort() {
                return Err(mismatch());
            }
            (l == r) == (op == CompareOp::Eq)
        }
        _ => {
            let (Value::Int(a), Value::Int(b)) = (l, r) else {
                return Err(mismatch());
            };
            match op {
                CompareOp::Lt => a < b,
                CompareOp::Le => a <= b,
                CompareOp::Gt => a > b,
                CompareOp::Ge => a >= b,
                CompareOp::Eq | CompareOp::Ne => unreachable!(),
            }
        }
    };
    Ok(Value::Bool(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    fn env(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_eval_arithmetic() {
        let x = SymExpr::var("x", Sort::Int);
        let e = SymExpr::binary(BinaryOp::Add, SymExpr::binary(BinaryOp::Mul, x.clone(), SymExpr::int(2)), SymExpr::int(1));
        assert_eq!(e.eval(&env(&[("x", Value::from(5))])), Ok(Value::from(11)));
        assert_eq!(e.to_string(), "((x * 2) + 1)");
    }

    #[test]
    fn test_euclidean_division() {
        let a = BigInt::from(-7);
        let b = BigInt::from(2);
        assert_eq!(euclid_div(&a, &b), BigInt::from(-4));
        assert_eq!(euclid_rem(&a, &b), BigInt::from(1));
        assert_eq!(euclid_div(&a, &BigInt::from(-2)), BigInt::from(4));
        assert_eq!(euclid_rem(&a, &BigInt::from(-2)), BigInt::from(1));
        assert_eq!(euclid_div(&BigInt::from(7), &b), BigInt::from(3));
    }

    #[test]
    fn test_division_by_zero() {
        let e = SymExpr::binary(BinaryOp::Div, SymExpr::var("x", Sort::Int), SymExpr::int(0));
        assert_eq!(e.eval(&env(&[("x", Value::from(1))])), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn test_unbound_variable() {
        let e = SymExpr::var("y", Sort::Int);
        assert_eq!(e.eval(&env(&[])), Err(EvalError::UnboundVariable("y".to_string())));
    }

    #[test]
    fn test_compare_type_mismatch() {
        let r = apply_compare(CompareOp::Lt, &Value::from("a"), &Value::from(1));
        assert!(matches!(r, Err(EvalError::TypeMismatch { .. })));
        let r = apply_compare(CompareOp::Eq, &Value::from("a"), &Value::from("a"));
        assert_eq!(r, Ok(Value::Bool(true)));
    }

    #[test]
    fn test_not_folds_comparisons() {
        let gt = SymExpr::compare(CompareOp::Gt, SymExpr::var("x", Sort::Int), SymExpr::int(10));
        assert_eq!(gt.clone().not().to_string(), "(x <= 10)");
        assert_eq!(gt.clone().not().not(), gt);
        let b = SymExpr::var("b", Sort::Bool);
        assert_eq!(b.clone().not().not(), b);
    }

    #[test]
    fn test_string_ops() {
        let s = SymExpr::var("s", Sort::Str);
        let e = SymExpr::unary(UnaryOp::Len, SymExpr::binary(BinaryOp::Concat, s, SymExpr::Str("ab".into())));
        assert_eq!(e.sort(), Sort::Int);
        assert_eq!(e.eval(&env(&[("s", Value::from("xyz"))])), Ok(Value::from(5)));
    }

    #[test]
    fn test_variables() {
        let e = SymExpr::var("x", Sort::Int).and(SymExpr::var("s", Sort::Str));
        let vars = e.variables();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars["s"], Sort::Str);
    }
}
