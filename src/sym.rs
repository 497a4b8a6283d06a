//! Concolic values: a concrete value paired with an optional symbolic term.
//!
//! Operations on [`Sym`] always compute the concrete result. When at least one
//! operand is symbolic, the result also carries the symbolic term of the
//! operation; purely concrete operations fold to plain values.
//!
//! Comparisons produce a boolean `Sym`. Branching on it is an explicit call
//! to [`RunContext::branch`][crate::runner::RunContext::branch], which records
//! the predicate when the condition is symbolic.
//!
//! ```
//! use concolic_rs::sym::Sym;
//! use concolic_rs::value::Value;
//!
//! let x = Sym::symbolic("x", Value::from(4)).unwrap();
//! let y = &x * 3 + 1;
//! assert_eq!(y.value(), &Value::from(13));
//! assert_eq!(y.expr().unwrap().to_string(), "((x * 3) + 1)");
//!
//! let c = y.gt(10);
//! assert_eq!(c.value(), &Value::from(true));
//! assert!(c.is_symbolic());
//! ```

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Not, Rem, Sub};

use crate::expr::{apply_binary, apply_compare, apply_unary, BinaryOp, CompareOp, EvalError, SymExpr, UnaryOp};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sym {
    value: Value,
    expr: Option<SymExpr>,
}

impl Sym {
    pub fn concrete(value: impl Into<Value>) -> Self {
        Sym {
            value: value.into(),
            expr: None,
        }
    }

    /// Creates a fresh symbolic handle named `name`, seeded with `value`.
    ///
    /// Returns `None` if the value has no symbolic sort.
    pub fn symbolic(name: impl Into<String>, value: Value) -> Option<Self> {
        let sort = value.sort()?;
        Some(Sym {
            value,
            expr: Some(SymExpr::var(name, sort)),
        })
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Symbolic term, if this value depends on a symbolic input.
    pub fn expr(&self) -> Option<&SymExpr> {
        self.expr.as_ref()
    }

    pub fn is_symbolic(&self) -> bool {
        self.expr.is_some()
    }

    /// Symbolic term, or the literal for a concrete value.
    pub fn to_expr(&self) -> Option<SymExpr> {
        match &self.expr {
            Some(e) => Some(e.clone()),
            None => SymExpr::literal(&self.value),
        }
    }

    pub fn try_unary(&self, op: UnaryOp) -> Result<Sym, EvalError> {
        let value = apply_unary(op, &self.value)?;
        let expr = self.expr.clone().map(|e| match op {
            UnaryOp::Not => e.not(),
            _ => SymExpr::unary(op, e),
        });
        Ok(Sym { value, expr })
    }

    pub fn try_binary(&self, op: BinaryOp, other: &Sym) -> Result<Sym, EvalError> {
        // `+` on strings is concatenation.
        let op = match (op, &self.value, &other.value) {
            (BinaryOp::Add, Value::Str(_), Value::Str(_)) => BinaryOp::Concat,
            _ => op,
        };
        let value = apply_binary(op, &self.value, &other.value)?;
        let expr = self.combine(other, |l, r| SymExpr::binary(op, l, r));
        Ok(Sym { value, expr })
    }

    pub fn try_compare(&self, op: CompareOp, other: &Sym) -> Result<Sym, EvalError> {
        let value = apply_compare(op, &self.value, &other.value)?;
        let expr = self.combine(other, |l, r| SymExpr::compare(op, l, r));
        Ok(Sym { value, expr })
    }

    fn combine(&self, other: &Sym, f: impl FnOnce(SymExpr, SymExpr) -> SymExpr) -> Option<SymExpr> {
        if !self.is_symbolic() && !other.is_symbolic() {
            return None;
        }
        Some(f(self.to_expr()?, other.to_expr()?))
    }

    #[track_caller]
    fn compare_or_panic(&self, op: CompareOp, other: Sym) -> Sym {
        match self.try_compare(op, &other) {
            Ok(s) => s,
            Err(e) => panic!("{}", e),
        }
    }

    #[track_caller]
    pub fn lt(&self, other: impl Into<Sym>) -> Sym {
        self.compare_or_panic(CompareOp::Lt, other.into())
    }

    #[track_caller]
    pub fn le(&self, other: impl Into<Sym>) -> Sym {
        self.compare_or_panic(CompareOp::Le, other.into())
    }

    #[track_caller]
    pub fn gt(&self, other: impl Into<Sym>) -> Sym {
        self.compare_or_panic(CompareOp::Gt, other.into())
    }

    #[track_caller]
    pub fn ge(&self, other: impl Into<Sym>) -> Sym {
        self.compare_or_panic(CompareOp::Ge, other.into())
    }

    #[track_caller]
    pub fn equals(&self, other: impl Into<Sym>) -> Sym {
        self.compare_or_panic(CompareOp::Eq, other.into())
    }

    #[track_caller]
    pub fn not_equals(&self, other: impl Into<Sym>) -> Sym {
        self.compare_or_panic(CompareOp::Ne, other.into())
    }

    /// Length of a string value.
    #[track_caller]
    pub fn len(&self) -> Sym {
        match self.try_unary(UnaryOp::Len) {
            Ok(s) => s,
            Err(e) => panic!("{}", e),
        }
    }

    /// Boolean view of this value for use as a branch condition.
    ///
    /// Integers test `!= 0`, strings test `len != 0`.
    pub fn truthy(&self) -> Sym {
        let Some(expr) = &self.expr else {
            return Sym::concrete(self.value.truthy());
        };
        let cond = match &self.value {
            Value::Bool(_) => expr.clone(),
            Value::Int(_) => SymExpr::compare(CompareOp::Ne, expr.clone(), SymExpr::int(0)),
            Value::Str(_) => SymExpr::compare(CompareOp::Ne, SymExpr::unary(UnaryOp::Len, expr.clone()), SymExpr::int(0)),
            Value::Unit => return Sym::concrete(false),
        };
        Sym {
            value: Value::Bool(self.value.truthy()),
            expr: Some(cond),
        }
    }
}

impl fmt::Display for Sym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.expr {
            Some(e) => write!(f, "{} [{}]", self.value, e),
            None => write!(f, "{}", self.value),
        }
    }
}

impl From<Value> for Sym {
    fn from(value: Value) -> Self {
        Sym::concrete(value)
    }
}

impl From<&Sym> for Sym {
    fn from(s: &Sym) -> Self {
        s.clone()
    }
}

impl From<i64> for Sym {
    fn from(n: i64) -> Self {
        Sym::concrete(n)
    }
}

impl From<i32> for Sym {
    fn from(n: i32) -> Self {
        Sym::concrete(n)
    }
}

impl From<bool> for Sym {
    fn from(b: bool) -> Self {
        Sym::concrete(b)
    }
}

impl From<&str> for Sym {
    fn from(s: &str) -> Self {
        Sym::concrete(s)
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl $trait<&Sym> for &Sym {
            type Output = Sym;

            #[track_caller]
            fn $method(self, rhs: &Sym) -> Sym {
                match self.try_binary($op, rhs) {
                    Ok(s) => s,
                    Err(e) => panic!("{}", e),
                }
            }
        }

        impl $trait<Sym> for Sym {
            type Output = Sym;

            #[track_caller]
            fn $method(self, rhs: Sym) -> Sym {
                (&self).$method(&rhs)
            }
        }

        impl $trait<i64> for &Sym {
            type Output = Sym;

            #[track_caller]
            fn $method(self, rhs: i64) -> Sym {
                self.$method(&Sym::from(rhs))
            }
        }

        impl $trait<i64> for Sym {
            type Output = Sym;

            #[track_caller]
            fn $method(self, rhs: i64) -> Sym {
                (&self).$method(&Sym::from(rhs))
            }
        }
    };
}

impl_binary_op!(Add, add, BinaryOp::Add);
impl_binary_op!(Sub, sub, BinaryOp::Sub);
impl_binary_op!(Mul, mul, BinaryOp::Mul);
impl_binary_op!(Div, div, BinaryOp::Div);
impl_binary_op!(Rem, rem, BinaryOp::Rem);

impl Neg for &Sym {
    type Output = Sym;

    #[track_caller]
    fn neg(self) -> Sym {
        match self.try_unary(UnaryOp::Neg) {
            Ok(s) => s,
            Err(e) => panic!("{}", e),
        }
    }
}

impl Neg for Sym {
    type Output = Sym;

    #[track_caller]
    fn neg(self) -> Sym {
        -&self
    }
}

impl Not for &Sym {
    type Output = Sym;

    fn not(self) -> Sym {
        let t = self.truthy();
        Sym {
            value: Value::Bool(!t.value.truthy()),
            expr: t.expr.map(SymExpr::not),
        }
    }
}

impl Not for Sym {
    type Output = Sym;

    fn not(self) -> Sym {
        !&self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    fn x(n: i64) -> Sym {
        Sym::symbolic("x", Value::from(n)).unwrap()
    }

    #[test]
    fn test_concrete_ops_fold() {
        let a = Sym::concrete(6);
        let b = &a * 7;
        assert_eq!(b.value(), &Value::from(42));
        assert!(!b.is_symbolic());
        assert!(!b.gt(3).is_symbolic());
    }

    #[test]
    fn test_symbolic_ops_track_expression() {
        let y = x(5) - 2;
        assert_eq!(y.value(), &Value::from(3));
        assert_eq!(y.expr().unwrap().to_string(), "(x - 2)");
        let c = y.le(0);
        assert_eq!(c.value(), &Value::from(false));
        assert_eq!(c.expr().unwrap().to_string(), "((x - 2) <= 0)");
    }

    #[test]
    fn test_string_plus_is_concat() {
        let s = Sym::symbolic("s", Value::from("ab")).unwrap();
        let t = s.try_binary(BinaryOp::Add, &Sym::from("c")).unwrap();
        assert_eq!(t.value(), &Value::from("abc"));
        assert_eq!(t.expr().unwrap().sort(), crate::types::Sort::Str);
    }

    #[test]
    fn test_truthy() {
        let t = x(0).truthy();
        assert_eq!(t.value(), &Value::from(false));
        assert_eq!(t.expr().unwrap().to_string(), "(x != 0)");
        let n = !x(3);
        assert_eq!(n.value(), &Value::from(false));
        assert_eq!(n.expr().unwrap().to_string(), "(x == 0)");
    }

    #[test]
    fn test_type_error() {
        let r = x(1).try_compare(CompareOp::Lt, &Sym::from("a"));
        assert!(matches!(r, Err(EvalError::TypeMismatch { .. })));
    }

    #[test]
    #[should_panic(expected = "division by zero")]
    fn test_division_by_zero_panics() {
        let _ = x(1) / 0;
    }

    #[test]
    fn test_unit_has_no_symbolic_handle() {
        assert!(Sym::symbolic("u", Value::Unit).is_none());
    }
}
