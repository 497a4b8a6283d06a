//! Concrete values flowing through a target run.

use std::fmt;

use num_bigint::BigInt;
use num_traits::Zero;

use crate::types::Sort;

/// A concrete value.
///
/// Integers are arbitrary precision so that concrete evaluation agrees with
/// the unbounded integers of the solver theories.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Int(BigInt),
    Bool(bool),
    Str(String),
    /// Result of a target that returns nothing. Has no symbolic counterpart.
    Unit,
}

impl Value {
    pub fn int(n: impl Into<BigInt>) -> Self {
        Value::Int(n.into())
    }

    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    /// The sort a symbolic handle for this value would have, if any.
    pub fn sort(&self) -> Option<Sort> {
        match self {
            Value::Int(_) => Some(Sort::Int),
            Value::Bool(_) => Some(Sort::Bool),
            Value::Str(_) => Some(Sort::Str),
            Value::Unit => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
            Value::Str(_) => "str",
            Value::Unit => "unit",
        }
    }

    /// Default seed for a fresh symbolic handle of the given sort.
    pub fn default_for(sort: Sort) -> Self {
        match sort {
            Sort::Int => Value::Int(BigInt::zero()),
            Sort::Bool => Value::Bool(false),
            Sort::Str => Value::Str(String::new()),
        }
    }

    pub fn as_int(&self) -> Option<&BigInt> {
        match self {
            Value::Int(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Truthiness used when a non-boolean value is used as a condition.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Int(n) => !n.is_zero(),
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty(),
            Value::Unit => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Str(s) => write!(f, "\"{}\"", s.escape_debug()),
            Value::Unit => write!(f, "()"),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n.into())
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<BigInt> for Value {
    fn from(n: BigInt) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    #[test]
    fn test_sort_of_values() {
        assert_eq!(Value::from(3).sort(), Some(Sort::Int));
        assert_eq!(Value::from(true).sort(), Some(Sort::Bool));
        assert_eq!(Value::from("a").sort(), Some(Sort::Str));
        assert_eq!(Value::Unit.sort(), None);
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::from(0).truthy());
        assert!(Value::from(-2).truthy());
        assert!(!Value::from("").truthy());
        assert!(Value::from("x").truthy());
        assert!(!Value::Unit.truthy());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::from(-12).to_string(), "-12");
        assert_eq!(Value::from("a\"b").to_string(), "\"a\\\"b\"");
        assert_eq!(Value::Unit.to_string(), "()");
    }

    #[test]
    fn test_default_for_sort() {
        assert_eq!(Value::default_for(Sort::Int), Value::from(0));
        assert_eq!(Value::default_for(Sort::Str), Value::from(""));
        assert_eq!(Value::default_for(Sort::Bool), Value::from(false));
    }
}
