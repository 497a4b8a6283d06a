//! SMT-LIB2 printing and response parsing.
//!
//! Integer division and remainder map to `div`/`mod`, which are Euclidean
//! like their concrete counterparts. Symbols are always `|quoted|`.

use std::collections::BTreeMap;
use std::fmt::Write;

use num_bigint::BigInt;
use num_traits::Signed;

use super::process::ProcessSolverError;
use super::{Model, SolveResult, SolverQuery};
use crate::expr::{BinaryOp, CompareOp, SymExpr, UnaryOp};
use crate::types::Sort;
use crate::value::Value;

pub fn sort_to_smtlib(sort: Sort) -> &'static str {
    match sort {
        Sort::Int => "Int",
        Sort::Bool => "Bool",
        Sort::Str => "String",
    }
}

pub fn quote_symbol(name: &str) -> String {
    format!("|{}|", name.replace(['|', '\\'], "_"))
}

/// String literal, escaping everything outside printable ASCII.
pub fn quote_string(s: &str) -> String {
    let mut out = String::from("\"");
    for c in s.chars() {
        match c {
            '"' => out.push_str("\"\""),
            '\\' => out.push_str("\\u{5c}"),
            ' '..='~' => out.push(c),
            _ => {
                let _ = write!(out, "\\u{{{:x}}}", c as u32);
            }
        }
    }
    out.push('"');
    out
}

fn int_literal(n: &BigInt) -> String {
    if n.is_negative() {
        format!("(- {})", -n)
    } else {
        n.to_string()
    }
}

/// Prints an expression as an SMT-LIB2 term.
pub fn to_smtlib(expr: &SymExpr) -> String {
    match expr {
        SymExpr::Var(name, _) => quote_symbol(name),
        SymExpr::Int(n) => int_literal(n),
        SymExpr::Bool(b) => b.to_string(),
        SymExpr::Str(s) => quote_string(s),
        SymExpr::Unary(op, e) => {
            let op = match op {
                UnaryOp::Neg => "-",
                UnaryOp::Not => "not",
                UnaryOp::Len => "str.len",
            };
            format!("({} {})", op, to_smtlib(e))
        }
        SymExpr::Binary(op, l, r) => {
            let op = match op {
                BinaryOp::Add => "+",
                BinaryOp::Sub => "-",
                BinaryOp::Mul => "*",
                BinaryOp::Div => "div",
                BinaryOp::Rem => "mod",
                BinaryOp::Concat => "str.++",
                BinaryOp::And => "and",
                BinaryOp::Or => "or",
            };
            format!("({} {} {})", op, to_smtlib(l), to_smtlib(r))
        }
        SymExpr::Compare(CompareOp::Ne, l, r) => format!("(not (= {} {}))", to_smtlib(l), to_smtlib(r)),
        SymExpr::Compare(op, l, r) => {
            let op = match op {
                CompareOp::Lt => "<",
                CompareOp::Le => "<=",
                CompareOp::Gt => ">",
                CompareOp::Ge => ">=",
                _ => "=",
            };
            format!("({} {} {})", op, to_smtlib(l), to_smtlib(r))
        }
    }
}

/// Complete script for one query: declarations, assertions, `check-sat`
/// and, if there are variables, `get-value`.
pub fn query_script(query: &SolverQuery) -> String {
    let vars = query.variables();
    let mut script = String::new();
    script.push_str("(set-option :produce-models true)\n");
    script.push_str("(set-logic ALL)\n");
    for (name, sort) in &vars {
        let _ = writeln!(script, "(declare-const {} {})", quote_symbol(name), sort_to_smtlib(*sort));
    }
    for a in query.assertions() {
        let _ = writeln!(script, "(assert {})", to_smtlib(&a));
    }
    script.push_str("(check-sat)\n");
    if !vars.is_empty() {
        let names: Vec<String> = vars.keys().map(|n| quote_symbol(n)).collect();
        let _ = writeln!(script, "(get-value ({}))", names.join(" "));
    }
    script.push_str("(exit)\n");
    script
}

/// S-expression read back from a solver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SExpr {
    Atom(String),
    Str(String),
    List(Vec<SExpr>),
}

fn unescape_string(raw: &str) -> String {
    let mut out = String::new();
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek() == Some(&'u') {
            let rest: String = chars.clone().skip(1).take_while(|&c| c != '}').collect();
            if let Some(hex) = rest.strip_prefix('{') {
                if let Some(ch) = u32::from_str_radix(hex, 16).ok().and_then(char::from_u32) {
                    out.push(ch);
                    // Skip "u{", the digits and "}".
                    for _ in 0..rest.len() + 2 {
                        chars.next();
                    }
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

/// Parses all s-expressions in `text`.
pub fn parse_sexprs(text: &str) -> Result<Vec<SExpr>, ProcessSolverError> {
    let mut stack: Vec<Vec<SExpr>> = vec![Vec::new()];
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '(' => stack.push(Vec::new()),
            ')' => {
                let list = stack.pop().ok_or_else(|| ProcessSolverError::Parse("unbalanced `)`".to_string()))?;
                match stack.last_mut() {
                    Some(parent) => parent.push(SExpr::List(list)),
                    None => return Err(ProcessSolverError::Parse("unbalanced `)`".to_string())),
                }
            }
            '"' => {
                let mut raw = String::new();
                loop {
                    match chars.next() {
                        Some('"') if chars.peek() == Some(&'"') => {
                            chars.next();
                            raw.push('"');
                        }
                        Some('"') => break,
                        Some(c) => raw.push(c),
                        None => return Err(ProcessSolverError::Parse("unterminated string".to_string())),
                    }
                }
                push_top(&mut stack, SExpr::Str(unescape_string(&raw)))?;
            }
            '|' => {
                let mut sym = String::new();
                loop {
                    match chars.next() {
                        Some('|') => break,
                        Some(c) => sym.push(c),
                        None => return Err(ProcessSolverError::Parse("unterminated symbol".to_string())),
                    }
                }
                push_top(&mut stack, SExpr::Atom(sym))?;
            }
            ';' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            c if c.is_whitespace() => {}
            c => {
                let mut atom = String::from(c);
                while let Some(&n) = chars.peek() {
                    if n.is_whitespace() || n == '(' || n == ')' || n == '"' || n == '|' {
                        break;
                    }
                    atom.push(n);
                    chars.next();
                }
                push_top(&mut stack, SExpr::Atom(atom))?;
            }
        }
    }
    if stack.len() != 1 {
        return Err(ProcessSolverError::Parse("unbalanced `(`".to_string()));
    }
    Ok(stack.pop().unwrap_or_default())
}

fn push_top(stack: &mut [Vec<SExpr>], e: SExpr) -> Result<(), ProcessSolverError> {
    match stack.last_mut() {
        Some(top) => {
            top.push(e);
            Ok(())
        }
        None => Err(ProcessSolverError::Parse("unbalanced expression".to_string())),
    }
}

fn parse_value(e: &SExpr, sort: Sort) -> Option<Value> {
    match (sort, e) {
        (Sort::Int, SExpr::Atom(a)) => a.parse::<BigInt>().ok().map(Value::Int),
        (Sort::Int, SExpr::List(items)) => match items.as_slice() {
            [SExpr::Atom(minus), SExpr::Atom(n)] if minus == "-" => n.parse::<BigInt>().ok().map(|n| Value::Int(-n)),
            _ => None,
        },
        (Sort::Bool, SExpr::Atom(a)) => match a.as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        (Sort::Str, SExpr::Str(s)) => Some(Value::Str(s.clone())),
        _ => None,
    }
}

/// Interprets the output of [`query_script`].
pub fn parse_response(text: &str, vars: &BTreeMap<String, Sort>) -> Result<SolveResult, ProcessSolverError> {
    let exprs = parse_sexprs(text)?;
    let mut iter = exprs.iter();
    let status = match iter.next() {
        Some(SExpr::Atom(a)) => a.as_str(),
        Some(SExpr::List(items)) => {
            if let [SExpr::Atom(head), SExpr::Str(msg)] = items.as_slice() {
                if head == "error" {
                    return Err(ProcessSolverError::Solver(msg.clone()));
                }
            }
            return Err(ProcessSolverError::Parse(format!("unexpected response: {}", text.trim())));
        }
        _ => return Err(ProcessSolverError::Parse(format!("unexpected response: {}", text.trim()))),
    };
    match status {
        "unsat" => return Ok(SolveResult::Unsat),
        "unknown" | "timeout" => return Ok(SolveResult::Unknown(status.to_string())),
        "sat" => {}
        other => return Err(ProcessSolverError::Parse(format!("unexpected status `{}`", other))),
    }

    let mut values = BTreeMap::new();
    if !vars.is_empty() {
        let Some(SExpr::List(pairs)) = iter.next() else {
            return Err(ProcessSolverError::Parse("missing model".to_string()));
        };
        for pair in pairs {
            let SExpr::List(kv) = pair else {
                return Err(ProcessSolverError::Parse("malformed model entry".to_string()));
            };
            let [SExpr::Atom(name), value] = kv.as_slice() else {
                return Err(ProcessSolverError::Parse("malformed model entry".to_string()));
            };
            let Some(&sort) = vars.get(name) else {
                continue;
            };
            let value = parse_value(value, sort).ok_or_else(|| ProcessSolverError::Parse(format!("cannot read value of `{}`", name)))?;
            values.insert(name.clone(), value);
        }
    }
    Ok(SolveResult::Sat(Model::new(values)))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::predicate::Predicate;
    use crate::types::NodeId;

    use test_log::test;

    fn vars(pairs: &[(&str, Sort)]) -> BTreeMap<String, Sort> {
        pairs.iter().map(|(n, s)| (n.to_string(), *s)).collect()
    }

    #[test]
    fn test_to_smtlib() {
        let x = SymExpr::var("x", Sort::Int);
        let e = SymExpr::compare(
            CompareOp::Ne,
            SymExpr::binary(BinaryOp::Rem, x.clone(), SymExpr::int(3)),
            SymExpr::int(-1),
        );
        assert_eq!(to_smtlib(&e), "(not (= (mod |x| 3) (- 1)))");
        let s = SymExpr::unary(UnaryOp::Len, SymExpr::binary(BinaryOp::Concat, SymExpr::var("s", Sort::Str), SymExpr::Str("a\"b".into())));
        assert_eq!(to_smtlib(&s), "(str.len (str.++ |s| \"a\"\"b\"))");
    }

    #[test]
    fn test_quote_string_escapes() {
        assert_eq!(quote_string("é\\"), "\"\\u{e9}\\u{5c}\"");
        assert_eq!(unescape_string("\\u{e9}x\\u{5c}"), "éx\\");
    }

    #[test]
    fn test_query_script() {
        let x = SymExpr::var("x", Sort::Int);
        let query = SolverQuery {
            constraint: NodeId::new(1),
            asserts: vec![],
            goal: Predicate::new(SymExpr::compare(CompareOp::Gt, x, SymExpr::int(10)), true),
            timeout: Duration::from_millis(100),
            hint: None,
        };
        let script = query_script(&query);
        assert!(script.contains("(declare-const |x| Int)"));
        assert!(script.contains("(assert (> |x| 10))"));
        assert!(script.contains("(get-value (|x|))"));
    }

    #[test]
    fn test_parse_sat_response() {
        let vars = vars(&[("x", Sort::Int), ("b", Sort::Bool), ("s", Sort::Str)]);
        let result = parse_response("sat\n((|x| (- 7)) (b true) (s \"a\"\"b\"))\n", &vars).unwrap();
        let model = result.model().unwrap();
        assert_eq!(model.get("x"), Some(&Value::from(-7)));
        assert_eq!(model.get("b"), Some(&Value::from(true)));
        assert_eq!(model.get("s"), Some(&Value::from("a\"b")));
    }

    #[test]
    fn test_parse_other_responses() {
        let vars = vars(&[("x", Sort::Int)]);
        assert_eq!(parse_response("unsat\n(error \"model not available\")\n", &vars).unwrap(), SolveResult::Unsat);
        assert_eq!(
            parse_response("unknown\n", &vars).unwrap(),
            SolveResult::Unknown("unknown".to_string())
        );
        assert!(matches!(
            parse_response("(error \"bad\")", &vars),
            Err(ProcessSolverError::Solver(_))
        ));
        assert!(parse_response("sat\n((x 1)", &vars).is_err());
    }
}
