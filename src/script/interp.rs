//! Tree-walking interpreter over [`Sym`] values.
//!
//! Every condition goes through [`RunContext::branch_at`] with a
//! `module:line` label, so symbolic branches are recorded in the order they
//! execute. `&&` and `||` branch on their left operand. Faults carry the
//! line of the statement that raised them.

use std::collections::HashMap;

use crate::binding::Arguments;
use crate::expr::{EvalError, UnaryOp};
use crate::runner::{Fault, RunContext};
use crate::sym::Sym;
use crate::value::Value;

use super::ast::{Expr, Function, Module, Stmt, StmtKind};

/// Nested calls allowed before the run faults.
pub const MAX_CALL_DEPTH: usize = 64;

type Env = HashMap<String, Sym>;

enum Flow {
    Next,
    Return(Sym),
}

pub struct Interpreter<'m, 'c, 'a> {
    module: &'m Module,
    label: &'m str,
    ctx: &'c mut RunContext<'a>,
    steps: usize,
    step_limit: usize,
    depth: usize,
}

impl<'m, 'c, 'a> Interpreter<'m, 'c, 'a> {
    pub fn new(module: &'m Module, label: &'m str, ctx: &'c mut RunContext<'a>, step_limit: usize) -> Self {
        Interpreter {
            module,
            label,
            ctx,
            steps: 0,
            step_limit,
            depth: 0,
        }
    }

    /// Statements and loop iterations executed so far.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Calls `entry` with the run's arguments bound to its parameters.
    pub fn run(&mut self, entry: &str, args: &Arguments) -> Result<Value, Fault> {
        let module = self.module;
        let Some(f) = module.function(entry) else {
            return Err(self.fault(0, format!("unknown function `{}`", entry)));
        };
        let env = f
            .params
            .iter()
            .map(|p| (p.clone(), args.get(p).cloned().unwrap_or_else(|| Sym::concrete(Value::Unit))))
            .collect();
        self.call_function(f, env, f.line).map(Sym::into_value)
    }

    fn fault(&self, line: usize, message: impl Into<String>) -> Fault {
        Fault::new(format!("{}:{}", self.label, line), message)
    }

    fn tick(&mut self, line: usize) -> Result<(), Fault> {
        self.steps += 1;
        if self.steps > self.step_limit {
            return Err(self.fault(line, format!("step limit of {} exceeded", self.step_limit)));
        }
        Ok(())
    }

    fn branch(&mut self, cond: &Sym, line: usize) -> bool {
        let label = format!("{}:{}", self.label, line);
        self.ctx.branch_at(cond, label)
    }

    fn call_function(&mut self, f: &'m Function, mut env: Env, line: usize) -> Result<Sym, Fault> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(self.fault(line, format!("call depth limit of {} exceeded", MAX_CALL_DEPTH)));
        }
        self.depth += 1;
        let flow = self.block(&f.body, &mut env);
        self.depth -= 1;
        match flow? {
            Flow::Return(v) => Ok(v),
            Flow::Next => Ok(Sym::concrete(Value::Unit)),
        }
    }

    fn block(&mut self, stmts: &'m [Stmt], env: &mut Env) -> Result<Flow, Fault> {
        for s in stmts {
            if let Flow::Return(v) = self.stmt(s, env)? {
                return Ok(Flow::Return(v));
            }
        }
        Ok(Flow::Next)
    }

    fn stmt(&mut self, s: &'m Stmt, env: &mut Env) -> Result<Flow, Fault> {
        let line = s.line;
        self.tick(line)?;
        match &s.kind {
            StmtKind::Let(name, e) => {
                let v = self.eval(e, env, line)?;
                env.insert(name.clone(), v);
            }
            StmtKind::Assign(name, e) => {
                let v = self.eval(e, env, line)?;
                match env.get_mut(name) {
                    Some(slot) => *slot = v,
                    None => return Err(self.fault(line, EvalError::UnboundVariable(name.clone()).to_string())),
                }
            }
            StmtKind::If {
                condition,
                then_body,
                else_body,
            } => {
                let c = self.eval(condition, env, line)?;
                let body = if self.branch(&c, line) { then_body } else { else_body };
                return self.block(body, env);
            }
            StmtKind::While { condition, body } => loop {
                let c = self.eval(condition, env, line)?;
                if !self.branch(&c, line) {
                    break;
                }
                if let Flow::Return(v) = self.block(body, env)? {
                    return Ok(Flow::Return(v));
                }
                self.tick(line)?;
            },
            StmtKind::Return(e) => {
                let v = match e {
                    Some(e) => self.eval(e, env, line)?,
                    None => Sym::concrete(Value::Unit),
                };
                return Ok(Flow::Return(v));
            }
            StmtKind::Assert(e, message) => {
                let c = self.eval(e, env, line)?;
                if !self.branch(&c, line) {
                    let message = match message {
                        Some(m) => m.clone(),
                        None => format!("assertion failed: {}", e),
                    };
                    return Err(self.fault(line, message));
                }
            }
            StmtKind::Fail(message) => return Err(self.fault(line, message.clone())),
            StmtKind::Expr(e) => {
                self.eval(e, env, line)?;
            }
        }
        Ok(Flow::Next)
    }

    fn eval(&mut self, e: &'m Expr, env: &Env, line: usize) -> Result<Sym, Fault> {
        let result = match e {
            Expr::Lit(v) => Ok(Sym::concrete(v.clone())),
            Expr::Var(name) => env
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::UnboundVariable(name.clone())),
            Expr::Unary(UnaryOp::Not, inner) => self.eval(inner, env, line)?.truthy().try_unary(UnaryOp::Not),
            Expr::Unary(op, inner) => self.eval(inner, env, line)?.try_unary(*op),
            Expr::Binary(op, l, r) => {
                let l = self.eval(l, env, line)?;
                let r = self.eval(r, env, line)?;
                l.try_binary(*op, &r)
            }
            Expr::Compare(op, l, r) => {
                let l = self.eval(l, env, line)?;
                let r = self.eval(r, env, line)?;
                l.try_compare(*op, &r)
            }
            Expr::And(l, r) => {
                let l = self.eval(l, env, line)?;
                if self.branch(&l, line) {
                    Ok(self.eval(r, env, line)?.truthy())
                } else {
                    Ok(Sym::concrete(false))
                }
            }
            Expr::Or(l, r) => {
                let l = self.eval(l, env, line)?;
                if self.branch(&l, line) {
                    Ok(Sym::concrete(true))
                } else {
                    Ok(self.eval(r, env, line)?.truthy())
                }
            }
            Expr::Call(name, args) => return self.call(name, args, env, line),
        };
        result.map_err(|e| self.fault(line, e.to_string()))
    }

    fn call(&mut self, name: &str, args: &'m [Expr], env: &Env, line: usize) -> Result<Sym, Fault> {
        let mut values = Vec::with_capacity(args.len());
        for a in args {
            values.push(self.eval(a, env, line)?);
        }

        let module = self.module;
        let Some(f) = module.function(name) else {
            if name == "len" {
                return match values.as_slice() {
                    [s] => s.try_unary(UnaryOp::Len).map_err(|e| self.fault(line, e.to_string())),
                    _ => Err(self.fault(line, format!("`len` takes 1 argument, {} given", values.len()))),
                };
            }
            return Err(self.fault(line, format!("unknown function `{}`", name)));
        };
        if f.params.len() != values.len() {
            return Err(self.fault(
                line,
                format!("`{}` takes {} argument(s), {} given", name, f.params.len(), values.len()),
            ));
        }
        let env = f.params.iter().cloned().zip(values).collect();
        self.call_function(f, env, line)
    }
}
