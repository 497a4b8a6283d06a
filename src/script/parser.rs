//! Recursive-descent parser for target modules.
//!
//! ```text
//! module  := item*
//! item    := "fn" IDENT "(" [IDENT ("," IDENT)*] ")" block
//!          | ("concrete" | "symbolic") IDENT "=" literal ";"
//! block   := "{" stmt* "}"
//! stmt    := "let" IDENT "=" expr ";" | IDENT "=" expr ";"
//!          | "if" expr block ["else" (block | if-stmt)]
//!          | "while" expr block
//!          | "return" [expr] ";" | "assert" expr ["," STRING] ";"
//!          | "fail" STRING ";" | expr ";"
//! expr    := or;  or := and ("||" and)*;  and := cmp ("&&" cmp)*
//! cmp     := sum [("<" | "<=" | ">" | ">=" | "==" | "!=") sum]
//! sum     := term (("+" | "-") term)*
//! term    := unary (("*" | "/" | "%") unary)*
//! unary   := ("-" | "!") unary | primary
//! primary := literal | IDENT | IDENT "(" args ")" | "(" expr ")"
//! ```

use super::ast::{DeclKind, Declaration, Expr, Function, Module, Stmt, StmtKind};
use super::lexer::{tokenize, Spanned, Token};
use super::SyntaxError;
use crate::expr::{BinaryOp, CompareOp, UnaryOp};
use crate::value::Value;

pub fn parse_module(src: &str) -> Result<Module, SyntaxError> {
    let tokens = tokenize(src)?;
    Parser { tokens, pos: 0 }.module()
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|s| &s.token)
    }

    /// Line of the next token, or of the last one at end of input.
    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(1, |s| s.line)
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(self.line(), message)
    }

    fn unexpected(&self, expected: &str) -> SyntaxError {
        match self.peek() {
            Some(t) => self.error(format!("expected {}, found {}", expected, t)),
            None => self.error(format!("expected {}, found end of input", expected)),
        }
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).map(|s| s.token.clone());
        self.pos += 1;
        t
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), SyntaxError> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.unexpected(&token.to_string()))
        }
    }

    fn ident(&mut self) -> Result<String, SyntaxError> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected("an identifier")),
        }
    }

    fn string(&mut self) -> Result<String, SyntaxError> {
        match self.peek() {
            Some(Token::Str(s)) => {
                let s = s.clone();
                self.pos += 1;
                Ok(s)
            }
            _ => Err(self.unexpected("a string")),
        }
    }

    fn module(mut self) -> Result<Module, SyntaxError> {
        let mut module = Module::default();
        while let Some(token) = self.peek() {
            let line = self.line();
            match token {
                Token::Fn => {
                    let f = self.function()?;
                    if module.function(&f.name).is_some() {
                        return Err(SyntaxError::new(line, format!("function `{}` is defined twice", f.name)));
                    }
                    module.functions.push(f);
                }
                Token::Concrete | Token::Symbolic => {
                    let kind = if self.advance() == Some(Token::Concrete) {
                        DeclKind::Concrete
                    } else {
                        DeclKind::Symbolic
                    };
                    let name = self.ident()?;
                    self.expect(Token::Assign)?;
                    let value = self.literal()?;
                    self.expect(Token::Semi)?;
                    module.declarations.push(Declaration { kind, name, value, line });
                }
                _ => return Err(self.unexpected("`fn`, `concrete` or `symbolic`")),
            }
        }
        Ok(module)
    }

    fn literal(&mut self) -> Result<Value, SyntaxError> {
        let negative = self.eat(&Token::Minus);
        let value = match self.peek() {
            Some(Token::Int(n)) => Value::Int(n.clone()),
            Some(Token::Str(s)) if !negative => Value::Str(s.clone()),
            Some(Token::True) if !negative => Value::Bool(true),
            Some(Token::False) if !negative => Value::Bool(false),
            Some(Token::None) if !negative => Value::Unit,
            _ => return Err(self.unexpected("a literal")),
        };
        self.pos += 1;
        Ok(match value {
            Value::Int(n) if negative => Value::Int(-n),
            v => v,
        })
    }

    fn function(&mut self) -> Result<Function, SyntaxError> {
        let line = self.line();
        self.expect(Token::Fn)?;
        let name = self.ident()?;
        self.expect(Token::LParen)?;
        let mut params = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                let p = self.ident()?;
                if params.contains(&p) {
                    return Err(self.error(format!("parameter `{}` is declared twice", p)));
                }
                params.push(p);
                if self.eat(&Token::RParen) {
                    break;
                }
                self.expect(Token::Comma)?;
            }
        }
        let body = self.block()?;
        Ok(Function { name, params, body, line })
    }

    fn block(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        self.expect(Token::LBrace)?;
        let mut stmts = Vec::new();
        while !self.eat(&Token::RBrace) {
            if self.peek().is_none() {
                return Err(self.unexpected("`}`"));
            }
            stmts.push(self.stmt()?);
        }
        Ok(stmts)
    }

    fn stmt(&mut self) -> Result<Stmt, SyntaxError> {
        let line = self.line();
        let kind = match self.peek() {
            Some(Token::Let) => {
                self.pos += 1;
                let name = self.ident()?;
                self.expect(Token::Assign)?;
                let e = self.expr()?;
                self.expect(Token::Semi)?;
                StmtKind::Let(name, e)
            }
            Some(Token::Ident(_)) if self.peek_at(1) == Some(&Token::Assign) => {
                let name = self.ident()?;
                self.pos += 1;
                let e = self.expr()?;
                self.expect(Token::Semi)?;
                StmtKind::Assign(name, e)
            }
            Some(Token::If) => return self.if_stmt(),
            Some(Token::While) => {
                self.pos += 1;
                let condition = self.expr()?;
                let body = self.block()?;
                StmtKind::While { condition, body }
            }
            Some(Token::Return) => {
                self.pos += 1;
                let e = if self.eat(&Token::Semi) {
                    None
                } else {
                    let e = self.expr()?;
                    self.expect(Token::Semi)?;
                    Some(e)
                };
                StmtKind::Return(e)
            }
            Some(Token::Assert) => {
                self.pos += 1;
                let e = self.expr()?;
                let message = if self.eat(&Token::Comma) { Some(self.string()?) } else { None };
                self.expect(Token::Semi)?;
                StmtKind::Assert(e, message)
            }
            Some(Token::Fail) => {
                self.pos += 1;
                let message = self.string()?;
                self.expect(Token::Semi)?;
                StmtKind::Fail(message)
            }
            _ => {
                let e = self.expr()?;
                self.expect(Token::Semi)?;
                StmtKind::Expr(e)
            }
        };
        Ok(Stmt { line, kind })
    }

    fn if_stmt(&mut self) -> Result<Stmt, SyntaxError> {
        let line = self.line();
        self.expect(Token::If)?;
        let condition = self.expr()?;
        let then_body = self.block()?;
        let else_body = if self.eat(&Token::Else) {
            if self.peek() == Some(&Token::If) {
                vec![self.if_stmt()?]
            } else {
                self.block()?
            }
        } else {
            Vec::new()
        };
        Ok(Stmt {
            line,
            kind: StmtKind::If {
                condition,
                then_body,
                else_body,
            },
        })
    }

    fn expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut e = self.and()?;
        while self.eat(&Token::OrOr) {
            let r = self.and()?;
            e = Expr::Or(Box::new(e), Box::new(r));
        }
        Ok(e)
    }

    fn and(&mut self) -> Result<Expr, SyntaxError> {
        let mut e = self.comparison()?;
        while self.eat(&Token::AndAnd) {
            let r = self.comparison()?;
            e = Expr::And(Box::new(e), Box::new(r));
        }
        Ok(e)
    }

    fn comparison(&mut self) -> Result<Expr, SyntaxError> {
        let l = self.sum()?;
        let op = match self.peek() {
            Some(Token::Lt) => CompareOp::Lt,
            Some(Token::Le) => CompareOp::Le,
            Some(Token::Gt) => CompareOp::Gt,
            Some(Token::Ge) => CompareOp::Ge,
            Some(Token::Eq) => CompareOp::Eq,
            Some(Token::Ne) => CompareOp::Ne,
            _ => return Ok(l),
        };
        self.pos += 1;
        let r = self.sum()?;
        Ok(Expr::compare(op, l, r))
    }

    fn sum(&mut self) -> Result<Expr, SyntaxError> {
        let mut e = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(e),
            };
            self.pos += 1;
            let r = self.term()?;
            e = Expr::binary(op, e, r);
        }
    }

    fn term(&mut self) -> Result<Expr, SyntaxError> {
        let mut e = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => return Ok(e),
            };
            self.pos += 1;
            let r = self.unary()?;
            e = Expr::binary(op, e, r);
        }
    }

    fn unary(&mut self) -> Result<Expr, SyntaxError> {
        if self.eat(&Token::Minus) {
            let e = self.unary()?;
            return Ok(match e {
                Expr::Lit(Value::Int(n)) => Expr::Lit(Value::Int(-n)),
                e => Expr::unary(UnaryOp::Neg, e),
            });
        }
        if self.eat(&Token::Bang) {
            let e = self.unary()?;
            return Ok(Expr::unary(UnaryOp::Not, e));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, SyntaxError> {
        let e = match self.peek() {
            Some(Token::Int(n)) => Expr::Lit(Value::Int(n.clone())),
            Some(Token::Str(s)) => Expr::Lit(Value::Str(s.clone())),
            Some(Token::True) => Expr::Lit(Value::Bool(true)),
            Some(Token::False) => Expr::Lit(Value::Bool(false)),
            Some(Token::None) => Expr::Lit(Value::Unit),
            Some(Token::LParen) => {
                self.pos += 1;
                let e = self.expr()?;
                self.expect(Token::RParen)?;
                return Ok(e);
            }
            Some(Token::Ident(_)) => {
                let name = self.ident()?;
                if !self.eat(&Token::LParen) {
                    return Ok(Expr::Var(name));
                }
                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.expr()?);
                        if self.eat(&Token::RParen) {
                            break;
                        }
                        self.expect(Token::Comma)?;
                    }
                }
                return Ok(Expr::Call(name, args));
            }
            _ => return Err(self.unexpected("an expression")),
        };
        self.pos += 1;
        Ok(e)
    }
}

/// Parses a standalone literal, as accepted by declarations.
pub fn parse_literal(src: &str) -> Result<Value, SyntaxError> {
    let tokens = tokenize(src)?;
    let mut p = Parser { tokens, pos: 0 };
    let v = p.literal()?;
    if p.peek().is_some() {
        return Err(p.unexpected("end of input"));
    }
    Ok(v)
}
