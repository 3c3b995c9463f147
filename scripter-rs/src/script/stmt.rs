//! Statement AST and script-level parser.
//!
//! A script is a sequence of statements.  Simple statements end with `;`, a
//! line break, a closing `}` or the end of input; block statements (`if`,
//! `while`, `for`, `function`, `{ … }`) need no terminator.

use std::rc::Rc;

use super::callable::{ActionTable, UserFunction};
use super::error::Result;
use super::expr::{is_reserved, Expr, Parser, Token};
use super::stack::ensure_sufficient_stack;

/// A parsed statement.
#[derive(Debug, Clone)]
pub enum Stmt {
    /// `var name [= init]` binds in the current frame.
    Var { name: Rc<str>, init: Option<Expr> },
    /// Expression evaluated for its side effects.
    Expr(Expr),
    /// `if (cond) then [else else]`; `else if` nests in `else_block`.
    If {
        cond: Expr,
        then_block: Vec<Stmt>,
        else_block: Vec<Stmt>,
    },
    /// `while (cond) body`
    While { cond: Expr, body: Vec<Stmt> },
    /// `for (init; cond; step) body`; a missing condition is `true`.
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Vec<Stmt>,
    },
    /// `function name(params) { body }`
    Function(Rc<UserFunction>),
    /// `return [expr]`
    Return(Option<Expr>),
    Break,
    Continue,
    /// `{ … }`; does not open a frame.
    Block(Vec<Stmt>),
}

impl Stmt {
    /// Move every nested statement into `out`.
    fn take_children(&mut self, out: &mut Vec<Stmt>) {
        match self {
            Stmt::If {
                then_block,
                else_block,
                ..
            } => {
                out.append(then_block);
                out.append(else_block);
            }
            Stmt::While { body, .. } | Stmt::Block(body) => out.append(body),
            Stmt::For { init, body, .. } => {
                if let Some(init) = init.take() {
                    out.push(*init);
                }
                out.append(body);
            }
            _ => {}
        }
    }
}

impl Drop for Stmt {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.take_children(&mut pending);
        if pending.is_empty() {
            return;
        }
        ensure_sufficient_stack(|| {
            while let Some(mut stmt) = pending.pop() {
                stmt.take_children(&mut pending);
            }
        });
    }
}

/// A parsed script, ready to run any number of times.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub stmts: Vec<Stmt>,
}

impl Program {
    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }
}

/// Parse a script into a [`Program`].
pub fn parse_program(src: &str, actions: &ActionTable) -> Result<Program> {
    let mut parser = Parser::new(src, actions)?;
    let mut stmts = Vec::new();
    while !parser.at_eof() {
        if parser.eat_op(";") {
            continue;
        }
        stmts.push(parser.parse_statement()?);
    }
    Ok(Program { stmts })
}

// ── Parser ────────────────────────────────────────────────────────────────────

impl Parser<'_> {
    pub(super) fn parse_statement(&mut self) -> Result<Stmt> {
        ensure_sufficient_stack(|| self.parse_statement_inner())
    }

    fn parse_statement_inner(&mut self) -> Result<Stmt> {
        let keyword = match self.peek() {
            Token::Ident(name) if is_reserved(name) => Some(Rc::clone(name)),
            _ => None,
        };
        match keyword.as_deref() {
            Some("var") => {
                self.advance();
                let stmt = self.parse_var()?;
                self.end_simple()?;
                Ok(stmt)
            }
            Some("if") => {
                self.advance();
                self.parse_if()
            }
            Some("while") => {
                self.advance();
                let cond = self.parse_paren_cond()?;
                let body = self.parse_body()?;
                Ok(Stmt::While { cond, body })
            }
            Some("for") => {
                self.advance();
                self.parse_for()
            }
            // `function (` starts an anonymous function expression.
            Some("function") if matches!(self.peek_at(1), Token::Ident(_)) => {
                self.advance();
                let name = self.expect_ident()?;
                Ok(Stmt::Function(self.parse_function_rest(name)?))
            }
            Some("return") => {
                self.advance();
                let value = if self.at_simple_end() {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.end_simple()?;
                Ok(Stmt::Return(value))
            }
            Some("break") => {
                self.advance();
                self.end_simple()?;
                Ok(Stmt::Break)
            }
            Some("continue") => {
                self.advance();
                self.end_simple()?;
                Ok(Stmt::Continue)
            }
            _ if self.eat_op("{") => Ok(Stmt::Block(self.parse_block_rest()?)),
            _ => {
                let expr = self.parse_expr()?;
                self.end_simple()?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    /// After `function [name]`: `(params) { body }`.
    pub(super) fn parse_function_rest(&mut self, name: Rc<str>) -> Result<Rc<UserFunction>> {
        self.expect_op("(")?;
        let mut params = Vec::new();
        if !self.eat_op(")") {
            loop {
                params.push(self.expect_ident()?);
                if self.eat_op(")") {
                    break;
                }
                self.expect_op(",")?;
            }
        }
        self.expect_op("{")?;
        let body = self.parse_block_rest()?;
        Ok(Rc::new(UserFunction {
            name,
            params,
            body: body.into(),
        }))
    }

    fn parse_var(&mut self) -> Result<Stmt> {
        let name = self.expect_ident()?;
        let init = if self.eat_op("=") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Stmt::Var { name, init })
    }

    fn parse_if(&mut self) -> Result<Stmt> {
        ensure_sufficient_stack(|| self.parse_if_inner())
    }

    fn parse_if_inner(&mut self) -> Result<Stmt> {
        let cond = self.parse_paren_cond()?;
        let then_block = self.parse_body()?;
        let else_block = if self.at_keyword("else") {
            self.advance();
            if self.at_keyword("if") {
                self.advance();
                vec![self.parse_if()?]
            } else {
                self.parse_body()?
            }
        } else {
            Vec::new()
        };
        Ok(Stmt::If {
            cond,
            then_block,
            else_block,
        })
    }

    fn parse_for(&mut self) -> Result<Stmt> {
        self.expect_op("(")?;
        let init = if self.at_op(";") {
            None
        } else if self.at_keyword("var") {
            self.advance();
            Some(Box::new(self.parse_var()?))
        } else {
            Some(Box::new(Stmt::Expr(self.parse_expr()?)))
        };
        self.expect_op(";")?;
        let cond = if self.at_op(";") {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect_op(";")?;
        let step = if self.at_op(")") {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect_op(")")?;
        let body = self.parse_body()?;
        Ok(Stmt::For {
            init,
            cond,
            step,
            body,
        })
    }

    fn parse_paren_cond(&mut self) -> Result<Expr> {
        self.expect_op("(")?;
        let cond = self.parse_expr()?;
        self.expect_op(")")?;
        Ok(cond)
    }

    /// A braced block or a single statement.
    fn parse_body(&mut self) -> Result<Vec<Stmt>> {
        if self.eat_op("{") {
            self.parse_block_rest()
        } else {
            Ok(vec![self.parse_statement()?])
        }
    }

    /// Statements up to and including the closing `}`.
    fn parse_block_rest(&mut self) -> Result<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            if self.eat_op("}") {
                return Ok(stmts);
            }
            if self.at_eof() {
                return Err(self.error());
            }
            if self.eat_op(";") {
                continue;
            }
            stmts.push(self.parse_statement()?);
        }
    }

    fn at_simple_end(&self) -> bool {
        self.at_op(";") || self.at_op("}") || self.at_eof() || self.peek_spanned().line_break
    }

    fn end_simple(&mut self) -> Result<()> {
        if self.eat_op(";") || self.at_simple_end() {
            Ok(())
        } else {
            Err(self.error())
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
