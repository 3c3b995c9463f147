//! Expression lexer, AST, parser, and evaluator.
//!
//! Operator precedence (lowest → highest):
//!   action (`=`, `+=`, …)  →  or  →  and  →  equality  →  relational  →
//!   additive  →  multiplicative  →  unary  →  postfix  →  primary
//!
//! Action operators are not hard-wired: the lexer and parser consult the
//! interpreter's action table, so a host-registered token parses the same way
//! as the built-in `+=`.  Operators that take no operand (`++`, `--`) are
//! postfix.

use std::rc::Rc;

use super::callable::{ActionTable, Callable, UserFunction};
use super::error::{Result, ScriptError, MAX_ERROR_CHARS};
use super::interp::Interpreter;
use super::location::{element_at, member_of, Location};
use super::scope::Binding;
use super::stack::ensure_sufficient_stack;
use super::value::Value;

/// Punctuation and operators that do not depend on the action table.
const FIXED_OPS: &[&str] = &[
    "==", "!=", "<=", ">=", "&&", "||", "<", ">", "+", "-", "*", "/", "%", "!", "=", "(", ")",
    "[", "]", "{", "}", ",", ";", ".",
];

// ── Token ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(Rc<str>),
    Ident(Rc<str>),
    /// Operator or punctuation, from [`FIXED_OPS`] or the action table.
    Op(Rc<str>),
    /// Unrecognised input character; reported by the parser.
    Unknown(char),
    Eof,
}

#[derive(Debug, Clone)]
pub struct Spanned {
    pub tok: Token,
    pub start: usize,
    pub end: usize,
    /// A line break separates this token from the previous one.
    pub line_break: bool,
}

// ── Lexer ─────────────────────────────────────────────────────────────────────

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    /// Operator spellings, longest first.
    ops: Vec<Rc<str>>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str, actions: &ActionTable) -> Self {
        let mut ops: Vec<Rc<str>> = FIXED_OPS.iter().map(|&op| Rc::from(op)).collect();
        for token in actions.keys() {
            if !ops.contains(token) {
                ops.push(Rc::clone(token));
            }
        }
        ops.sort_by(|a, b| b.len().cmp(&a.len()));
        Lexer { src, pos: 0, ops }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek2(&self) -> Option<char> {
        self.rest().chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    /// Skip whitespace and `//` comments; report whether a newline was seen.
    fn skip_trivia(&mut self) -> bool {
        let mut newline = false;
        loop {
            match self.peek() {
                Some('\n') => {
                    newline = true;
                    self.pos += 1;
                }
                Some(c) if c.is_whitespace() => {
                    self.pos += c.len_utf8();
                }
                Some('/') if self.peek2() == Some('/') => {
                    while !matches!(self.peek(), None | Some('\n')) {
                        self.bump();
                    }
                }
                _ => return newline,
            }
        }
    }

    fn read_number(&mut self) -> Result<Token> {
        let start = self.pos;
        while matches!(self.peek(), Some('0'..='9')) {
            self.pos += 1;
        }
        if self.peek() == Some('.') && matches!(self.peek2(), Some('0'..='9')) {
            self.pos += 1;
            while matches!(self.peek(), Some('0'..='9')) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let mark = self.pos;
            self.pos += 1;
            if matches!(self.peek(), Some('+' | '-')) {
                self.pos += 1;
            }
            if matches!(self.peek(), Some('0'..='9')) {
                while matches!(self.peek(), Some('0'..='9')) {
                    self.pos += 1;
                }
            } else {
                // `2e` is the number 2 followed by the identifier `e`.
                self.pos = mark;
            }
        }
        let text = &self.src[start..self.pos];
        text.parse()
            .map(Token::Number)
            .map_err(|_| ScriptError::parse(text, self.rest()))
    }

    fn read_string(&mut self, quote: char) -> Result<Token> {
        let start = self.pos - 1;
        let mut s = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => {
                    return Err(ScriptError::parse(&self.src[start..self.pos], self.rest()));
                }
                Some('\\') => match self.bump() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some(c) => s.push(c),
                    None => return Err(ScriptError::parse(&self.src[start..], "")),
                },
                Some(c) if c == quote => break,
                Some(c) => s.push(c),
            }
        }
        Ok(Token::Str(s.into()))
    }

    fn read_ident(&mut self) -> Token {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_' || c == '$') {
            self.bump();
        }
        Token::Ident(self.src[start..self.pos].into())
    }

    fn read_op(&mut self) -> Option<Token> {
        let rest = self.rest();
        let op = self.ops.iter().find(|op| rest.starts_with(&***op))?;
        let op = Rc::clone(op);
        self.pos += op.len();
        Some(Token::Op(op))
    }

    fn next_token(&mut self) -> Result<Spanned> {
        let line_break = self.skip_trivia();
        let start = self.pos;
        let tok = match self.peek() {
            None => Token::Eof,
            Some('0'..='9') => self.read_number()?,
            Some(q @ ('"' | '\'')) => {
                self.pos += 1;
                self.read_string(q)?
            }
            Some(c) if c.is_alphabetic() || c == '_' || c == '$' => self.read_ident(),
            Some(c) => match self.read_op() {
                Some(op) => op,
                None => {
                    self.pos += c.len_utf8();
                    Token::Unknown(c)
                }
            },
        };
        Ok(Spanned {
            tok,
            start,
            end: self.pos,
            line_break,
        })
    }

    fn tokenize(mut self) -> Result<Vec<Spanned>> {
        let mut tokens = Vec::new();
        loop {
            let t = self.next_token()?;
            let done = t.tok == Token::Eof;
            tokens.push(t);
            if done {
                return Ok(tokens);
            }
        }
    }
}

// ── AST ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Value),
    /// Identifier; `rest` is the (bounded) source after it, quoted if the
    /// identifier turns out to be unbound.
    Ident { name: Rc<str>, rest: Rc<str> },
    Property { receiver: Box<Expr>, name: Rc<str> },
    Index { target: Box<Expr>, index: Box<Expr> },
    Array(Vec<Expr>),
    /// Anonymous `function (params) { body }`.
    Lambda(Rc<UserFunction>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call { callee: Box<Expr>, args: Vec<Expr> },
    /// Action operator applied to an assignable target.
    Action {
        target: Box<Expr>,
        token: Rc<str>,
        operand: Option<Box<Expr>>,
    },
}

impl Expr {
    fn is_leaf(&self) -> bool {
        matches!(self, Expr::Literal(_) | Expr::Ident { .. } | Expr::Lambda(_))
    }

    /// Move every non-leaf sub-expression into `out`.
    fn take_children(&mut self, out: &mut Vec<Expr>) {
        fn take(child: &mut Expr, out: &mut Vec<Expr>) {
            if !child.is_leaf() {
                out.push(std::mem::replace(child, Expr::Literal(Value::Empty)));
            }
        }
        match self {
            Expr::Literal(_) | Expr::Ident { .. } | Expr::Lambda(_) => {}
            Expr::Property { receiver: e, .. } | Expr::Unary(_, e) => take(e, out),
            Expr::Index { target: a, index: b } | Expr::Binary(_, a, b) => {
                take(a, out);
                take(b, out);
            }
            Expr::Array(items) => out.append(items),
            Expr::Call { callee, args } => {
                take(callee, out);
                out.append(args);
            }
            Expr::Action {
                target, operand, ..
            } => {
                take(target, out);
                if let Some(operand) = operand {
                    take(operand, out);
                }
            }
        }
    }
}

// Deeply nested trees are dismantled with an explicit worklist.
impl Drop for Expr {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.take_children(&mut pending);
        if pending.is_empty() {
            return;
        }
        ensure_sufficient_stack(|| {
            while let Some(mut expr) = pending.pop() {
                expr.take_children(&mut pending);
            }
        });
    }
}

// ── Parser ────────────────────────────────────────────────────────────────────

/// Recursive-descent parser shared by expressions and statements
/// (see [`stmt`](super::stmt)).
pub struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Spanned>,
    pos: usize,
    actions: &'a ActionTable,
}

impl<'a> Parser<'a> {
    pub fn new(src: &'a str, actions: &'a ActionTable) -> Result<Self> {
        let tokens = Lexer::new(src, actions).tokenize()?;
        Ok(Parser {
            src,
            tokens,
            pos: 0,
            actions,
        })
    }

    /// The token stream always ends with `Eof`; reading past it keeps
    /// returning `Eof`.
    pub(super) fn peek_spanned(&self) -> &Spanned {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub(super) fn peek(&self) -> &Token {
        &self.peek_spanned().tok
    }

    pub(super) fn peek_at(&self, ahead: usize) -> &Token {
        &self.tokens[(self.pos + ahead).min(self.tokens.len() - 1)].tok
    }

    pub(super) fn advance(&mut self) -> Token {
        let t = self.peek().clone();
        self.pos += 1;
        t
    }

    pub(super) fn at_op(&self, op: &str) -> bool {
        matches!(self.peek(), Token::Op(o) if &**o == op)
    }

    pub(super) fn at_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Token::Ident(i) if &**i == kw)
    }

    pub(super) fn eat_op(&mut self, op: &str) -> bool {
        if self.at_op(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub(super) fn at_eof(&self) -> bool {
        *self.peek() == Token::Eof
    }

    /// Parse error pointing at the current token.
    pub(super) fn error(&self) -> ScriptError {
        let t = self.peek_spanned();
        if t.tok == Token::Eof {
            return ScriptError::parse("end of input", "");
        }
        ScriptError::parse(&self.src[t.start..t.end], &self.src[t.end..])
    }

    pub(super) fn expect_op(&mut self, op: &str) -> Result<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.error())
        }
    }

    pub(super) fn expect_ident(&mut self) -> Result<Rc<str>> {
        match self.peek() {
            Token::Ident(name) if !is_reserved(name) => {
                let name = Rc::clone(name);
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error()),
        }
    }

    /// Bounded source text following the previous token.
    fn rest_after_previous(&self) -> Rc<str> {
        let end = self.pos.checked_sub(1).and_then(|i| self.tokens.get(i)).map_or(0, |t| t.end);
        self.src[end..].chars().take(MAX_ERROR_CHARS).collect::<String>().into()
    }

    fn action_takes_operand(&self, token: &str) -> Option<bool> {
        self.actions.get(token).map(|op| op.takes_operand())
    }

    // ── Grammar ───────────────────────────────────────────────────────────────

    pub fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_action()
    }

    fn parse_action(&mut self) -> Result<Expr> {
        ensure_sufficient_stack(|| self.parse_action_inner())
    }

    fn parse_action_inner(&mut self) -> Result<Expr> {
        let lhs = self.parse_or()?;
        if let Token::Op(token) = self.peek() {
            if self.action_takes_operand(token) == Some(true) {
                let token = Rc::clone(token);
                self.pos += 1;
                let rhs = self.parse_action()?;
                return Ok(Expr::Action {
                    target: Box::new(lhs),
                    token,
                    operand: Some(Box::new(rhs)),
                });
            }
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat_op("||") {
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_equality()?;
        while self.eat_op("&&") {
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn binary_level(
        &mut self,
        table: &[(&str, BinOp)],
        next: fn(&mut Self) -> Result<Expr>,
    ) -> Result<Expr> {
        let mut lhs = next(self)?;
        'outer: loop {
            for &(spelling, op) in table {
                if self.eat_op(spelling) {
                    let rhs = next(self)?;
                    lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
                    continue 'outer;
                }
            }
            return Ok(lhs);
        }
    }

    fn parse_equality(&mut self) -> Result<Expr> {
        self.binary_level(&[("==", BinOp::Eq), ("!=", BinOp::Ne)], Self::parse_relational)
    }

    fn parse_relational(&mut self) -> Result<Expr> {
        self.binary_level(
            &[
                ("<=", BinOp::Le),
                (">=", BinOp::Ge),
                ("<", BinOp::Lt),
                (">", BinOp::Gt),
            ],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        self.binary_level(&[("+", BinOp::Add), ("-", BinOp::Sub)], Self::parse_multiplicative)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        self.binary_level(
            &[("*", BinOp::Mul), ("/", BinOp::Div), ("%", BinOp::Rem)],
            Self::parse_unary,
        )
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        ensure_sufficient_stack(|| self.parse_unary_inner())
    }

    fn parse_unary_inner(&mut self) -> Result<Expr> {
        if self.eat_op("-") {
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.parse_unary()?)));
        }
        if self.eat_op("!") {
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(self.parse_unary()?)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat_op("(") {
                let args = self.parse_list(")")?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else if self.eat_op(".") {
                let name = match self.advance() {
                    Token::Ident(name) => name,
                    _ => {
                        self.pos -= 1;
                        return Err(self.error());
                    }
                };
                expr = Expr::Property {
                    receiver: Box::new(expr),
                    name,
                };
            } else if self.eat_op("[") {
                let index = self.parse_expr()?;
                self.expect_op("]")?;
                expr = Expr::Index {
                    target: Box::new(expr),
                    index: Box::new(index),
                };
            } else if let Token::Op(token) = self.peek() {
                if self.action_takes_operand(token) != Some(false) {
                    return Ok(expr);
                }
                let token = Rc::clone(token);
                self.pos += 1;
                expr = Expr::Action {
                    target: Box::new(expr),
                    token,
                    operand: None,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    /// Comma-separated expressions up to `close` (consumed).
    fn parse_list(&mut self, close: &str) -> Result<Vec<Expr>> {
        let mut items = Vec::new();
        if self.eat_op(close) {
            return Ok(items);
        }
        loop {
            items.push(self.parse_expr()?);
            if self.eat_op(close) {
                return Ok(items);
            }
            self.expect_op(",")?;
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.peek().clone() {
            Token::Number(n) => {
                self.pos += 1;
                Ok(Expr::Literal(Value::Number(n)))
            }
            Token::Str(s) => {
                self.pos += 1;
                Ok(Expr::Literal(Value::Str(s)))
            }
            Token::Ident(name) => match &*name {
                "true" | "false" => {
                    self.pos += 1;
                    Ok(Expr::Literal(Value::Bool(&*name == "true")))
                }
                "function" => {
                    self.pos += 1;
                    Ok(Expr::Lambda(self.parse_function_rest("<anonymous>".into())?))
                }
                _ if is_reserved(&name) => Err(self.error()),
                _ => {
                    self.pos += 1;
                    let rest = self.rest_after_previous();
                    Ok(Expr::Ident { name, rest })
                }
            },
            Token::Op(op) if &*op == "(" => {
                self.pos += 1;
                let inner = self.parse_expr()?;
                self.expect_op(")")?;
                Ok(inner)
            }
            Token::Op(op) if &*op == "[" => {
                self.pos += 1;
                Ok(Expr::Array(self.parse_list("]")?))
            }
            _ => Err(self.error()),
        }
    }
}

/// Statement keywords that cannot name a variable.
pub(super) fn is_reserved(name: &str) -> bool {
    matches!(
        name,
        "var" | "if" | "else" | "while" | "for" | "function" | "return" | "break" | "continue"
            | "true" | "false"
    )
}

/// Parse a single expression; the whole input must be consumed.
pub fn parse_expr(src: &str, actions: &ActionTable) -> Result<Expr> {
    let mut parser = Parser::new(src, actions)?;
    let expr = parser.parse_expr()?;
    parser.eat_op(";");
    if !parser.at_eof() {
        return Err(parser.error());
    }
    Ok(expr)
}

// ── Evaluator ─────────────────────────────────────────────────────────────────

impl Expr {
    /// Evaluate the node to a value.  Only call and action nodes have side
    /// effects of their own.
    pub fn evaluate(&self, interp: &mut Interpreter) -> Result<Value> {
        ensure_sufficient_stack(|| self.evaluate_inner(interp))
    }

    fn evaluate_inner(&self, interp: &mut Interpreter) -> Result<Value> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),

            Expr::Ident { name, rest } => {
                let binding = interp.resolve_callable_at(name, None, rest);
                interp.binding_value(binding)
            }

            Expr::Property { receiver, name } => member_of(&receiver.evaluate(interp)?, name),

            Expr::Index { target, index } => {
                let array = target.evaluate(interp)?.as_array()?;
                let index = index.evaluate(interp)?.as_integer()?;
                element_at(&array, index)
            }

            Expr::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(item.evaluate(interp)?);
                }
                Ok(Value::array(values))
            }

            Expr::Lambda(func) => Ok(Value::Function(Callable::UserDefined(Rc::clone(func)))),

            Expr::Unary(op, inner) => {
                let v = inner.evaluate(interp)?;
                match op {
                    UnaryOp::Neg => v.arith_neg(),
                    UnaryOp::Not => v.logical_not(),
                }
            }

            Expr::Binary(op, lhs, rhs) => {
                // Short-circuit for && and ||
                match op {
                    BinOp::And => {
                        if !lhs.evaluate(interp)?.as_bool()? {
                            return Ok(Value::Bool(false));
                        }
                        return Ok(Value::Bool(rhs.evaluate(interp)?.as_bool()?));
                    }
                    BinOp::Or => {
                        if lhs.evaluate(interp)?.as_bool()? {
                            return Ok(Value::Bool(true));
                        }
                        return Ok(Value::Bool(rhs.evaluate(interp)?.as_bool()?));
                    }
                    _ => {}
                }
                let l = lhs.evaluate(interp)?;
                let r = rhs.evaluate(interp)?;
                eval_binop(*op, &l, &r)
            }

            Expr::Call { callee, args } => {
                let binding = match &**callee {
                    Expr::Ident { name, rest } => interp.resolve_callable_at(name, None, rest),
                    other => {
                        let f = other.evaluate(interp)?.as_function()?;
                        Binding::Callable(f)
                    }
                };
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(arg.evaluate(interp)?);
                }
                interp.call_binding(binding, values)
            }

            Expr::Action {
                target,
                token,
                operand,
            } => {
                if let Expr::Ident { name, rest } = &**target {
                    let binding = interp.resolve_callable_at(name, Some(&**token), rest);
                    let args = match operand {
                        Some(e) => vec![e.evaluate(interp)?],
                        None => Vec::new(),
                    };
                    return interp.call_binding(binding, args);
                }
                let loc = target.resolve_location(interp)?;
                let op = interp
                    .actions
                    .get(&**token)
                    .cloned()
                    .ok_or_else(|| ScriptError::parse(&**token, ""))?;
                let operand = match operand {
                    Some(e) => e.evaluate(interp)?,
                    None => Value::Empty,
                };
                op.apply(interp, &loc, operand)
            }
        }
    }

    /// Evaluate the addressing part of an assignable node once and return the
    /// storage it denotes.
    pub fn resolve_location(&self, interp: &mut Interpreter) -> Result<Location> {
        match self {
            Expr::Ident { name, rest } => Ok(Location::Variable {
                name: Rc::clone(name),
                rest: Rc::clone(rest),
            }),
            Expr::Property { receiver, name } => {
                let name = Rc::clone(name);
                match receiver.evaluate(interp)? {
                    Value::Object(object) => Ok(Location::Property { object, name }),
                    receiver @ (Value::Str(_) | Value::Array(_)) => {
                        Ok(Location::Member { receiver, name })
                    }
                    other => Err(ScriptError::type_mismatch("object", other.type_name())),
                }
            }
            Expr::Index { target, index } => {
                let array = target.evaluate(interp)?.as_array()?;
                let index = index.evaluate(interp)?.as_integer()?;
                Ok(Location::Element { array, index })
            }
            _ => Err(ScriptError::runtime("expression is not assignable")),
        }
    }
}

fn eval_binop(op: BinOp, l: &Value, r: &Value) -> Result<Value> {
    use std::cmp::Ordering;
    match op {
        BinOp::Add => l.arith_add(r),
        BinOp::Sub => l.arith_sub(r),
        BinOp::Mul => l.arith_mul(r),
        BinOp::Div => l.arith_div(r),
        BinOp::Rem => l.arith_rem(r),
        BinOp::Eq => Ok(Value::Bool(l.loose_eq(r))),
        BinOp::Ne => Ok(Value::Bool(!l.loose_eq(r))),
        BinOp::Lt => Ok(Value::Bool(l.compare(r)? == Ordering::Less)),
        BinOp::Le => Ok(Value::Bool(l.compare(r)? != Ordering::Greater)),
        BinOp::Gt => Ok(Value::Bool(l.compare(r)? == Ordering::Greater)),
        BinOp::Ge => Ok(Value::Bool(l.compare(r)? != Ordering::Less)),
        BinOp::And | BinOp::Or => unreachable!("handled above"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
