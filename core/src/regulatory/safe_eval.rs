//! A small AST interpreter over a closed set of expression node kinds:
//! literals, identifiers (checked against a caller-supplied whitelist),
//! dotted attribute access over dict-shaped values, comparisons, boolean
//! `and`/`or`/`not`, and `+ - * /`. This is the only code in the crate
//! permitted to interpret bundle phase-in rules and legacy applicability
//! rules; it never falls back to a host-language `eval`.
//!
//! Any other construct (function calls, indexing, string methods, lambdas)
//! fails loudly with [`CoreError::InvalidExpression`].

use crate::error::{CoreError, CoreResult};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    And,
    Or,
    Not,
    True,
    False,
    Eq,
    NotEq,
    Gt,
    GtE,
    Lt,
    LtE,
    Plus,
    Minus,
    Star,
    Slash,
    Dot,
    LParen,
    RParen,
    Eof,
}

fn tokenize(src: &str) -> CoreResult<Vec<Token>> {
    let mut chars: Peekable<Chars> = src.chars().peekable();
    let mut tokens = Vec::new();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '=' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::Eq);
                } else {
                    return Err(CoreError::InvalidExpression("unexpected '='".to_string()));
                }
            }
            '!' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::NotEq);
                } else {
                    return Err(CoreError::InvalidExpression("unexpected '!'".to_string()));
                }
            }
            '>' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::GtE);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '<' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::LtE);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some(c) if c == quote => break,
                        Some(c) => s.push(c),
                        None => {
                            return Err(CoreError::InvalidExpression(
                                "unterminated string literal".to_string(),
                            ))
                        }
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit() => {
                let mut s = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        s.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let n: f64 = s
                    .parse()
                    .map_err(|_| CoreError::InvalidExpression(format!("invalid number {s:?}")))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut s = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        s.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(match s.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "true" | "True" => Token::True,
                    "false" | "False" => Token::False,
                    _ => Token::Ident(s),
                });
            }
            other => {
                return Err(CoreError::InvalidExpression(format!(
                    "unexpected character {other:?}"
                )))
            }
        }
    }
    tokens.push(Token::Eof);
    Ok(tokens)
}

/// Parsed expression tree. Kept intentionally small -- every variant here is
/// a node kind the evaluator is willing to interpret.
#[derive(Debug, Clone)]
enum Expr {
    NumberLit(f64),
    StringLit(String),
    BoolLit(bool),
    Ident(String),
    Attr(Box<Expr>, String),
    BoolOp(BoolOpKind, Vec<Expr>),
    Not(Box<Expr>),
    Compare(Box<Expr>, Vec<(CompareOp, Expr)>),
    BinOp(Box<Expr>, ArithOp, Box<Expr>),
}

#[derive(Debug, Clone, Copy)]
enum BoolOpKind {
    And,
    Or,
}

#[derive(Debug, Clone, Copy)]
enum CompareOp {
    Eq,
    NotEq,
    Gt,
    GtE,
    Lt,
    LtE,
}

#[derive(Debug, Clone, Copy)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, want: &Token) -> CoreResult<()> {
        if self.peek() == want {
            self.advance();
            Ok(())
        } else {
            Err(CoreError::InvalidExpression(format!(
                "expected {want:?}, got {:?}",
                self.peek()
            )))
        }
    }

    fn parse_expr(&mut self) -> CoreResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> CoreResult<Expr> {
        let mut terms = vec![self.parse_and()?];
        while *self.peek() == Token::Or {
            self.advance();
            terms.push(self.parse_and()?);
        }
        Ok(if terms.len() == 1 {
            terms.pop().unwrap()
        } else {
            Expr::BoolOp(BoolOpKind::Or, terms)
        })
    }

    fn parse_and(&mut self) -> CoreResult<Expr> {
        let mut terms = vec![self.parse_not()?];
        while *self.peek() == Token::And {
            self.advance();
            terms.push(self.parse_not()?);
        }
        Ok(if terms.len() == 1 {
            terms.pop().unwrap()
        } else {
            Expr::BoolOp(BoolOpKind::And, terms)
        })
    }

    fn parse_not(&mut self) -> CoreResult<Expr> {
        if *self.peek() == Token::Not {
            self.advance();
            Ok(Expr::Not(Box::new(self.parse_not()?)))
        } else {
            self.parse_compare()
        }
    }

    fn parse_compare(&mut self) -> CoreResult<Expr> {
        let left = self.parse_arith()?;
        let mut chain = Vec::new();
        loop {
            let op = match self.peek() {
                Token::Eq => CompareOp::Eq,
                Token::NotEq => CompareOp::NotEq,
                Token::Gt => CompareOp::Gt,
                Token::GtE => CompareOp::GtE,
                Token::Lt => CompareOp::Lt,
                Token::LtE => CompareOp::LtE,
                _ => break,
            };
            self.advance();
            chain.push((op, self.parse_arith()?));
        }
        Ok(if chain.is_empty() {
            left
        } else {
            Expr::Compare(Box::new(left), chain)
        })
    }

    fn parse_arith(&mut self) -> CoreResult<Expr> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Token::Plus => ArithOp::Add,
                Token::Minus => ArithOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            left = Expr::BinOp(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> CoreResult<Expr> {
        let mut left = self.parse_primary()?;
        loop {
            let op = match self.peek() {
                Token::Star => ArithOp::Mul,
                Token::Slash => ArithOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_primary()?;
            left = Expr::BinOp(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> CoreResult<Expr> {
        match self.advance() {
            Token::Number(n) => Ok(Expr::NumberLit(n)),
            Token::Str(s) => Ok(Expr::StringLit(s)),
            Token::True => Ok(Expr::BoolLit(true)),
            Token::False => Ok(Expr::BoolLit(false)),
            Token::Minus => {
                let inner = self.parse_primary()?;
                Ok(Expr::BinOp(
                    Box::new(Expr::NumberLit(0.0)),
                    ArithOp::Sub,
                    Box::new(inner),
                ))
            }
            Token::Ident(name) => {
                let mut expr = Expr::Ident(name);
                while *self.peek() == Token::Dot {
                    self.advance();
                    match self.advance() {
                        Token::Ident(attr) => expr = Expr::Attr(Box::new(expr), attr),
                        other => {
                            return Err(CoreError::InvalidExpression(format!(
                                "expected attribute name, got {other:?}"
                            )))
                        }
                    }
                }
                Ok(expr)
            }
            Token::LParen => {
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            other => Err(CoreError::InvalidExpression(format!(
                "unsupported expression token {other:?}"
            ))),
        }
    }
}

fn parse(expression: &str) -> CoreResult<Expr> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr()?;
    if *parser.peek() != Token::Eof {
        return Err(CoreError::InvalidExpression(format!(
            "trailing tokens after expression {expression:?}"
        )));
    }
    Ok(expr)
}

fn as_number(v: &Value, context_desc: &str) -> CoreResult<f64> {
    v.as_f64().ok_or_else(|| {
        CoreError::InvalidExpression(format!("expected a number in {context_desc}, got {v}"))
    })
}

fn eval_node(node: &Expr, context: &Map<String, Value>, allowed_symbols: &HashSet<String>) -> CoreResult<Value> {
    match node {
        Expr::NumberLit(n) => Ok(serde_json::json!(n)),
        Expr::StringLit(s) => Ok(Value::String(s.clone())),
        Expr::BoolLit(b) => Ok(Value::Bool(*b)),
        Expr::Ident(name) => {
            if !allowed_symbols.contains(name) {
                return Err(CoreError::InvalidExpression(format!(
                    "unknown symbol: {name}"
                )));
            }
            context.get(name).cloned().ok_or_else(|| {
                CoreError::InvalidExpression(format!("missing symbol in context: {name}"))
            })
        }
        Expr::Attr(base, attr) => {
            let value = eval_node(base, context, allowed_symbols)?;
            match value {
                Value::Object(map) => map.get(attr).cloned().ok_or_else(|| {
                    CoreError::InvalidExpression(format!("unknown attribute: {attr}"))
                }),
                other => Err(CoreError::InvalidExpression(format!(
                    "unsupported attribute base: {other}"
                ))),
            }
        }
        Expr::Not(inner) => {
            let v = eval_node(inner, context, allowed_symbols)?;
            Ok(Value::Bool(!truthy(&v)))
        }
        Expr::BoolOp(kind, terms) => {
            let mut result = matches!(kind, BoolOpKind::And);
            for (i, term) in terms.iter().enumerate() {
                let v = truthy(&eval_node(term, context, allowed_symbols)?);
                result = match kind {
                    BoolOpKind::And => {
                        if i == 0 {
                            v
                        } else {
                            result && v
                        }
                    }
                    BoolOpKind::Or => {
                        if i == 0 {
                            v
                        } else {
                            result || v
                        }
                    }
                };
            }
            Ok(Value::Bool(result))
        }
        Expr::BinOp(left, op, right) => {
            let l = as_number(&eval_node(left, context, allowed_symbols)?, "arithmetic")?;
            let r = as_number(&eval_node(right, context, allowed_symbols)?, "arithmetic")?;
            let result = match op {
                ArithOp::Add => l + r,
                ArithOp::Sub => l - r,
                ArithOp::Mul => l * r,
                ArithOp::Div => l / r,
            };
            Ok(serde_json::json!(result))
        }
        Expr::Compare(left, chain) => {
            let mut left_val = eval_node(left, context, allowed_symbols)?;
            for (op, rhs) in chain {
                let right_val = eval_node(rhs, context, allowed_symbols)?;
                let ok = match op {
                    CompareOp::Eq => left_val == right_val,
                    CompareOp::NotEq => left_val != right_val,
                    CompareOp::Gt => as_number(&left_val, "comparison")? > as_number(&right_val, "comparison")?,
                    CompareOp::GtE => as_number(&left_val, "comparison")? >= as_number(&right_val, "comparison")?,
                    CompareOp::Lt => as_number(&left_val, "comparison")? < as_number(&right_val, "comparison")?,
                    CompareOp::LtE => as_number(&left_val, "comparison")? <= as_number(&right_val, "comparison")?,
                };
                if !ok {
                    return Ok(Value::Bool(false));
                }
                left_val = right_val;
            }
            Ok(Value::Bool(true))
        }
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Evaluates `expression` to a boolean under `context`, restricted to the
/// top-level identifiers in `allowed_symbols`. Any node outside the closed
/// set this module supports fails with [`CoreError::InvalidExpression`]; an
/// identifier not in `allowed_symbols` fails the same way, never silently
/// resolving to a default.
pub fn evaluate_expression(
    expression: &str,
    context: &Map<String, Value>,
    allowed_symbols: &HashSet<String>,
) -> CoreResult<bool> {
    let tree = parse(expression)?;
    let result = eval_node(&tree, context, allowed_symbols)?;
    Ok(truthy(&result))
}
