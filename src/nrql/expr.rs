//! Expression AST - the core of NRQL expression building.
//!
//! This module provides a strongly-typed AST for query expressions
//! with exhaustive pattern matching enforced by the compiler.

use serde::Serialize;

use super::model::QueryModel;
use super::time::TimeUnit;
use super::token::{Token, TokenStream};

// =============================================================================
// Expression AST
// =============================================================================

/// A query expression.
///
/// Every variant must be handled in `to_tokens()` - the compiler enforces this.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "node", content = "args", rename_all = "snake_case")]
pub enum Expr {
    /// Attribute reference: `provider.clusterName`
    Attribute(String),

    /// One semantic dimension published under two attribute names.
    ///
    /// Schemas migrate attribute names and both spellings can coexist in the
    /// same dataset, so every consumer must accept either.
    Either { primary: String, fallback: String },

    /// Literal values
    Literal(Literal),

    /// Binary operation: left op right
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },

    /// NOT expr
    Not(Box<Expr>),

    /// Function call: name(args...)
    Function { name: String, args: Vec<Expr> },

    /// Interval argument: `1 second`
    Interval { amount: u64, unit: TimeUnit },

    /// IN: expr IN (values...)
    In {
        expr: Box<Expr>,
        values: Vec<Literal>,
        negated: bool,
    },

    /// IN subquery: expr IN (SELECT ...)
    InSubquery {
        expr: Box<Expr>,
        subquery: Box<QueryModel>,
        negated: bool,
    },

    /// LIKE with a `%` pattern
    Like {
        expr: Box<Expr>,
        pattern: String,
        negated: bool,
    },

    /// RLIKE with a regular expression
    RLike {
        expr: Box<Expr>,
        pattern: String,
        negated: bool,
    },

    /// IS NULL / IS NOT NULL
    IsNull { expr: Box<Expr>, negated: bool },

    /// Parenthesized expression
    Paren(Box<Expr>),

    /// Wildcard: *
    Star,
}

/// Literal values.
#[derive(Debug, Clone, PartialEq, PartialOrd, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Literal {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Null,
}

impl Literal {
    fn to_token(&self) -> Token {
        match self {
            Literal::Int(n) => Token::LitInt(*n),
            Literal::Float(f) => Token::LitFloat(*f),
            Literal::String(s) => Token::LitString(s.clone()),
            Literal::Bool(b) => Token::LitBool(*b),
            Literal::Null => Token::Null,
        }
    }

    /// Total order used to canonicalize value lists.
    pub(crate) fn canonical_cmp(&self, other: &Literal) -> std::cmp::Ordering {
        self.partial_cmp(other)
            .unwrap_or_else(|| self.to_token().serialize().cmp(&other.to_token().serialize()))
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOperator {
    // Comparison
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    // Logical
    And,
    Or,
    // Arithmetic
    Plus,
    Minus,
    Mul,
    Div,
}

// =============================================================================
// Expression to Tokens
// =============================================================================

impl Expr {
    /// Convert this expression to a token stream.
    pub fn to_tokens(&self) -> TokenStream {
        let mut ts = TokenStream::new();

        match self {
            Expr::Attribute(name) => {
                ts.push(Token::Ident(name.clone()));
            }

            Expr::Either { primary, fallback } => {
                // if(primary IS NOT NULL, primary, fallback)
                ts.push(Token::FunctionName("if".into()))
                    .lparen()
                    .push(Token::Ident(primary.clone()))
                    .space()
                    .push(Token::IsNotNull)
                    .comma()
                    .space()
                    .push(Token::Ident(primary.clone()))
                    .comma()
                    .space()
                    .push(Token::Ident(fallback.clone()))
                    .rparen();
            }

            Expr::Literal(lit) => {
                ts.push(lit.to_token());
            }

            Expr::BinaryOp { left, op, right } => {
                ts.append(&left.to_tokens());
                ts.space();
                ts.push(binary_op_to_token(*op));
                ts.space();
                ts.append(&right.to_tokens());
            }

            Expr::Not(inner) => {
                ts.push(Token::Not).space();
                ts.append(&inner.to_tokens());
            }

            Expr::Function { name, args } => {
                ts.push(Token::FunctionName(name.clone()));
                ts.lparen();
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        ts.comma().space();
                    }
                    ts.append(&arg.to_tokens());
                }
                ts.rparen();
            }

            Expr::Interval { amount, unit } => {
                ts.append(&unit.to_tokens(*amount));
            }

            Expr::In {
                expr,
                values,
                negated,
            } => {
                // An empty list matches nothing; NOT IN of nothing matches everything.
                if values.is_empty() {
                    ts.push(if *negated { Token::True } else { Token::False });
                } else {
                    emit_either_aware(&mut ts, expr, *negated, |ts, target, negated| {
                        ts.append(&target.to_tokens());
                        push_negatable(ts, negated, Token::In);
                        ts.space().lparen();
                        for (i, val) in values.iter().enumerate() {
                            if i > 0 {
                                ts.comma().space();
                            }
                            ts.push(val.to_token());
                        }
                        ts.rparen();
                    });
                }
            }

            Expr::InSubquery {
                expr,
                subquery,
                negated,
            } => {
                emit_either_aware(&mut ts, expr, *negated, |ts, target, negated| {
                    ts.append(&target.to_tokens());
                    push_negatable(ts, negated, Token::In);
                    ts.space().lparen();
                    ts.append(&subquery.to_tokens());
                    ts.rparen();
                });
            }

            Expr::Like {
                expr,
                pattern,
                negated,
            } => {
                emit_either_aware(&mut ts, expr, *negated, |ts, target, negated| {
                    ts.append(&target.to_tokens());
                    push_negatable(ts, negated, Token::Like);
                    ts.space().push(Token::LitString(pattern.clone()));
                });
            }

            Expr::RLike {
                expr,
                pattern,
                negated,
            } => {
                emit_either_aware(&mut ts, expr, *negated, |ts, target, negated| {
                    ts.append(&target.to_tokens());
                    push_negatable(ts, negated, Token::RLike);
                    ts.space().push(Token::LitRegex(pattern.clone()));
                });
            }

            Expr::IsNull { expr, negated } => {
                ts.append(&expr.to_tokens());
                ts.space();
                ts.push(if *negated {
                    Token::IsNotNull
                } else {
                    Token::IsNull
                });
            }

            Expr::Paren(inner) => {
                ts.lparen();
                ts.append(&inner.to_tokens());
                ts.rparen();
            }

            Expr::Star => {
                ts.push(Token::Star);
            }
        }

        ts
    }

    /// Attribute names this expression reads, in first-seen order.
    ///
    /// Subqueries are opaque: only the outer operand is reported.
    pub fn attributes(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_attributes(&mut out);
        out
    }

    fn collect_attributes<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Attribute(name) => push_unique(out, name),
            Expr::Either { primary, fallback } => {
                push_unique(out, primary);
                push_unique(out, fallback);
            }
            Expr::Literal(_) | Expr::Interval { .. } | Expr::Star => {}
            Expr::BinaryOp { left, right, .. } => {
                left.collect_attributes(out);
                right.collect_attributes(out);
            }
            Expr::Not(inner) | Expr::Paren(inner) => inner.collect_attributes(out),
            Expr::Function { args, .. } => {
                for arg in args {
                    arg.collect_attributes(out);
                }
            }
            Expr::In { expr, .. }
            | Expr::InSubquery { expr, .. }
            | Expr::Like { expr, .. }
            | Expr::RLike { expr, .. }
            | Expr::IsNull { expr, .. } => expr.collect_attributes(out),
        }
    }

    /// Sort IN value lists (recursively, including subqueries) so that
    /// selection order never changes the rendered query.
    pub(crate) fn canonicalize(&mut self) {
        match self {
            Expr::In { values, .. } => {
                values.sort_by(Literal::canonical_cmp);
                values.dedup();
            }
            Expr::InSubquery { subquery, .. } => subquery.canonicalize(),
            Expr::BinaryOp { left, right, .. } => {
                left.canonicalize();
                right.canonicalize();
            }
            Expr::Not(inner) | Expr::Paren(inner) => inner.canonicalize(),
            Expr::Function { args, .. } => args.iter_mut().for_each(Expr::canonicalize),
            Expr::Attribute(_)
            | Expr::Either { .. }
            | Expr::Literal(_)
            | Expr::Interval { .. }
            | Expr::Like { .. }
            | Expr::RLike { .. }
            | Expr::IsNull { .. }
            | Expr::Star => {}
        }
    }
}

fn push_unique<'a>(out: &mut Vec<&'a str>, name: &'a str) {
    if !out.contains(&name) {
        out.push(name);
    }
}

/// Emit a membership-style predicate. Against an either-attribute the
/// predicate is applied to both names and OR-combined; negation wraps the
/// whole group so an entity matches when neither spelling matches.
fn emit_either_aware<F>(ts: &mut TokenStream, target: &Expr, negated: bool, emit: F)
where
    F: Fn(&mut TokenStream, &Expr, bool),
{
    match target {
        Expr::Either { primary, fallback } => {
            if negated {
                ts.push(Token::Not).space();
            }
            ts.lparen();
            emit(ts, &attr(primary), false);
            ts.space().push(Token::Or).space();
            emit(ts, &attr(fallback), false);
            ts.rparen();
        }
        other => emit(ts, other, negated),
    }
}

/// `[NOT] <keyword>` after the operand.
fn push_negatable(ts: &mut TokenStream, negated: bool, keyword: Token) {
    ts.space();
    if negated {
        ts.push(Token::Not).space();
    }
    ts.push(keyword);
}

fn binary_op_to_token(op: BinaryOperator) -> Token {
    match op {
        BinaryOperator::Eq => Token::Eq,
        BinaryOperator::Ne => Token::Ne,
        BinaryOperator::Lt => Token::Lt,
        BinaryOperator::Gt => Token::Gt,
        BinaryOperator::Lte => Token::Lte,
        BinaryOperator::Gte => Token::Gte,
        BinaryOperator::And => Token::And,
        BinaryOperator::Or => Token::Or,
        BinaryOperator::Plus => Token::Plus,
        BinaryOperator::Minus => Token::Minus,
        BinaryOperator::Mul => Token::Mul,
        BinaryOperator::Div => Token::Div,
    }
}

// =============================================================================
// Expression Constructors
// =============================================================================

/// Create an attribute reference.
pub fn attr(name: &str) -> Expr {
    Expr::Attribute(name.into())
}

/// Create an either-name attribute reference.
pub fn either(primary: &str, fallback: &str) -> Expr {
    Expr::Either {
        primary: primary.into(),
        fallback: fallback.into(),
    }
}

pub fn lit_int(n: i64) -> Expr {
    Expr::Literal(Literal::Int(n))
}

pub fn lit_float(f: f64) -> Expr {
    Expr::Literal(Literal::Float(f))
}

pub fn lit_str(s: &str) -> Expr {
    Expr::Literal(Literal::String(s.into()))
}

pub fn lit_bool(b: bool) -> Expr {
    Expr::Literal(Literal::Bool(b))
}

/// Generic function call.
pub fn func(name: &str, args: Vec<Expr>) -> Expr {
    Expr::Function {
        name: name.into(),
        args,
    }
}

// =============================================================================
// Aggregate Functions
// =============================================================================

/// latest(expr) - most recent value in the window
pub fn latest(expr: Expr) -> Expr {
    func("latest", vec![expr])
}

pub fn sum(expr: Expr) -> Expr {
    func("sum", vec![expr])
}

pub fn average(expr: Expr) -> Expr {
    func("average", vec![expr])
}

pub fn max(expr: Expr) -> Expr {
    func("max", vec![expr])
}

/// uniqueCount(expr)
pub fn unique_count(expr: Expr) -> Expr {
    func("uniqueCount", vec![expr])
}

/// uniques(expr) - distinct values, used by IN subqueries
pub fn uniques(expr: Expr) -> Expr {
    func("uniques", vec![expr])
}

/// rate(expr, 1 <unit>)
pub fn rate(expr: Expr, per: TimeUnit) -> Expr {
    func("rate", vec![expr, Expr::Interval { amount: 1, unit: per }])
}

// =============================================================================
// Extension trait for fluent expression building
// =============================================================================

/// Extension trait for fluent expression building.
pub trait ExprExt: Sized {
    fn into_expr(self) -> Expr;

    fn eq(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Eq, other.into())
    }

    fn ne(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Ne, other.into())
    }

    fn gt(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Gt, other.into())
    }

    fn lt(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Lt, other.into())
    }

    fn and(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::And, other.into())
    }

    fn or(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Or, other.into())
    }

    fn add(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Plus, other.into())
    }

    fn mul(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Mul, other.into())
    }

    fn div(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Div, other.into())
    }

    #[allow(clippy::wrong_self_convention)]
    fn is_not_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self.into_expr()),
            negated: true,
        }
    }

    fn in_list(self, values: Vec<Literal>) -> Expr {
        Expr::In {
            expr: Box::new(self.into_expr()),
            values,
            negated: false,
        }
    }

    fn not_in_list(self, values: Vec<Literal>) -> Expr {
        Expr::In {
            expr: Box::new(self.into_expr()),
            values,
            negated: true,
        }
    }

    fn in_subquery(self, subquery: QueryModel) -> Expr {
        Expr::InSubquery {
            expr: Box::new(self.into_expr()),
            subquery: Box::new(subquery),
            negated: false,
        }
    }

    fn like(self, pattern: &str) -> Expr {
        Expr::Like {
            expr: Box::new(self.into_expr()),
            pattern: pattern.into(),
            negated: false,
        }
    }

    fn rlike(self, pattern: &str) -> Expr {
        Expr::RLike {
            expr: Box::new(self.into_expr()),
            pattern: pattern.into(),
            negated: false,
        }
    }

    fn paren(self) -> Expr {
        Expr::Paren(Box::new(self.into_expr()))
    }

    /// Alias this expression (for SELECT list).
    fn alias(self, name: &str) -> super::model::Projection {
        super::model::Projection {
            expr: self.into_expr(),
            alias: Some(name.into()),
        }
    }
}

fn binary(left: Expr, op: BinaryOperator, right: Expr) -> Expr {
    Expr::BinaryOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

impl ExprExt for Expr {
    fn into_expr(self) -> Expr {
        self
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        lit_int(n)
    }
}

impl From<f64> for Expr {
    fn from(f: f64) -> Self {
        lit_float(f)
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        lit_str(s)
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        lit_bool(b)
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::String(s.into())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Literal::String(s)
    }
}

// =============================================================================
// Tests
// =============================================================================
