//! Query model - an immutable, nestable representation of one NRQL query.
//!
//! A `QueryModel` is one aggregation level. Its source is either an event
//! type or another complete `QueryModel`, which is how nested aggregation
//! ("sum of per-broker latest values") is expressed.

use serde::Serialize;

use super::expr::{BinaryOperator, Expr};
use super::time::TimeWindow;
use super::token::{Token, TokenStream};

// =============================================================================
// Projection
// =============================================================================

/// A SELECT list item: expression with optional alias.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Projection {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl Projection {
    pub fn new(expr: Expr) -> Self {
        Self { expr, alias: None }
    }

    pub fn to_tokens(&self) -> TokenStream {
        let mut ts = self.expr.to_tokens();
        if let Some(alias) = &self.alias {
            ts.space()
                .push(Token::As)
                .space()
                .push(Token::Ident(alias.clone()));
        }
        ts
    }
}

impl From<Expr> for Projection {
    fn from(expr: Expr) -> Self {
        Projection::new(expr)
    }
}

// =============================================================================
// Source
// =============================================================================

/// An event type together with the dimensions its samples carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventSource {
    pub event_type: String,
    pub dimensions: Vec<String>,
}

impl EventSource {
    pub fn new(event_type: &str, dimensions: &[&str]) -> Self {
        Self {
            event_type: event_type.into(),
            dimensions: dimensions.iter().map(|d| (*d).to_string()).collect(),
        }
    }
}

/// Where a query level reads its rows from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Source {
    Event(EventSource),
    Nested(Box<QueryModel>),
}

// =============================================================================
// Predicate
// =============================================================================

/// A WHERE condition tagged with the dimension it constrains.
///
/// The dimension decides which aggregation level the condition belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Predicate {
    pub dimension: String,
    pub expr: Expr,
}

impl Predicate {
    pub fn new(dimension: &str, expr: Expr) -> Self {
        Self {
            dimension: dimension.into(),
            expr,
        }
    }

    pub fn to_tokens(&self) -> TokenStream {
        match &self.expr {
            // OR-groups keep their own parentheses when ANDed with siblings.
            Expr::BinaryOp {
                op: BinaryOperator::Or,
                ..
            } => {
                let mut ts = TokenStream::new();
                ts.lparen().append(&self.expr.to_tokens()).rparen();
                ts
            }
            other => other.to_tokens(),
        }
    }
}

// =============================================================================
// LIMIT
// =============================================================================

/// Row limit of one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Limit {
    /// Service default (no LIMIT clause)
    #[default]
    Default,
    /// `LIMIT n`, for paginated display
    Count(u64),
    /// `LIMIT MAX`, required whenever rows feed an aggregate
    Max,
}

impl Limit {
    fn to_tokens(self) -> Option<TokenStream> {
        let mut ts = TokenStream::new();
        match self {
            Limit::Default => return None,
            Limit::Count(n) => {
                let n = i64::try_from(n).unwrap_or(i64::MAX);
                ts.push(Token::Limit).space().push(Token::LitInt(n))
            }
            Limit::Max => ts.push(Token::Limit).space().push(Token::Max),
        };
        Some(ts)
    }
}

// =============================================================================
// Query model
// =============================================================================

/// Structural problems with a query model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("query level {level} has no projections")]
    EmptyProjection { level: usize },

    #[error("nested query level {level} may not carry its own time window or TIMESERIES")]
    NestedTimeClause { level: usize },
}

/// One level of a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[must_use = "builders have no effect until used"]
pub struct QueryModel {
    pub source: Source,
    pub projections: Vec<Projection>,
    pub predicates: Vec<Predicate>,
    pub group_by: Vec<Expr>,
    pub limit: Limit,
    pub time_window: Option<TimeWindow>,
    pub time_series: bool,
}

impl QueryModel {
    /// A query reading the given event type.
    pub fn from_event(event: EventSource) -> Self {
        Self::with_source(Source::Event(event))
    }

    /// A query aggregating the rows of another query.
    pub fn from_query(inner: QueryModel) -> Self {
        Self::with_source(Source::Nested(Box::new(inner)))
    }

    fn with_source(source: Source) -> Self {
        Self {
            source,
            projections: vec![],
            predicates: vec![],
            group_by: vec![],
            limit: Limit::Default,
            time_window: None,
            time_series: false,
        }
    }

    /// Set the SELECT list.
    pub fn select(mut self, exprs: Vec<impl Into<Projection>>) -> Self {
        self.projections = exprs.into_iter().map(Into::into).collect();
        self
    }

    /// Add a WHERE condition (ANDed with existing conditions).
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Set the FACET clause.
    pub fn facet(mut self, exprs: Vec<Expr>) -> Self {
        self.group_by = exprs;
        self
    }

    pub fn limit(mut self, limit: Limit) -> Self {
        self.limit = limit;
        self
    }

    pub fn since(mut self, window: TimeWindow) -> Self {
        self.time_window = Some(window);
        self
    }

    pub fn timeseries(mut self) -> Self {
        self.time_series = true;
        self
    }

    /// Number of aggregation levels, 1 for a flat query.
    pub fn depth(&self) -> usize {
        match &self.source {
            Source::Event(_) => 1,
            Source::Nested(inner) => 1 + inner.depth(),
        }
    }

    pub fn inner(&self) -> Option<&QueryModel> {
        match &self.source {
            Source::Nested(inner) => Some(inner),
            Source::Event(_) => None,
        }
    }

    pub fn inner_mut(&mut self) -> Option<&mut QueryModel> {
        match &mut self.source {
            Source::Nested(inner) => Some(inner),
            Source::Event(_) => None,
        }
    }

    /// The event type read by the innermost level.
    pub fn event(&self) -> &EventSource {
        match &self.source {
            Source::Event(event) => event,
            Source::Nested(inner) => inner.event(),
        }
    }

    /// Dimensions a predicate at this level can constrain: the event's
    /// dimensions, or whatever the nested level emits.
    pub fn input_dimensions(&self) -> Vec<String> {
        match &self.source {
            Source::Event(event) => event.dimensions.clone(),
            Source::Nested(inner) => inner.output_dimensions(),
        }
    }

    /// Columns this level emits: facet attributes and projection aliases.
    pub fn output_dimensions(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for expr in &self.group_by {
            for name in expr.attributes() {
                if !out.iter().any(|o| o == name) {
                    out.push(name.to_string());
                }
            }
        }
        for alias in self.projections.iter().filter_map(|p| p.alias.as_ref()) {
            if !out.contains(alias) {
                out.push(alias.clone());
            }
        }
        out
    }

    /// Check structural invariants of every level.
    pub fn validate(&self) -> Result<(), ModelError> {
        self.validate_level(0)
    }

    fn validate_level(&self, level: usize) -> Result<(), ModelError> {
        if self.projections.is_empty() {
            return Err(ModelError::EmptyProjection { level });
        }
        if level > 0 && (self.time_window.is_some() || self.time_series) {
            return Err(ModelError::NestedTimeClause { level });
        }
        match &self.source {
            Source::Nested(inner) => inner.validate_level(level + 1),
            Source::Event(_) => Ok(()),
        }
    }

    /// Sort value lists and AND-ed predicates at every level so that
    /// equivalent queries serialize identically.
    pub fn canonicalize(&mut self) {
        for predicate in &mut self.predicates {
            predicate.expr.canonicalize();
        }
        self.predicates.sort_by_cached_key(|p| p.to_tokens().serialize());
        self.predicates.dedup();
        if let Source::Nested(inner) = &mut self.source {
            inner.canonicalize();
        }
    }

    /// Convert to token stream.
    pub fn to_tokens(&self) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.push(Token::Select).space();
        for (i, projection) in self.projections.iter().enumerate() {
            if i > 0 {
                ts.comma().space();
            }
            ts.append(&projection.to_tokens());
        }

        ts.space().push(Token::From).space();
        match &self.source {
            Source::Event(event) => {
                ts.push(Token::EventType(event.event_type.clone()));
            }
            Source::Nested(inner) => {
                ts.lparen().append(&inner.to_tokens()).rparen();
            }
        }

        if !self.predicates.is_empty() {
            ts.space().push(Token::Where).space();
            for (i, predicate) in self.predicates.iter().enumerate() {
                if i > 0 {
                    ts.space().push(Token::And).space();
                }
                ts.append(&predicate.to_tokens());
            }
        }

        if !self.group_by.is_empty() {
            ts.space().push(Token::Facet).space();
            for (i, expr) in self.group_by.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.append(&expr.to_tokens());
            }
        }

        if let Some(limit) = self.limit.to_tokens() {
            ts.space().append(&limit);
        }

        if let Some(window) = &self.time_window {
            ts.space().append(&window.to_tokens());
        }

        if self.time_series {
            ts.space()
                .push(Token::Timeseries)
                .space()
                .push(Token::Auto);
        }

        ts
    }

    /// Generate the NRQL string.
    pub fn to_nrql(&self) -> String {
        self.to_tokens().serialize()
    }
}

impl std::fmt::Display for QueryModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_nrql())
    }
}

// =============================================================================
// Tests
// =============================================================================
