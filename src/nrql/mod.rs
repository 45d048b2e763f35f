//! NRQL generation.
//!
//! Queries are built as typed values (`QueryModel`, `Expr`) and only turned
//! into text at the very end through a `TokenStream`, so quoting, escaping
//! and clause ordering live in one place.
//!
//! ```text
//! QueryModel ──to_tokens()──▶ TokenStream ──serialize()──▶ NRQL text
//!     │
//!     └── Source::Nested(QueryModel) renders as FROM ( ... )
//! ```

pub mod expr;
pub mod model;
pub mod time;
pub mod token;

pub use expr::{Expr, ExprExt, Literal};
pub use model::{EventSource, Limit, ModelError, Predicate, Projection, QueryModel, Source};
pub use time::{TimeUnit, TimeWindow};
pub use token::{Token, TokenStream};
