//! # kafkascope
//!
//! Query construction, filtering, caching and health derivation for Kafka
//! dashboards over two telemetry providers (AWS MSK and Confluent Cloud).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │        Selections (provider, account, clusters, ...)     │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [filter]  normalize + transform
//! ┌─────────────────────────────────────────────────────────┐
//! │   Predicates (plain, either-name, correlated subquery)   │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [builder]  catalog template + splice
//! ┌─────────────────────────────────────────────────────────┐
//! │            QueryModel  ──▶  NRQL text  [nrql]            │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [cache] / [pipeline] executor
//! ┌─────────────────────────────────────────────────────────┐
//! │                     Result rows                          │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [health] → [grouping]
//! ┌─────────────────────────────────────────────────────────┐
//! │        Derived entity metrics, grouped by severity       │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod builder;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod filter;
pub mod grouping;
pub mod health;
pub mod nrql;
pub mod pipeline;
pub mod prefs;
pub mod schema;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::builder::{build, BuildError, BuiltQuery};
    pub use crate::cache::{CacheKey, QueryCache};
    pub use crate::catalog::{Catalog, DataClass, MetricId, ResultShape, Template};
    pub use crate::config::Settings;
    pub use crate::filter::{
        FilterKind, FilterOperator, FilterRegistry, FilterSpec, QueryPurpose, RawSelection,
        Selections,
    };
    pub use crate::grouping::{group, GroupKey, GroupedCollection, HealthSummary};
    pub use crate::health::{
        derive_health, AlertSeverity, DerivedEntityMetric, HealthStatus, RawEntityRow,
    };
    pub use crate::nrql::expr::{attr, either, latest, sum};
    pub use crate::nrql::{Expr, ExprExt, QueryModel, TimeWindow};
    pub use crate::pipeline::{
        MetricRequest, Pipeline, PipelineOutput, QueryExecutor, QueryResult, RunOutcome,
    };
    pub use crate::schema::{EntityType, Provider};
}
