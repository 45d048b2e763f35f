//! Dashboard filters.
//!
//! Raw user selections go through two stages:
//!
//! ```text
//! RawSelection[] ──normalize()──▶ FilterSpec[] + warnings
//!                                      │
//!                        transform(provider, entity, purpose)
//!                                      ▼
//!                                 Predicate[]  (fed to the builder)
//! ```
//!
//! The registry owns the per-kind rules (allowed operators, exclusivity,
//! `depends_on`). Normalization never fails; problems become warnings.

mod normalize;
mod registry;
mod transform;

pub use normalize::Normalized;
pub use registry::{FilterOption, FilterRegistry, KindRule};
pub use transform::{transform, QueryPurpose};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::Provider;

// =============================================================================
// Kinds and operators
// =============================================================================

/// What a filter constrains.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Provider,
    Account,
    /// Derived health status; applied after derivation, never in the query.
    Status,
    Cluster,
    Topic,
    /// Free-text search over entity names.
    Search,
    /// Any other attribute of the listed entity's event.
    Custom(String),
}

impl FilterKind {
    pub fn class(&self) -> KindClass {
        match self {
            FilterKind::Provider => KindClass::Provider,
            FilterKind::Account => KindClass::Account,
            FilterKind::Status => KindClass::Status,
            FilterKind::Cluster => KindClass::Cluster,
            FilterKind::Topic => KindClass::Topic,
            FilterKind::Search => KindClass::Search,
            FilterKind::Custom(_) => KindClass::Custom,
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterKind::Custom(attribute) => write!(f, "custom({})", attribute),
            other => write!(f, "{}", other.class()),
        }
    }
}

/// A filter kind with any attribute payload erased; the registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KindClass {
    Provider,
    Account,
    Status,
    Cluster,
    Topic,
    Search,
    Custom,
}

impl KindClass {
    pub fn as_str(self) -> &'static str {
        match self {
            KindClass::Provider => "provider",
            KindClass::Account => "account",
            KindClass::Status => "status",
            KindClass::Cluster => "cluster",
            KindClass::Topic => "topic",
            KindClass::Search => "search",
            KindClass::Custom => "custom",
        }
    }
}

impl fmt::Display for KindClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filter operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    In,
    NotIn,
    Contains,
    Equals,
    /// Regular expression match.
    Matches,
}

impl FilterOperator {
    pub fn is_negated(self) -> bool {
        matches!(self, FilterOperator::NotIn)
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FilterOperator::In => "in",
            FilterOperator::NotIn => "not_in",
            FilterOperator::Contains => "contains",
            FilterOperator::Equals => "equals",
            FilterOperator::Matches => "matches",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Selections and specs
// =============================================================================

/// One filter application as received from the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSelection {
    pub kind: FilterKind,
    pub operator: FilterOperator,
    #[serde(default)]
    pub values: Vec<String>,
}

impl RawSelection {
    pub fn new<S: Into<String>>(
        kind: FilterKind,
        operator: FilterOperator,
        values: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            kind,
            operator,
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// A normalized filter.
///
/// Values keep their first-seen order for display; equality ignores order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSpec {
    pub kind: FilterKind,
    pub operator: FilterOperator,
    pub values: Vec<String>,
    /// Prerequisite kind, filled in from the registry.
    pub depends_on: Option<KindClass>,
}

impl FilterSpec {
    fn sorted_values(&self) -> Vec<&str> {
        let mut values: Vec<&str> = self.values.iter().map(String::as_str).collect();
        values.sort_unstable();
        values.dedup();
        values
    }
}

impl PartialEq for FilterSpec {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.operator == other.operator
            && self.depends_on == other.depends_on
            && self.sorted_values() == other.sorted_values()
    }
}

impl Eq for FilterSpec {}

/// The common dashboard selection shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selections {
    pub provider: Option<Provider>,
    pub account_id: Option<String>,
    #[serde(default)]
    pub clusters: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub status: Option<String>,
    pub search: Option<String>,
}

impl Selections {
    /// Expand into raw selections in a fixed order.
    pub fn to_raw(&self) -> Vec<RawSelection> {
        let mut raw = Vec::new();
        if let Some(provider) = self.provider {
            raw.push(RawSelection::new(
                FilterKind::Provider,
                FilterOperator::Equals,
                [provider.as_str()],
            ));
        }
        if let Some(account) = &self.account_id {
            raw.push(RawSelection::new(
                FilterKind::Account,
                FilterOperator::Equals,
                [account.as_str()],
            ));
        }
        if !self.clusters.is_empty() {
            raw.push(RawSelection::new(
                FilterKind::Cluster,
                FilterOperator::In,
                self.clusters.iter().map(String::as_str),
            ));
        }
        if !self.topics.is_empty() {
            raw.push(RawSelection::new(
                FilterKind::Topic,
                FilterOperator::In,
                self.topics.iter().map(String::as_str),
            ));
        }
        if let Some(status) = &self.status {
            raw.push(RawSelection::new(
                FilterKind::Status,
                FilterOperator::Equals,
                [status.as_str()],
            ));
        }
        if let Some(search) = self.search.as_ref().filter(|s| !s.trim().is_empty()) {
            raw.push(RawSelection::new(
                FilterKind::Search,
                FilterOperator::Contains,
                [search.trim()],
            ));
        }
        raw
    }
}

// =============================================================================
// Warnings and errors
// =============================================================================

/// A recoverable problem found while normalizing. The offending input is
/// dropped and processing continues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterWarning {
    InvalidFilterOperator {
        kind: FilterKind,
        operator: FilterOperator,
    },
    InvalidPattern {
        pattern: String,
        message: String,
    },
    /// A dependent filter lost its values because its prerequisite is empty.
    Collapsed {
        kind: FilterKind,
        prerequisite: KindClass,
    },
}

impl fmt::Display for FilterWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterWarning::InvalidFilterOperator { kind, operator } => {
                write!(f, "operator '{}' is not valid for filter '{}'", operator, kind)
            }
            FilterWarning::InvalidPattern { pattern, message } => {
                write!(f, "invalid pattern '{}': {}", pattern, message)
            }
            FilterWarning::Collapsed { kind, prerequisite } => {
                write!(f, "filter '{}' cleared: no {} selected", kind, prerequisite)
            }
        }
    }
}

/// Filter errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error("filter dependency cycle: {}", format_cycle(.cycle))]
    CyclicDependency { cycle: Vec<KindClass> },

    #[error("no event of {provider} exposes '{dimension}' (listing {event_type})")]
    UnresolvedPredicateTarget {
        provider: Provider,
        dimension: String,
        event_type: String,
    },
}

fn format_cycle(cycle: &[KindClass]) -> String {
    cycle
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

pub type FilterResult<T> = Result<T, FilterError>;
