//! Metric derivation.
//!
//! Turns raw per-entity rows into normalized health and throughput figures.
//! Derivation is total: every row that parses yields a metric, whatever its
//! values.

mod row;
pub mod rules;

pub use row::{parse_row, MalformedRow, RowLayout};
pub use rules::{assess, Assessment};

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::schema::{fields, EntityType, Provider};

// =============================================================================
// Status and severity
// =============================================================================

/// Derived health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Critical,
    Warning,
    Healthy,
    Unknown,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Critical => "critical",
            HealthStatus::Warning => "warning",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unknown => "unknown",
        }
    }

    /// Warning and critical both count as unhealthy.
    pub fn is_unhealthy(self) -> bool {
        matches!(self, HealthStatus::Warning | HealthStatus::Critical)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HealthStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(HealthStatus::Critical),
            "warning" => Ok(HealthStatus::Warning),
            "healthy" => Ok(HealthStatus::Healthy),
            "unknown" => Ok(HealthStatus::Unknown),
            _ => Err(format!("unknown health status: {}", s)),
        }
    }
}

/// Alert severity, declared in display order (most severe first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    Critical,
    High,
    Warning,
    Low,
    NotConfigured,
    NotAlerting,
}

impl AlertSeverity {
    pub const ORDER: [AlertSeverity; 6] = [
        AlertSeverity::Critical,
        AlertSeverity::High,
        AlertSeverity::Warning,
        AlertSeverity::Low,
        AlertSeverity::NotConfigured,
        AlertSeverity::NotAlerting,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AlertSeverity::Critical => "CRITICAL",
            AlertSeverity::High => "HIGH",
            AlertSeverity::Warning => "WARNING",
            AlertSeverity::Low => "LOW",
            AlertSeverity::NotConfigured => "NOT_CONFIGURED",
            AlertSeverity::NotAlerting => "NOT_ALERTING",
        }
    }

    /// Severity implied by a derived status when the platform reports none.
    pub fn from_status(status: HealthStatus) -> Self {
        match status {
            HealthStatus::Critical => AlertSeverity::Critical,
            HealthStatus::Warning => AlertSeverity::Warning,
            HealthStatus::Healthy => AlertSeverity::NotAlerting,
            HealthStatus::Unknown => AlertSeverity::NotConfigured,
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        AlertSeverity::ORDER
            .into_iter()
            .find(|sev| sev.as_str() == wanted)
            .ok_or_else(|| format!("unknown alert severity: {}", s))
    }
}

// =============================================================================
// Rows and derived metrics
// =============================================================================

/// One entity's raw values as returned by a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEntityRow {
    pub provider: Provider,
    pub entity_type: EntityType,
    pub entity_id: String,
    /// Numeric values by field name; `None` when reported as null.
    pub values: BTreeMap<String, Option<f64>>,
    /// String attributes such as `alertSeverity` or the cluster name.
    pub tags: BTreeMap<String, String>,
}

impl RawEntityRow {
    pub fn new(provider: Provider, entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        Self {
            provider,
            entity_type,
            entity_id: entity_id.into(),
            values: BTreeMap::new(),
            tags: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, field: &str, value: f64) -> Self {
        self.values.insert(field.to_string(), Some(value));
        self
    }

    pub fn with_null(mut self, field: &str) -> Self {
        self.values.insert(field.to_string(), None);
        self
    }

    pub fn with_tag(mut self, name: &str, value: &str) -> Self {
        self.tags.insert(name.to_string(), value.to_string());
        self
    }

    /// A value, treating null and non-finite numbers as absent.
    pub fn value(&self, field: &str) -> Option<f64> {
        self.values
            .get(field)
            .copied()
            .flatten()
            .filter(|v| v.is_finite())
    }
}

/// Normalized health and throughput of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedEntityMetric {
    pub entity_id: String,
    pub entity_type: EntityType,
    pub provider: Provider,
    /// 0..=100
    pub health_score: u8,
    pub health_status: HealthStatus,
    pub alert_severity: AlertSeverity,
    pub figures: BTreeMap<String, f64>,
    pub tags: BTreeMap<String, String>,
}

impl DerivedEntityMetric {
    pub fn figure(&self, name: &str) -> Option<f64> {
        self.figures.get(name).copied()
    }

    pub fn cluster(&self) -> Option<&str> {
        self.tags.get(fields::CLUSTER_TAG).map(String::as_str)
    }
}

/// Derived figure names.
pub mod figures {
    pub use crate::schema::fields::{
        BYTES_IN_PER_SEC, BYTES_OUT_PER_SEC, MESSAGES_IN_PER_SEC, PARTITION_COUNT,
    };

    pub const THROUGHPUT: &str = "throughput";
    pub const UTILIZATION: &str = "utilization";
    pub const FAN_OUT_RATIO: &str = "fanOutRatio";
}

/// Derive one entity's health. Never fails.
pub fn derive_health(row: &RawEntityRow) -> DerivedEntityMetric {
    let assessment = assess(row.provider, row.entity_type, |field| row.value(field));

    let alert_severity = row
        .tags
        .get(fields::ALERT_SEVERITY)
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| AlertSeverity::from_status(assessment.status));

    DerivedEntityMetric {
        entity_id: row.entity_id.clone(),
        entity_type: row.entity_type,
        provider: row.provider,
        health_score: assessment.score.min(100),
        health_status: assessment.status,
        alert_severity,
        figures: derive_figures(row),
        tags: row.tags.clone(),
    }
}

fn derive_figures(row: &RawEntityRow) -> BTreeMap<String, f64> {
    let mut out = BTreeMap::new();
    let mut put = |name: &str, value: Option<f64>| {
        if let Some(v) = value {
            out.insert(name.to_string(), v);
        }
    };

    let bytes_in = row.value(fields::BYTES_IN_PER_SEC);
    let bytes_out = row.value(fields::BYTES_OUT_PER_SEC);

    put(figures::BYTES_IN_PER_SEC, bytes_in);
    put(figures::BYTES_OUT_PER_SEC, bytes_out);
    put(figures::MESSAGES_IN_PER_SEC, row.value(fields::MESSAGES_IN_PER_SEC));
    put(figures::PARTITION_COUNT, row.value(fields::PARTITION_COUNT));

    if bytes_in.is_some() || bytes_out.is_some() {
        put(
            figures::THROUGHPUT,
            Some(bytes_in.unwrap_or(0.0) + bytes_out.unwrap_or(0.0)),
        );
    }
    if let (Some(i), Some(o)) = (bytes_in, bytes_out) {
        if i > 0.0 {
            put(figures::FAN_OUT_RATIO, Some(o / i));
        }
    }
    if row.provider == Provider::ConfluentCloud {
        put(figures::UTILIZATION, row.value(fields::CLUSTER_LOAD_PERCENT));
    }
    out
}

// =============================================================================
// Batches
// =============================================================================

/// Result of deriving a whole result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivationBatch {
    pub metrics: Vec<DerivedEntityMetric>,
    /// Rows that could not be parsed.
    pub skipped: usize,
    pub problems: Vec<MalformedRow>,
}

/// Parse and derive every row; malformed rows are skipped and counted.
pub fn derive_batch(rows: &[serde_json::Value], layout: &RowLayout) -> DerivationBatch {
    let mut batch = DerivationBatch::default();
    for value in rows {
        match parse_row(value, layout) {
            Ok(row) => batch.metrics.push(derive_health(&row)),
            Err(problem) => {
                tracing::warn!(%problem, "skipping malformed row");
                batch.skipped += 1;
                batch.problems.push(problem);
            }
        }
    }
    batch
}
