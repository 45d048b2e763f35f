//! Provider query catalog.
//!
//! A static table of query templates, one per `(provider, metric)` pair.
//! Templates are plain `QueryModel` values; the builder clones one and
//! splices filters, facets and the time window into it.
//!
//! ```text
//! (AWS_MSK, BYTES_IN_PER_SEC)
//!     SELECT sum(bytesIn) AS bytesInPerSec FROM (
//!         SELECT latest(provider.bytesInPerSec.Average) AS bytesIn
//!         FROM AwsMskBrokerSample
//!         FACET provider.clusterName, provider.brokerId LIMIT MAX)
//! ```

mod aws_msk;
mod confluent;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::nrql::{ModelError, QueryModel};
use crate::schema::{EntityType, Provider};

// =============================================================================
// Metric identifiers
// =============================================================================

/// A dashboard metric a template can answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricId {
    ClusterCount,
    UnhealthyClusters,
    ClusterHealth,
    BrokerHealth,
    TopicCount,
    PartitionCount,
    BytesInPerSec,
    BytesOutPerSec,
    MessagesInPerSec,
    TopicThroughput,
    ThroughputTimeseries,
}

impl MetricId {
    pub const ALL: [MetricId; 11] = [
        MetricId::ClusterCount,
        MetricId::UnhealthyClusters,
        MetricId::ClusterHealth,
        MetricId::BrokerHealth,
        MetricId::TopicCount,
        MetricId::PartitionCount,
        MetricId::BytesInPerSec,
        MetricId::BytesOutPerSec,
        MetricId::MessagesInPerSec,
        MetricId::TopicThroughput,
        MetricId::ThroughputTimeseries,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricId::ClusterCount => "CLUSTER_COUNT",
            MetricId::UnhealthyClusters => "UNHEALTHY_CLUSTERS",
            MetricId::ClusterHealth => "CLUSTER_HEALTH",
            MetricId::BrokerHealth => "BROKER_HEALTH",
            MetricId::TopicCount => "TOPIC_COUNT",
            MetricId::PartitionCount => "PARTITION_COUNT",
            MetricId::BytesInPerSec => "BYTES_IN_PER_SEC",
            MetricId::BytesOutPerSec => "BYTES_OUT_PER_SEC",
            MetricId::MessagesInPerSec => "MESSAGES_IN_PER_SEC",
            MetricId::TopicThroughput => "TOPIC_THROUGHPUT",
            MetricId::ThroughputTimeseries => "THROUGHPUT_TIMESERIES",
        }
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_ascii_uppercase().replace('-', "_");
        MetricId::ALL
            .into_iter()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| format!("unknown metric: {}", s))
    }
}

// =============================================================================
// Template
// =============================================================================

/// How the execution service frames the result rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultShape {
    /// One row, one or more named values.
    Single,
    /// One row per facet value.
    Faceted,
    /// One row per time bucket.
    TimeSeries,
}

/// Volatility class of a template's data; selects the cache TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataClass {
    /// Entity counts and relationships; changes rarely.
    Topology,
    /// Rates and health inputs; changes every collection interval.
    LiveMetric,
}

/// A static query for one metric of one provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Template {
    pub provider: Provider,
    pub metric: MetricId,
    /// Entity type the rows describe.
    pub entity_type: EntityType,
    pub shape: ResultShape,
    pub data_class: DataClass,
    /// Declared number of aggregation levels.
    pub nesting: usize,
    pub model: QueryModel,
}

impl Template {
    pub fn to_nrql(&self) -> String {
        self.model.to_nrql()
    }
}

/// Shorthand used by the provider tables.
struct Spec {
    metric: MetricId,
    entity_type: EntityType,
    shape: ResultShape,
    data_class: DataClass,
    nesting: usize,
}

impl Spec {
    fn into_template(self, provider: Provider, model: QueryModel) -> Template {
        Template {
            provider,
            metric: self.metric,
            entity_type: self.entity_type,
            shape: self.shape,
            data_class: self.data_class,
            nesting: self.nesting,
            model,
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Catalog errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogError {
    #[error("no {metric} template registered for provider {provider}")]
    TemplateNotFound { provider: Provider, metric: MetricId },

    #[error("template {provider}/{metric} declares nesting {declared} but its model has {actual} levels")]
    NestingMismatch {
        provider: Provider,
        metric: MetricId,
        declared: usize,
        actual: usize,
    },

    #[error("template {provider}/{metric} is invalid: {source}")]
    InvalidTemplate {
        provider: Provider,
        metric: MetricId,
        #[source]
        source: ModelError,
    },
}

pub type CatalogResult<T> = Result<T, CatalogError>;

// =============================================================================
// Catalog
// =============================================================================

/// Registered templates keyed by provider and metric.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    templates: BTreeMap<(Provider, MetricId), Template>,
}

impl Catalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in templates for both providers.
    pub fn standard() -> Self {
        let mut catalog = Self::empty();
        for template in aws_msk::templates()
            .into_iter()
            .chain(confluent::templates())
        {
            // The built-in tables are covered by tests; a bad entry is a bug.
            if let Err(e) = catalog.register(template) {
                tracing::error!(error = %e, "skipping built-in template");
            }
        }
        catalog
    }

    /// Add or replace a template after checking it.
    pub fn register(&mut self, template: Template) -> CatalogResult<()> {
        let (provider, metric) = (template.provider, template.metric);
        template
            .model
            .validate()
            .map_err(|source| CatalogError::InvalidTemplate {
                provider,
                metric,
                source,
            })?;
        let actual = template.model.depth();
        if actual != template.nesting {
            return Err(CatalogError::NestingMismatch {
                provider,
                metric,
                declared: template.nesting,
                actual,
            });
        }
        self.templates.insert((provider, metric), template);
        Ok(())
    }

    /// Look up the template for a pair. Never falls back to another provider.
    pub fn build_template(&self, provider: Provider, metric: MetricId) -> CatalogResult<&Template> {
        self.templates
            .get(&(provider, metric))
            .ok_or(CatalogError::TemplateNotFound { provider, metric })
    }

    /// All templates, ordered by provider then metric.
    pub fn templates(&self) -> impl Iterator<Item = &Template> {
        self.templates.values()
    }

    /// Metrics registered for a provider.
    pub fn metrics(&self, provider: Provider) -> Vec<MetricId> {
        self.templates
            .keys()
            .filter(|(p, _)| *p == provider)
            .map(|(_, m)| *m)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
