//! External collaborators: the query execution service and entity search.
//!
//! Neither trait knows about wire formats. Implementations own transport,
//! authentication and response framing; the pipeline only sees rows.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::ExecutionError;
use crate::catalog::ResultShape;
use crate::filter::KindClass;
use crate::nrql::token::quote_string;
use crate::schema::{EntitySchema, EntityType, Provider};

/// Rows returned by one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub rows: Vec<serde_json::Value>,
}

impl QueryResult {
    pub fn new(rows: Vec<serde_json::Value>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Runs NRQL against one account.
///
/// # Example
///
/// ```ignore
/// let result = executor
///     .execute("SELECT count(*) FROM AwsMskClusterSample", "123", ResultShape::Single)
///     .await?;
/// ```
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(
        &self,
        nrql: &str,
        account_id: &str,
        shape: ResultShape,
    ) -> Result<QueryResult, ExecutionError>;
}

// =============================================================================
// Entity search
// =============================================================================

/// Entity search domain of all supported Kafka entities.
pub const INFRA_DOMAIN: &str = "INFRA";

/// An entity search in the platform's search vocabulary
/// (`domain`, `type`, `tags.*`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntitySearch {
    pub domain: String,
    pub entity_type: String,
    pub tags: BTreeMap<String, String>,
}

impl EntitySearch {
    pub fn new(domain: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            entity_type: entity_type.into(),
            tags: BTreeMap::new(),
        }
    }

    /// Search for every entity of one schema entry.
    pub fn for_schema(schema: &EntitySchema) -> Self {
        Self::new(INFRA_DOMAIN, schema.search_type)
    }

    pub fn tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(name.into(), value.into());
        self
    }

    /// Render as a search query string.
    pub fn to_query(&self) -> String {
        let mut clauses = vec![
            format!("domain = {}", quote_string(&self.domain)),
            format!("type = {}", quote_string(&self.entity_type)),
        ];
        for (name, value) in &self.tags {
            clauses.push(format!("tags.`{}` = {}", name, quote_string(value)));
        }
        clauses.join(" AND ")
    }
}

/// One entity returned by a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub guid: String,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub tags: BTreeMap<String, Vec<String>>,
}

impl EntityRecord {
    /// First value of a tag.
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

/// Tag holding an entity's owning cluster.
pub fn cluster_tag(provider: Provider) -> &'static str {
    match provider {
        Provider::AwsMsk => "aws.kafka.ClusterName",
        Provider::ConfluentCloud => "kafka.cluster_id",
    }
}

/// Resolves cluster, broker and topic relationships.
#[async_trait]
pub trait EntityLookup: Send + Sync {
    async fn search(
        &self,
        search: &EntitySearch,
        account_id: &str,
    ) -> Result<Vec<EntityRecord>, ExecutionError>;
}

/// Entity types offered as filter options.
pub fn option_entity_type(kind: KindClass) -> Option<EntityType> {
    match kind {
        KindClass::Cluster => Some(EntityType::Cluster),
        KindClass::Topic => Some(EntityType::Topic),
        _ => None,
    }
}
