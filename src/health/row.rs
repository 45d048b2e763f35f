//! Result rows to [`RawEntityRow`]s.
//!
//! Faceted results carry the facet values in a `facet` member (a string,
//! or an array when several attributes are faceted) and usually repeat
//! them under the attribute names. Numeric columns are the projection
//! aliases from [`fields`].

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::RawEntityRow;
use crate::nrql::{Expr, QueryModel};
use crate::schema::{cluster_dimension, entity, fields, EntityType, Provider};

/// A row that cannot be derived. Skipped and counted, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedRow {
    #[error("row is not an object")]
    NotAnObject,

    #[error("row has no entity identifier")]
    MissingEntityId,

    #[error("entity '{entity_id}': field '{field}' is not numeric")]
    NonNumeric { entity_id: String, field: String },

    #[error("field '{field}' is not numeric")]
    NonNumericValue { field: String },

    #[error("time series row has no '{0}'")]
    MissingTimestamp(&'static str),
}

/// Where the entity id and facet values live in a result row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowLayout {
    pub provider: Provider,
    pub entity_type: EntityType,
    /// Attribute naming the entity.
    pub id_attribute: String,
    /// Attribute naming the owning cluster.
    pub cluster_attribute: String,
    /// Facet attribute names, in FACET order.
    pub facet_attributes: Vec<String>,
}

impl RowLayout {
    /// Layout of the rows produced by `model`'s outermost level.
    pub fn for_query(provider: Provider, entity_type: EntityType, model: &QueryModel) -> Self {
        let id_attribute = entity(provider, entity_type)
            .map(|schema| schema.id.key())
            .unwrap_or("entityName")
            .to_string();
        Self {
            provider,
            entity_type,
            id_attribute,
            cluster_attribute: cluster_dimension(provider).key().to_string(),
            facet_attributes: model.group_by.iter().map(facet_name).collect(),
        }
    }
}

fn facet_name(expr: &Expr) -> String {
    match expr {
        Expr::Attribute(name) => name.clone(),
        Expr::Either { primary, .. } => primary.clone(),
        other => other.to_tokens().serialize(),
    }
}

/// Parse one result row.
pub fn parse_row(row: &Value, layout: &RowLayout) -> Result<RawEntityRow, MalformedRow> {
    let object = row.as_object().ok_or(MalformedRow::NotAnObject)?;

    let mut tags = facet_tags(object, &layout.facet_attributes);
    for (name, value) in object {
        if name == "facet" || tags.contains_key(name) {
            continue;
        }
        if let Some(text) = scalar_text(value).filter(|_| !value.is_number()) {
            tags.insert(name.clone(), text);
        }
    }

    let entity_id = tags
        .get(&layout.id_attribute)
        .cloned()
        .or_else(|| object.get("facet").and_then(Value::as_str).map(str::to_string))
        .or_else(|| tags.get("entityName").cloned())
        .filter(|id| !id.is_empty())
        .ok_or(MalformedRow::MissingEntityId)?;

    if let Some(cluster) = tags.get(&layout.cluster_attribute).cloned() {
        tags.entry(fields::CLUSTER_TAG.to_string()).or_insert(cluster);
    } else if layout.entity_type == EntityType::Cluster {
        tags.entry(fields::CLUSTER_TAG.to_string())
            .or_insert_with(|| entity_id.clone());
    }

    let mut values = BTreeMap::new();
    for field in fields::NUMERIC {
        let value = match object.get(*field) {
            None => continue,
            Some(Value::Null) => None,
            Some(Value::Number(n)) => n.as_f64(),
            Some(_) => {
                return Err(MalformedRow::NonNumeric {
                    entity_id,
                    field: field.to_string(),
                })
            }
        };
        values.insert(field.to_string(), value);
    }

    Ok(RawEntityRow {
        provider: layout.provider,
        entity_type: layout.entity_type,
        entity_id,
        values,
        tags,
    })
}

/// Facet values keyed by attribute name.
fn facet_tags(object: &Map<String, Value>, attributes: &[String]) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    match object.get("facet") {
        Some(Value::Array(values)) => {
            for (name, value) in attributes.iter().zip(values) {
                if let Some(text) = scalar_text(value) {
                    tags.insert(name.clone(), text);
                }
            }
        }
        Some(value) => {
            if let (Some(name), Some(text)) = (attributes.first(), scalar_text(value)) {
                tags.insert(name.clone(), text);
            }
        }
        None => {}
    }
    for name in attributes {
        if let Some(text) = object.get(name).and_then(scalar_text) {
            tags.entry(name.clone()).or_insert(text);
        }
    }
    tags
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
