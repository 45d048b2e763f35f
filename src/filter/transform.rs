//! Filter specs to query predicates.
//!
//! A filter on a dimension the listed entity's event does not carry is
//! rewritten as a correlated subquery over the event that does:
//!
//! ```text
//! listing clusters, filter topic IN ('orders'):
//!   provider.clusterName IN (SELECT uniques(provider.clusterName)
//!       FROM AwsMskTopicSample WHERE provider.topic IN ('orders') LIMIT MAX)
//! ```

use serde::{Deserialize, Serialize};

use super::{FilterError, FilterKind, FilterOperator, FilterResult, FilterSpec};
use crate::nrql::expr::{attr, uniques};
use crate::nrql::{Expr, ExprExt, Limit, Literal, Predicate, QueryModel};
use crate::schema::{
    cluster_dimension, entities, entity, topic_dimension, EntitySchema, EntityType, Provider,
};

/// Why the predicates are being built; decides subquery limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryPurpose {
    /// Rows feed an aggregate; subqueries must not truncate.
    Aggregation,
    /// Rows are shown a page at a time.
    Display { page_size: u64 },
}

impl QueryPurpose {
    fn subquery_limit(self) -> Limit {
        match self {
            QueryPurpose::Aggregation => Limit::Max,
            QueryPurpose::Display { page_size } => Limit::Count(page_size),
        }
    }
}

/// Attributes that identify a single entity rather than a relationship.
const ENTITY_LOCAL: &[&str] = &["entityName", "entityGuid"];

/// Resolved target of one filter.
struct Target {
    key: String,
    expr: Expr,
    /// Schema that owns the dimension when the listed one does not.
    owner: Option<&'static EntitySchema>,
}

/// Map filter specs onto predicates for `entity_type` of `provider`.
///
/// Provider, account and status filters select routing or post-derivation
/// behavior and produce no predicate.
pub fn transform(
    specs: &[FilterSpec],
    provider: Provider,
    entity_type: EntityType,
    purpose: QueryPurpose,
) -> FilterResult<Vec<Predicate>> {
    let listed = entity(provider, entity_type).ok_or_else(|| {
        FilterError::UnresolvedPredicateTarget {
            provider,
            dimension: entity_type.as_str().to_string(),
            event_type: "-".to_string(),
        }
    })?;

    let mut predicates = Vec::new();
    for spec in specs {
        let Some(target) = resolve_target(&spec.kind, provider, listed)? else {
            continue;
        };
        let predicate = match target.owner {
            None => Predicate::new(&target.key, condition(&target.expr, spec, false)),
            Some(owner) => correlated(listed, owner, &target, spec, purpose)?,
        };
        predicates.push(predicate);
    }
    Ok(predicates)
}

fn resolve_target(
    kind: &FilterKind,
    provider: Provider,
    listed: &'static EntitySchema,
) -> FilterResult<Option<Target>> {
    let dimension = match kind {
        FilterKind::Provider | FilterKind::Account | FilterKind::Status => return Ok(None),
        FilterKind::Cluster => cluster_dimension(provider),
        FilterKind::Topic => topic_dimension(provider),
        FilterKind::Search => {
            let dimension = if listed.has_dimension("entityName") {
                crate::schema::Dimension::Single("entityName")
            } else {
                listed.id
            };
            return Ok(Some(Target {
                key: dimension.key().to_string(),
                expr: dimension.expr(),
                owner: None,
            }));
        }
        FilterKind::Custom(name) => {
            return custom_target(name, provider, listed).map(Some);
        }
    };

    let key = dimension.key().to_string();
    let owner = if listed.has_dimension(&key) {
        None
    } else {
        let owner_type = match kind {
            FilterKind::Cluster => EntityType::Cluster,
            _ => EntityType::Topic,
        };
        Some(entity(provider, owner_type).ok_or_else(|| unresolved(provider, &key, listed))?)
    };
    Ok(Some(Target {
        key,
        expr: dimension.expr(),
        owner,
    }))
}

fn custom_target(
    name: &str,
    provider: Provider,
    listed: &'static EntitySchema,
) -> FilterResult<Target> {
    let owner = if listed.has_dimension(name) {
        None
    } else {
        let other = entities(provider)
            .find(|schema| schema.has_dimension(name))
            .ok_or_else(|| unresolved(provider, name, listed))?;
        Some(other)
    };
    Ok(Target {
        key: name.to_string(),
        expr: attr(name),
        owner,
    })
}

/// `join IN (SELECT uniques(join) FROM owner WHERE cond LIMIT ..)`.
///
/// Negated filters select the matching entities inside and exclude them
/// outside, so "not on topic X" means "hosts no topic X".
fn correlated(
    listed: &'static EntitySchema,
    owner: &'static EntitySchema,
    target: &Target,
    spec: &FilterSpec,
    purpose: QueryPurpose,
) -> FilterResult<Predicate> {
    let join = join_dimension(listed, owner)
        .ok_or_else(|| unresolved(listed.provider, &target.key, listed))?;

    let negated = spec.operator.is_negated();
    let subquery = QueryModel::from_event(owner.event_source())
        .select(vec![uniques(attr(join))])
        .filter(Predicate::new(
            &target.key,
            condition(&target.expr, spec, negated),
        ))
        .limit(purpose.subquery_limit());

    let expr = Expr::InSubquery {
        expr: Box::new(attr(join)),
        subquery: Box::new(subquery),
        negated,
    };
    Ok(Predicate::new(join, expr))
}

/// A dimension both events carry, the listed entity's id first.
fn join_dimension(listed: &EntitySchema, owner: &EntitySchema) -> Option<&'static str> {
    let id = listed.id.key();
    if owner.has_dimension(id) {
        return Some(id);
    }
    listed
        .dimensions
        .iter()
        .copied()
        .filter(|d| !ENTITY_LOCAL.contains(d))
        .find(|d| owner.has_dimension(d))
}

/// The condition a spec places on `target`. `positive` renders a negated
/// operator as its positive form.
fn condition(target: &Expr, spec: &FilterSpec, positive: bool) -> Expr {
    let literals: Vec<Literal> = spec.values.iter().map(|v| Literal::from(v.as_str())).collect();

    match spec.operator {
        FilterOperator::In => target.clone().in_list(literals),
        FilterOperator::NotIn if positive => target.clone().in_list(literals),
        FilterOperator::NotIn => target.clone().not_in_list(literals),
        FilterOperator::Equals => match (target, spec.values.as_slice()) {
            (Expr::Attribute(_), [single]) => target.clone().eq(single.as_str()),
            _ => target.clone().in_list(literals),
        },
        FilterOperator::Contains => any_of(target, &spec.values, |t, v| {
            t.like(&format!("%{}%", v))
        }),
        FilterOperator::Matches => any_of(target, &spec.values, |t, v| t.rlike(v)),
    }
}

/// OR of one pattern condition per value, in value order so that selection
/// order never changes the query; nothing matches an empty list.
fn any_of(target: &Expr, values: &[String], build: impl Fn(Expr, &str) -> Expr) -> Expr {
    let mut sorted: Vec<&str> = values.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.dedup();
    let mut conditions = sorted.into_iter().map(|v| build(target.clone(), v));
    let Some(first) = conditions.next() else {
        return target.clone().in_list(vec![]);
    };
    conditions.fold(first, |acc, next| acc.or(next))
}

fn unresolved(provider: Provider, dimension: &str, listed: &EntitySchema) -> FilterError {
    FilterError::UnresolvedPredicateTarget {
        provider,
        dimension: dimension.to_string(),
        event_type: listed.event_type.to_string(),
    }
}
