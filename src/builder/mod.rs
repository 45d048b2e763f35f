//! Query builder.
//!
//! Combines a catalog template with filter predicates, an optional facet
//! override and an optional time window into one executable query.
//!
//! Predicates are placed on the innermost level whose input exposes their
//! dimension, so a cluster filter on a nested broker-total query constrains
//! the raw samples rather than the aggregated rows.

use serde::Serialize;

use crate::catalog::Template;
use crate::nrql::{Expr, ModelError, Predicate, QueryModel, TimeWindow};

/// A query ready for execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuiltQuery {
    pub model: QueryModel,
    pub nrql: String,
}

/// Query build errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BuildError {
    #[error("no query level exposes predicate dimension '{dimension}'")]
    UnresolvedPredicateTarget { dimension: String },

    #[error("facet '{attribute}' is not available at the outermost query level")]
    UnresolvedFacetTarget { attribute: String },

    #[error("invalid query model: {0}")]
    InvalidModel(#[from] ModelError),
}

pub type BuildResult<T> = Result<T, BuildError>;

/// Build a query from a template.
pub fn build(
    template: &Template,
    predicates: &[Predicate],
    facet: Option<Vec<Expr>>,
    time_window: Option<TimeWindow>,
) -> BuildResult<BuiltQuery> {
    let mut model = template.model.clone();

    for predicate in predicates {
        splice(&mut model, predicate.clone())?;
    }

    if let Some(facet) = facet {
        let available = model.input_dimensions();
        for expr in &facet {
            for attribute in expr.attributes() {
                if !available.iter().any(|a| a == attribute) {
                    return Err(BuildError::UnresolvedFacetTarget {
                        attribute: attribute.to_string(),
                    });
                }
            }
        }
        model.group_by = facet;
    }

    if time_window.is_some() {
        model.time_window = time_window;
    }

    model.canonicalize();
    model.validate()?;

    let nrql = model.to_nrql();
    tracing::debug!(
        provider = %template.provider,
        metric = %template.metric,
        depth = model.depth(),
        %nrql,
        "built query"
    );
    Ok(BuiltQuery { model, nrql })
}

/// Add `predicate` to the innermost level that can evaluate it.
fn splice(model: &mut QueryModel, predicate: Predicate) -> BuildResult<()> {
    if let Some(inner) = model.inner_mut() {
        if owns_dimension(inner, &predicate.dimension) {
            return splice(inner, predicate);
        }
    }
    if model
        .input_dimensions()
        .iter()
        .any(|d| *d == predicate.dimension)
    {
        model.predicates.push(predicate);
        return Ok(());
    }
    Err(BuildError::UnresolvedPredicateTarget {
        dimension: predicate.dimension,
    })
}

/// Whether `dimension` is visible at `level` or any level below it.
fn owns_dimension(level: &QueryModel, dimension: &str) -> bool {
    level.input_dimensions().iter().any(|d| d == dimension)
        || level
            .inner()
            .is_some_and(|inner| owns_dimension(inner, dimension))
}
