//! Selection normalization.

use std::collections::HashSet;

use super::{FilterKind, FilterOperator, FilterRegistry, FilterSpec, FilterWarning, RawSelection};

/// Normalized filters plus the warnings collected on the way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Normalized {
    pub specs: Vec<FilterSpec>,
    pub warnings: Vec<FilterWarning>,
}

impl Normalized {
    /// Values of the first spec of `kind`, if one survived.
    pub fn values_of(&self, kind: &FilterKind) -> Option<&[String]> {
        self.specs
            .iter()
            .find(|spec| &spec.kind == kind)
            .map(|spec| spec.values.as_slice())
    }
}

impl FilterRegistry {
    /// Turn raw selections into filter specs.
    ///
    /// - invalid operators and invalid `matches` patterns are dropped with
    ///   a warning
    /// - for exclusive kinds the last value of the last selection wins
    /// - selections with the same kind and operator merge; duplicate
    ///   values are removed
    /// - selections without values are treated as unset
    /// - a dependent kind whose prerequisite has no values keeps an empty
    ///   value list, which matches nothing
    pub fn normalize(&self, raw: &[RawSelection]) -> Normalized {
        let mut warnings = Vec::new();
        let mut specs: Vec<FilterSpec> = Vec::new();

        for selection in raw {
            let class = selection.kind.class();
            if !self.allows(class, selection.operator) {
                tracing::warn!(
                    kind = %selection.kind,
                    operator = %selection.operator,
                    "dropping filter with invalid operator"
                );
                warnings.push(FilterWarning::InvalidFilterOperator {
                    kind: selection.kind.clone(),
                    operator: selection.operator,
                });
                continue;
            }

            let mut values = valid_values(selection, &mut warnings);

            if self.is_exclusive(class) {
                specs.retain(|spec| spec.kind != selection.kind);
                values = values.split_off(values.len().saturating_sub(1));
            }

            match specs
                .iter_mut()
                .find(|spec| spec.kind == selection.kind && spec.operator == selection.operator)
            {
                Some(spec) => spec.values.extend(values),
                None => specs.push(FilterSpec {
                    kind: selection.kind.clone(),
                    operator: selection.operator,
                    values,
                    depends_on: self.prerequisite(class),
                }),
            }
        }

        for spec in &mut specs {
            let mut seen = HashSet::new();
            spec.values.retain(|v| seen.insert(v.clone()));
        }
        specs.retain(|spec| !spec.values.is_empty());

        self.cascade(&mut specs, &mut warnings);

        Normalized { specs, warnings }
    }

    /// Clear dependents of empty prerequisites, prerequisites first so the
    /// collapse propagates down chains.
    fn cascade(&self, specs: &mut [FilterSpec], warnings: &mut Vec<FilterWarning>) {
        for class in self.dependency_order() {
            let Some(prerequisite) = self.prerequisite(class) else {
                continue;
            };
            let satisfied = specs
                .iter()
                .any(|spec| spec.kind.class() == prerequisite && !spec.values.is_empty());
            if satisfied {
                continue;
            }
            for spec in specs.iter_mut().filter(|spec| spec.kind.class() == class) {
                if !spec.values.is_empty() {
                    tracing::debug!(kind = %spec.kind, %prerequisite, "collapsing dependent filter");
                    spec.values.clear();
                    warnings.push(FilterWarning::Collapsed {
                        kind: spec.kind.clone(),
                        prerequisite,
                    });
                }
            }
        }
    }
}

fn valid_values(selection: &RawSelection, warnings: &mut Vec<FilterWarning>) -> Vec<String> {
    let values = selection
        .values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty());

    if selection.operator != FilterOperator::Matches {
        return values.map(str::to_string).collect();
    }

    values
        .filter(|pattern| match regex::Regex::new(pattern) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(pattern = %pattern, error = %e, "dropping invalid pattern");
                warnings.push(FilterWarning::InvalidPattern {
                    pattern: pattern.to_string(),
                    message: e.to_string(),
                });
                false
            }
        })
        .map(str::to_string)
        .collect()
}
