//! Grouping of derived metrics for display.
//!
//! Pure and deterministic: the same input always yields the same groups in
//! the same order. Groups and their members are ordered by severity first,
//! then by their key or entity id.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::health::{AlertSeverity, DerivedEntityMetric, HealthStatus};

/// What to group by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    Status,
    Severity,
    EntityType,
    Provider,
    Cluster,
}

/// Label used for metrics without a cluster tag.
pub const UNASSIGNED: &str = "(none)";

/// One group of entities sharing a key value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub key: String,
    pub entities: Vec<DerivedEntityMetric>,
    pub totals: HealthSummary,
}

/// Counts by health status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub total: usize,
    pub healthy: usize,
    /// Warning plus critical.
    pub unhealthy: usize,
    pub unknown: usize,
}

impl HealthSummary {
    pub fn of<'a>(metrics: impl IntoIterator<Item = &'a DerivedEntityMetric>) -> Self {
        let mut summary = HealthSummary::default();
        for metric in metrics {
            summary.add(metric.health_status);
        }
        summary
    }

    fn add(&mut self, status: HealthStatus) {
        self.total += 1;
        match status {
            HealthStatus::Healthy => self.healthy += 1,
            HealthStatus::Warning | HealthStatus::Critical => self.unhealthy += 1,
            HealthStatus::Unknown => self.unknown += 1,
        }
    }
}

/// Grouped result with an overall summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupedCollection {
    pub groups: Vec<Group>,
    pub summary: HealthSummary,
}

impl GroupedCollection {
    pub fn group(&self, key: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.key == key)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Group `metrics` by `key`.
pub fn group(metrics: &[DerivedEntityMetric], key: GroupKey) -> GroupedCollection {
    let mut buckets: BTreeMap<String, Vec<DerivedEntityMetric>> = BTreeMap::new();
    for metric in metrics {
        buckets
            .entry(key_of(metric, key))
            .or_default()
            .push(metric.clone());
    }

    let mut groups: Vec<Group> = buckets
        .into_iter()
        .map(|(key, mut entities)| {
            entities.sort_by(by_severity_then_id);
            let totals = HealthSummary::of(&entities);
            Group { key, entities, totals }
        })
        .collect();

    // Most severe member decides a group's place; ties fall back to the key.
    groups.sort_by(|a, b| {
        worst(&a.entities)
            .cmp(&worst(&b.entities))
            .then_with(|| a.key.cmp(&b.key))
    });

    GroupedCollection {
        groups,
        summary: HealthSummary::of(metrics),
    }
}

fn key_of(metric: &DerivedEntityMetric, key: GroupKey) -> String {
    match key {
        GroupKey::Status => metric.health_status.to_string(),
        GroupKey::Severity => metric.alert_severity.to_string(),
        GroupKey::EntityType => metric.entity_type.to_string(),
        GroupKey::Provider => metric.provider.to_string(),
        GroupKey::Cluster => metric.cluster().unwrap_or(UNASSIGNED).to_string(),
    }
}

fn by_severity_then_id(a: &DerivedEntityMetric, b: &DerivedEntityMetric) -> Ordering {
    a.alert_severity
        .cmp(&b.alert_severity)
        .then_with(|| a.entity_id.cmp(&b.entity_id))
}

fn worst(entities: &[DerivedEntityMetric]) -> AlertSeverity {
    entities
        .iter()
        .map(|m| m.alert_severity)
        .min()
        .unwrap_or(AlertSeverity::NotAlerting)
}
