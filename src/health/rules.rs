//! The health rule table.
//!
//! One priority-ordered table per provider; the first matching rule decides
//! score and status. Single-entity views and bulk summaries both go through
//! [`assess`], so their counts always agree.
//!
//! AWS_MSK (clusters and brokers):
//!
//! | # | condition                          | score                 | status   |
//! |---|------------------------------------|-----------------------|----------|
//! | 1 | active controllers ≠ 1 (clusters)  | 0                     | critical |
//! | 2 | offline partitions > 0             | 25                    | critical |
//! | 3 | under-replicated partitions > 0    | max(0, 100 − 10 × n)  | warning  |
//! | 4 | otherwise                          | 100                   | healthy  |
//!
//! CONFLUENT_CLOUD:
//!
//! | # | condition                          | score | status   |
//! |---|------------------------------------|-------|----------|
//! | 1 | load > 90 %                        | 25    | critical |
//! | 2 | load > 70 % or hot partitions > 0  | 60    | warning  |
//! | 3 | zero bytes in and out              | 50    | unknown  |
//! | 4 | otherwise                          | 100   | healthy  |
//!
//! A row carrying none of its table's inputs scores 50, unknown.

use super::HealthStatus;
use crate::schema::{fields, EntityType, Provider};

/// Points lost per under-replicated partition.
pub const URP_DEDUCTION: f64 = 10.0;

pub const NEUTRAL_SCORE: u8 = 50;

/// Outcome of the rule table for one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assessment {
    pub score: u8,
    pub status: HealthStatus,
}

impl Assessment {
    const fn new(score: u8, status: HealthStatus) -> Self {
        Self { score, status }
    }

    const UNKNOWN: Assessment = Assessment::new(NEUTRAL_SCORE, HealthStatus::Unknown);
    const HEALTHY: Assessment = Assessment::new(100, HealthStatus::Healthy);
}

/// Run the rule table. `value` returns a metric by field name; missing and
/// null are the same thing here.
pub fn assess(
    provider: Provider,
    entity_type: EntityType,
    value: impl Fn(&str) -> Option<f64>,
) -> Assessment {
    match provider {
        Provider::AwsMsk => match entity_type {
            EntityType::Cluster | EntityType::Broker => assess_msk(entity_type, &value),
            EntityType::Topic => assess_activity(&value),
        },
        Provider::ConfluentCloud => assess_confluent(&value),
    }
}

fn assess_msk(entity_type: EntityType, value: &impl Fn(&str) -> Option<f64>) -> Assessment {
    let controllers = match entity_type {
        EntityType::Cluster => value(fields::ACTIVE_CONTROLLERS),
        _ => None,
    };
    let offline = value(fields::OFFLINE_PARTITIONS);
    let urp = value(fields::UNDER_REPLICATED_PARTITIONS);

    if controllers.is_none() && offline.is_none() && urp.is_none() {
        return Assessment::UNKNOWN;
    }

    if let Some(controllers) = controllers {
        if controllers != 1.0 {
            return Assessment::new(0, HealthStatus::Critical);
        }
    }
    if offline.unwrap_or(0.0) > 0.0 {
        return Assessment::new(25, HealthStatus::Critical);
    }
    let urp = urp.unwrap_or(0.0);
    if urp > 0.0 {
        let score = (100.0 - URP_DEDUCTION * urp).clamp(0.0, 100.0);
        return Assessment::new(score.round() as u8, HealthStatus::Warning);
    }
    Assessment::HEALTHY
}

fn assess_confluent(value: &impl Fn(&str) -> Option<f64>) -> Assessment {
    let load = value(fields::CLUSTER_LOAD_PERCENT);
    let hot = value(fields::HOT_PARTITION_COUNT);
    let bytes_in = value(fields::BYTES_IN_PER_SEC);
    let bytes_out = value(fields::BYTES_OUT_PER_SEC);

    if load.is_none() && hot.is_none() && bytes_in.is_none() && bytes_out.is_none() {
        return Assessment::UNKNOWN;
    }

    let load = load.unwrap_or(0.0);
    if load > 90.0 {
        return Assessment::new(25, HealthStatus::Critical);
    }
    if load > 70.0 || hot.unwrap_or(0.0) > 0.0 {
        return Assessment::new(60, HealthStatus::Warning);
    }
    if is_idle(bytes_in, bytes_out) {
        return Assessment::UNKNOWN;
    }
    Assessment::HEALTHY
}

/// Entities judged on traffic alone.
fn assess_activity(value: &impl Fn(&str) -> Option<f64>) -> Assessment {
    let bytes_in = value(fields::BYTES_IN_PER_SEC);
    let bytes_out = value(fields::BYTES_OUT_PER_SEC);
    if (bytes_in.is_none() && bytes_out.is_none()) || is_idle(bytes_in, bytes_out) {
        return Assessment::UNKNOWN;
    }
    Assessment::HEALTHY
}

/// Throughput was reported and both directions are zero.
fn is_idle(bytes_in: Option<f64>, bytes_out: Option<f64>) -> bool {
    (bytes_in.is_some() || bytes_out.is_some())
        && bytes_in.unwrap_or(0.0) == 0.0
        && bytes_out.unwrap_or(0.0) == 0.0
}
