//! Unfaceted results: single figures and time series.
//!
//! These rows name no entity, so they bypass health derivation and are
//! read by projection alias instead.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::health::MalformedRow;
use crate::nrql::QueryModel;

pub const BEGIN_TIME: &str = "beginTimeSeconds";
pub const END_TIME: &str = "endTimeSeconds";

/// One bucket of a time series.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPoint {
    pub begin_time_seconds: i64,
    pub end_time_seconds: i64,
    /// Values by projection alias; null buckets are absent.
    pub values: BTreeMap<String, f64>,
}

/// Figures read from unfaceted rows, with the rows that had to be skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueBatch {
    pub values: BTreeMap<String, f64>,
    pub series: Vec<SeriesPoint>,
    pub skipped: usize,
    pub problems: Vec<MalformedRow>,
}

impl ValueBatch {
    fn skip(&mut self, problem: MalformedRow) {
        tracing::warn!(%problem, "skipping malformed row");
        self.skipped += 1;
        self.problems.push(problem);
    }
}

/// Projection aliases of the outermost level, in SELECT order.
pub fn aliases(model: &QueryModel) -> Vec<&str> {
    model
        .projections
        .iter()
        .filter_map(|p| p.alias.as_deref())
        .collect()
}

/// Read a single-value result. Several rows merge; the first value of an
/// alias wins.
pub fn read_single(rows: &[Value], aliases: &[&str]) -> ValueBatch {
    let mut batch = ValueBatch::default();
    for row in rows {
        match read_row(row, aliases) {
            Ok(values) => {
                for (name, value) in values {
                    batch.values.entry(name).or_insert(value);
                }
            }
            Err(problem) => batch.skip(problem),
        }
    }
    batch
}

/// Read a time series, ordered by bucket start.
pub fn read_series(rows: &[Value], aliases: &[&str]) -> ValueBatch {
    let mut batch = ValueBatch::default();
    for row in rows {
        match read_point(row, aliases) {
            Ok(point) => batch.series.push(point),
            Err(problem) => batch.skip(problem),
        }
    }
    batch.series.sort_by_key(|p| p.begin_time_seconds);
    batch
}

fn read_point(row: &Value, aliases: &[&str]) -> Result<SeriesPoint, MalformedRow> {
    let object = row.as_object().ok_or(MalformedRow::NotAnObject)?;
    Ok(SeriesPoint {
        begin_time_seconds: timestamp(object, BEGIN_TIME)?,
        end_time_seconds: timestamp(object, END_TIME)?,
        values: read_row(row, aliases)?,
    })
}

fn timestamp(object: &Map<String, Value>, field: &'static str) -> Result<i64, MalformedRow> {
    object
        .get(field)
        .and_then(Value::as_i64)
        .ok_or(MalformedRow::MissingTimestamp(field))
}

fn read_row(row: &Value, aliases: &[&str]) -> Result<BTreeMap<String, f64>, MalformedRow> {
    let object = row.as_object().ok_or(MalformedRow::NotAnObject)?;
    let mut values = BTreeMap::new();
    for alias in aliases {
        match object.get(*alias) {
            None | Some(Value::Null) => {}
            Some(Value::Number(n)) => {
                if let Some(v) = n.as_f64().filter(|v| v.is_finite()) {
                    values.insert(alias.to_string(), v);
                }
            }
            Some(_) => {
                return Err(MalformedRow::NonNumericValue {
                    field: alias.to_string(),
                })
            }
        }
    }
    Ok(values)
}
