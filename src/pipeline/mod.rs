//! One dashboard run, end to end.
//!
//! ```text
//! Selections ─normalize─▶ FilterSpec[] ─transform─▶ Predicate[]
//!                                                      │
//!   Catalog template ──────────────────────────▶ build ─▶ BuiltQuery
//!                                                      │
//!                             QueryCache ◀── key ──────┤
//!                                 │ miss               │
//!                                 ▼                    │
//!                  QueryExecutor (retry, stale) ───────┘
//!                                 │
//!                     derive_batch ─▶ status filter ─▶ group ─▶ PipelineOutput
//! ```
//!
//! Only faceted results name entities. Single-value and time-series results
//! skip derivation and land in [`PipelineOutput::values`] and
//! [`PipelineOutput::series`].
//!
//! Every run is tagged with a sequence number. When a run resolves after a
//! newer one has started, its output is discarded as
//! [`RunOutcome::Superseded`]. The cache lock is only taken in short
//! synchronous sections and never held across an await.

mod error;
mod executor;
mod poll;
mod retry;
mod values;

pub use error::{ExecutionError, PipelineError, PipelineResult};
pub use executor::{
    cluster_tag, option_entity_type, EntityLookup, EntityRecord, EntitySearch, QueryExecutor,
    QueryResult, INFRA_DOMAIN,
};
pub use poll::Poller;
pub use retry::{with_retry, RetryFailure};
pub use values::{read_series, read_single, SeriesPoint, ValueBatch};

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;

use crate::builder::build;
use crate::cache::{CacheKey, CacheStats, Lookup, QueryCache};
use crate::catalog::{Catalog, DataClass, MetricId, ResultShape, Template};
use crate::config::Settings;
use crate::filter::{
    transform, FilterKind, FilterOption, FilterRegistry, FilterWarning, KindClass, Normalized,
    QueryPurpose, Selections,
};
use crate::grouping::{group, GroupKey, GroupedCollection};
use crate::health::{derive_batch, DerivedEntityMetric, HealthStatus, MalformedRow, RowLayout};
use crate::nrql::{Expr, QueryModel, TimeWindow};
use crate::prefs::{keys, load_json, save_json, PreferenceStore};
use crate::schema::{entity, Provider};

// =============================================================================
// Requests and outputs
// =============================================================================

/// One metric to compute within a run.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRequest {
    pub metric: MetricId,
    pub group_by: GroupKey,
    pub purpose: QueryPurpose,
    /// Replaces the template's outermost facet.
    pub facet: Option<Vec<Expr>>,
    /// Falls back to the configured default window.
    pub time_window: Option<TimeWindow>,
}

impl MetricRequest {
    pub fn new(metric: MetricId) -> Self {
        Self {
            metric,
            group_by: GroupKey::Status,
            purpose: QueryPurpose::Aggregation,
            facet: None,
            time_window: None,
        }
    }

    pub fn grouped_by(mut self, key: GroupKey) -> Self {
        self.group_by = key;
        self
    }

    pub fn for_display(mut self, page_size: u64) -> Self {
        self.purpose = QueryPurpose::Display { page_size };
        self
    }

    pub fn faceted_by(mut self, facet: Vec<Expr>) -> Self {
        self.facet = Some(facet);
        self
    }

    pub fn since(mut self, window: TimeWindow) -> Self {
        self.time_window = Some(window);
        self
    }
}

/// Where an output's rows came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    /// Executed during this run.
    Fresh,
    /// Served from an unexpired cache entry.
    Cached,
    /// Upstream failed; an expired cache entry was served instead.
    Stale,
    /// No rows could be obtained.
    Empty,
}

/// Counters and warnings absorbed during a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    pub warnings: Vec<FilterWarning>,
    pub skipped_rows: usize,
    pub malformed: Vec<MalformedRow>,
    /// Upstream attempts, zero on a cache hit.
    pub attempts: u32,
    pub cache_hit: bool,
}

/// Result of one metric within a run. Always produced, even on failure.
#[derive(Debug)]
pub struct PipelineOutput {
    pub sequence: u64,
    pub metric: MetricId,
    pub nrql: Option<String>,
    pub freshness: Freshness,
    pub metrics: Vec<DerivedEntityMetric>,
    pub data: GroupedCollection,
    /// Figures of a single-value metric, by projection alias.
    pub values: BTreeMap<String, f64>,
    /// Buckets of a time-series metric.
    pub series: Vec<SeriesPoint>,
    pub diagnostics: Diagnostics,
    pub error: Option<PipelineError>,
}

impl PipelineOutput {
    fn empty(sequence: u64, metric: MetricId) -> Self {
        Self {
            sequence,
            metric,
            nrql: None,
            freshness: Freshness::Empty,
            metrics: Vec::new(),
            data: GroupedCollection::default(),
            values: BTreeMap::new(),
            series: Vec::new(),
            diagnostics: Diagnostics::default(),
            error: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// What became of a run.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(PipelineOutput),
    /// A newer run started before this one resolved.
    Superseded { sequence: u64, latest: u64 },
}

impl RunOutcome {
    pub fn into_output(self) -> Option<PipelineOutput> {
        match self {
            RunOutcome::Completed(output) => Some(output),
            RunOutcome::Superseded { .. } => None,
        }
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, RunOutcome::Superseded { .. })
    }
}

/// Status selection applied to derived metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    Only(HealthStatus),
    /// Warning or critical.
    Unhealthy,
}

impl StatusFilter {
    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("unhealthy") {
            return Some(StatusFilter::Unhealthy);
        }
        value.parse().ok().map(StatusFilter::Only)
    }

    pub fn matches(self, status: HealthStatus) -> bool {
        match self {
            StatusFilter::Only(wanted) => status == wanted,
            StatusFilter::Unhealthy => status.is_unhealthy(),
        }
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Session-scoped engine: owns its catalog, filter registry and caches.
pub struct Pipeline {
    executor: Arc<dyn QueryExecutor>,
    lookup: Option<Arc<dyn EntityLookup>>,
    catalog: Catalog,
    registry: FilterRegistry,
    cache: Mutex<QueryCache<QueryResult>>,
    searches: Mutex<QueryCache<Vec<EntityRecord>>>,
    settings: Settings,
    sequence: AtomicU64,
}

impl Pipeline {
    pub fn new(executor: Arc<dyn QueryExecutor>, settings: Settings) -> Self {
        Self {
            executor,
            lookup: None,
            catalog: Catalog::standard(),
            registry: FilterRegistry::standard(),
            cache: Mutex::new(QueryCache::from_settings(&settings.cache)),
            searches: Mutex::new(QueryCache::from_settings(&settings.cache)),
            settings,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn with_entity_lookup(mut self, lookup: Arc<dyn EntityLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_registry(mut self, registry: FilterRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn registry(&self) -> &FilterRegistry {
        &self.registry
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().stats()
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
        self.searches.lock().clear();
    }

    /// Sequence number of the newest run.
    pub fn latest_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Mark every in-flight run as superseded.
    pub fn invalidate_runs(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn begin(&self) -> u64 {
        self.invalidate_runs()
    }

    fn settle(&self, output: PipelineOutput) -> RunOutcome {
        let latest = self.latest_sequence();
        if output.sequence == latest {
            RunOutcome::Completed(output)
        } else {
            tracing::debug!(
                sequence = output.sequence,
                latest,
                metric = %output.metric,
                "discarding superseded result"
            );
            RunOutcome::Superseded {
                sequence: output.sequence,
                latest,
            }
        }
    }

    /// Run one metric.
    pub async fn run(&self, selections: &Selections, request: &MetricRequest) -> RunOutcome {
        let sequence = self.begin();
        let output = self.execute(sequence, selections, request).await;
        self.settle(output)
    }

    /// Run several metrics concurrently under one sequence number. A failing
    /// metric does not affect the others.
    pub async fn run_many(
        &self,
        selections: &Selections,
        requests: &[MetricRequest],
    ) -> Vec<RunOutcome> {
        let sequence = self.begin();
        let outputs = join_all(
            requests
                .iter()
                .map(|request| self.execute(sequence, selections, request)),
        )
        .await;
        outputs.into_iter().map(|output| self.settle(output)).collect()
    }

    async fn execute(
        &self,
        sequence: u64,
        selections: &Selections,
        request: &MetricRequest,
    ) -> PipelineOutput {
        let mut output = PipelineOutput::empty(sequence, request.metric);
        if let Err(error) = self.fill(selections, request, &mut output).await {
            tracing::warn!(sequence, metric = %request.metric, %error, "pipeline run failed");
            output.error = Some(error);
        }
        output
    }

    async fn fill(
        &self,
        selections: &Selections,
        request: &MetricRequest,
        output: &mut PipelineOutput,
    ) -> PipelineResult<()> {
        let normalized = self.registry.normalize(&selections.to_raw());
        output.diagnostics.warnings = normalized.warnings.clone();

        let (provider, account) = route(selections)?;
        let template = self.catalog.build_template(provider, request.metric)?;
        let predicates = transform(
            &normalized.specs,
            provider,
            template.entity_type,
            request.purpose,
        )?;
        let window = request
            .time_window
            .unwrap_or_else(|| self.settings.query.default_window());
        let built = build(template, &predicates, request.facet.clone(), Some(window))?;
        output.nrql = Some(built.nrql.clone());

        let key = CacheKey::for_query(&built.model, account, template.shape)
            .map_err(PipelineError::CacheKey)?;

        let stale = match self.cached_result(&key) {
            Lookup::Fresh(result) => {
                tracing::debug!(%key, metric = %request.metric, "cache hit");
                output.freshness = Freshness::Cached;
                output.diagnostics.cache_hit = true;
                self.derive_into(template, &built.model, &result, &normalized, request, output);
                return Ok(());
            }
            Lookup::Expired(payload) => Some(payload),
            Lookup::Missing => None,
        };
        tracing::debug!(%key, metric = %request.metric, "cache miss");

        let shape = template.shape;
        let executed = with_retry(&self.settings.retry, request.metric.as_str(), || {
            self.executor.execute(&built.nrql, account, shape)
        })
        .await;

        let result = match executed {
            Ok((result, attempts)) => {
                output.diagnostics.attempts = attempts;
                output.freshness = Freshness::Fresh;
                self.store_result(key, result.clone(), template.data_class);
                result
            }
            Err(failure) => {
                output.diagnostics.attempts = failure.attempts;
                let error = PipelineError::UpstreamExecution {
                    attempts: failure.attempts,
                    source: failure.error,
                };
                let Some(payload) = stale else {
                    return Err(error);
                };
                tracing::warn!(%key, metric = %request.metric, %error, "serving stale result");
                output.freshness = Freshness::Stale;
                output.error = Some(error);
                payload
            }
        };

        self.derive_into(template, &built.model, &result, &normalized, request, output);
        Ok(())
    }

    fn cached_result(&self, key: &CacheKey) -> Lookup<QueryResult> {
        self.cache.lock().lookup(key)
    }

    fn store_result(&self, key: CacheKey, result: QueryResult, class: DataClass) {
        self.cache.lock().set_for(key, result, class);
    }

    fn derive_into(
        &self,
        template: &Template,
        model: &QueryModel,
        result: &QueryResult,
        normalized: &Normalized,
        request: &MetricRequest,
        output: &mut PipelineOutput,
    ) {
        let read: fn(&[serde_json::Value], &[&str]) -> ValueBatch = match template.shape {
            ResultShape::Single => read_single,
            ResultShape::TimeSeries => read_series,
            ResultShape::Faceted => {
                self.derive_entities(template, model, result, normalized, request, output);
                return;
            }
        };
        let batch = read(&result.rows, &values::aliases(model));
        output.diagnostics.skipped_rows = batch.skipped;
        output.diagnostics.malformed = batch.problems;
        output.values = batch.values;
        output.series = batch.series;
    }

    fn derive_entities(
        &self,
        template: &Template,
        model: &QueryModel,
        result: &QueryResult,
        normalized: &Normalized,
        request: &MetricRequest,
        output: &mut PipelineOutput,
    ) {
        let layout = RowLayout::for_query(template.provider, template.entity_type, model);
        let batch = derive_batch(&result.rows, &layout);
        output.diagnostics.skipped_rows = batch.skipped;
        output.diagnostics.malformed = batch.problems;

        let mut metrics = batch.metrics;
        if let Some(filter) = status_filter(normalized) {
            metrics.retain(|m| filter.matches(m.health_status));
        }
        output.data = group(&metrics, request.group_by);
        output.metrics = metrics;
    }

    // =========================================================================
    // Filter options
    // =========================================================================

    /// Selectable values for a filter kind under the current selections.
    ///
    /// A dependent kind (topics) yields nothing until its prerequisite
    /// (clusters) has a value, and then only children of selected parents.
    pub async fn filter_options(
        &self,
        class: KindClass,
        selections: &Selections,
    ) -> PipelineResult<Vec<FilterOption>> {
        let lookup = self.lookup.as_ref().ok_or(PipelineError::NoEntityLookup)?;
        let (provider, account) = route(selections)?;
        let normalized = self.registry.normalize(&selections.to_raw());

        if let Some(prerequisite) = self.registry.prerequisite(class) {
            let selected = normalized
                .specs
                .iter()
                .any(|spec| spec.kind.class() == prerequisite && !spec.values.is_empty());
            if !selected {
                return Ok(Vec::new());
            }
        }

        let schema = option_entity_type(class)
            .and_then(|entity_type| entity(provider, entity_type))
            .ok_or_else(|| PipelineError::UnsupportedOptions {
                kind: class.as_str().to_string(),
                provider: provider.to_string(),
            })?;
        let search = EntitySearch::for_schema(schema);
        let records = self.search(lookup.as_ref(), &search, account).await?;

        let parent_tag = cluster_tag(provider);
        let mut options: Vec<FilterOption> = records
            .iter()
            .map(|record| {
                let parent = match class {
                    KindClass::Cluster => None,
                    _ => record.tag(parent_tag),
                };
                FilterOption::new(record.name.as_str(), parent)
            })
            .collect();
        options.sort_by(|a, b| a.value.cmp(&b.value).then_with(|| a.parent.cmp(&b.parent)));
        options.dedup();

        Ok(self
            .registry
            .dependent_options(class, &options, &normalized.specs))
    }

    async fn search(
        &self,
        lookup: &dyn EntityLookup,
        search: &EntitySearch,
        account: &str,
    ) -> PipelineResult<Vec<EntityRecord>> {
        let key = CacheKey::for_value("entity-search", &(search, account))
            .map_err(PipelineError::CacheKey)?;
        if let Some(records) = self.cached_search(&key) {
            return Ok(records);
        }

        let (records, _) = with_retry(&self.settings.retry, "entity-search", || {
            lookup.search(search, account)
        })
        .await
        .map_err(|failure| PipelineError::UpstreamExecution {
            attempts: failure.attempts,
            source: failure.error,
        })?;

        self.searches
            .lock()
            .set_for(key, records.clone(), DataClass::Topology);
        Ok(records)
    }

    fn cached_search(&self, key: &CacheKey) -> Option<Vec<EntityRecord>> {
        self.searches.lock().get(key)
    }
}

fn route(selections: &Selections) -> PipelineResult<(Provider, &str)> {
    let provider = selections
        .provider
        .ok_or(PipelineError::MissingSelection("provider"))?;
    let account = selections
        .account_id
        .as_deref()
        .filter(|a| !a.is_empty())
        .ok_or(PipelineError::MissingSelection("accountId"))?;
    Ok((provider, account))
}

fn status_filter(normalized: &Normalized) -> Option<StatusFilter> {
    let value = normalized.values_of(&FilterKind::Status)?.first()?;
    let filter = StatusFilter::parse(value);
    if filter.is_none() {
        tracing::warn!(status = %value, "ignoring unknown status filter");
    }
    filter
}

// =============================================================================
// Saved selections
// =============================================================================

/// Saved selections of a dashboard, or the empty selection.
pub fn load_selections(
    store: &dyn PreferenceStore,
    dashboard: &str,
) -> PipelineResult<Selections> {
    Ok(load_json(store, &keys::filters(dashboard))?.unwrap_or_default())
}

pub fn save_selections(
    store: &dyn PreferenceStore,
    dashboard: &str,
    selections: &Selections,
) -> PipelineResult<()> {
    save_json(store, &keys::filters(dashboard), selections)?;
    Ok(())
}
