use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kafkascope::catalog::{CatalogError, MetricId, ResultShape};
use kafkascope::config::Settings;
use kafkascope::filter::{KindClass, Selections};
use kafkascope::grouping::GroupKey;
use kafkascope::health::HealthStatus;
use kafkascope::pipeline::{
    EntityLookup, EntityRecord, EntitySearch, ExecutionError, Freshness, MetricRequest, Pipeline,
    PipelineError, PipelineOutput, QueryExecutor, QueryResult, RunOutcome,
};
use kafkascope::schema::Provider;
use serde_json::{json, Value};

// =============================================================================
// Mocks
// =============================================================================

type Respond = dyn Fn(u32, &str) -> Result<QueryResult, ExecutionError> + Send + Sync;

/// Executor answering through a closure of (call number, nrql).
struct MockExecutor {
    calls: AtomicU32,
    /// Delay applied to the first call only.
    first_delay: Duration,
    respond: Box<Respond>,
}

impl MockExecutor {
    fn new(
        respond: impl Fn(u32, &str) -> Result<QueryResult, ExecutionError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            calls: AtomicU32::new(0),
            first_delay: Duration::ZERO,
            respond: Box::new(respond),
        }
    }

    fn rows(rows: Vec<Value>) -> Self {
        Self::new(move |_, _| Ok(QueryResult::new(rows.clone())))
    }

    fn slow_first(mut self, delay: Duration) -> Self {
        self.first_delay = delay;
        self
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryExecutor for MockExecutor {
    async fn execute(
        &self,
        nrql: &str,
        _account_id: &str,
        _shape: ResultShape,
    ) -> Result<QueryResult, ExecutionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == 1 && !self.first_delay.is_zero() {
            tokio::time::sleep(self.first_delay).await;
        }
        (self.respond)(call, nrql)
    }
}

struct MockLookup {
    searches: AtomicU32,
}

fn record(name: &str, entity_type: &str, cluster: Option<&str>) -> EntityRecord {
    let mut tags = BTreeMap::new();
    if let Some(cluster) = cluster {
        tags.insert("aws.kafka.ClusterName".to_string(), vec![cluster.to_string()]);
    }
    EntityRecord {
        guid: format!("guid-{}", name),
        name: name.to_string(),
        entity_type: entity_type.to_string(),
        tags,
    }
}

#[async_trait]
impl EntityLookup for MockLookup {
    async fn search(
        &self,
        search: &EntitySearch,
        _account_id: &str,
    ) -> Result<Vec<EntityRecord>, ExecutionError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        Ok(match search.entity_type.as_str() {
            "AWSMSKCLUSTER" => vec![
                record("prod", "AWSMSKCLUSTER", None),
                record("dev", "AWSMSKCLUSTER", None),
            ],
            "AWSMSKTOPIC" => vec![
                record("payments", "AWSMSKTOPIC", Some("prod")),
                record("orders", "AWSMSKTOPIC", Some("prod")),
                record("audit", "AWSMSKTOPIC", Some("dev")),
            ],
            _ => Vec::new(),
        })
    }
}

// =============================================================================
// Fixtures
// =============================================================================

fn msk() -> Selections {
    Selections {
        provider: Some(Provider::AwsMsk),
        account_id: Some("123".into()),
        clusters: vec![],
        ..Default::default()
    }
}

fn cluster_row(name: &str, offline: u32) -> Value {
    json!({
        "facet": name,
        "provider.clusterName": name,
        "activeControllers": 1,
        "offlinePartitions": offline,
        "underReplicatedPartitions": 0,
        "partitionCount": 12,
    })
}

fn three_clusters() -> Vec<Value> {
    vec![
        cluster_row("alpha", 0),
        cluster_row("beta", 2),
        cluster_row("gamma", 0),
    ]
}

fn pipeline(executor: Arc<MockExecutor>) -> Pipeline {
    Pipeline::new(executor, Settings::default())
}

fn completed(outcome: RunOutcome) -> PipelineOutput {
    match outcome {
        RunOutcome::Completed(output) => output,
        RunOutcome::Superseded { sequence, latest } => {
            panic!("run {} superseded by {}", sequence, latest)
        }
    }
}

// =============================================================================
// Runs
// =============================================================================

#[tokio::test]
async fn test_unhealthy_clusters_end_to_end() {
    let executor = Arc::new(MockExecutor::rows(three_clusters()));
    let pipeline = pipeline(executor.clone());

    let output = completed(
        pipeline
            .run(&msk(), &MetricRequest::new(MetricId::UnhealthyClusters))
            .await,
    );

    assert!(output.is_ok(), "{:?}", output.error);
    assert_eq!(output.freshness, Freshness::Fresh);
    assert_eq!(output.diagnostics.attempts, 1);
    assert_eq!(output.data.summary.total, 3);
    assert_eq!(output.data.summary.unhealthy, 1);
    assert_eq!(output.data.summary.healthy, 2);

    // Critical first within the default status grouping.
    assert_eq!(output.data.groups[0].key, "critical");
    assert_eq!(output.data.groups[0].entities[0].entity_id, "beta");

    // No cluster filter: an empty selection is unset, not "match nothing".
    let nrql = output.nrql.unwrap();
    assert!(!nrql.contains("WHERE"), "{}", nrql);
    assert_eq!(executor.calls(), 1);
}

#[tokio::test]
async fn test_second_run_is_served_from_cache() {
    let executor = Arc::new(MockExecutor::rows(three_clusters()));
    let pipeline = pipeline(executor.clone());
    let request = MetricRequest::new(MetricId::ClusterHealth);

    let first = completed(pipeline.run(&msk(), &request).await);
    let second = completed(pipeline.run(&msk(), &request).await);

    assert_eq!(first.freshness, Freshness::Fresh);
    assert_eq!(second.freshness, Freshness::Cached);
    assert!(second.diagnostics.cache_hit);
    assert_eq!(second.diagnostics.attempts, 0);
    assert_eq!(second.sequence, first.sequence + 1);
    assert_eq!(first.metrics, second.metrics);
    assert_eq!(executor.calls(), 1);

    let stats = pipeline.cache_stats();
    assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
}

#[tokio::test]
async fn test_equivalent_selections_share_cache_entry() {
    let executor = Arc::new(MockExecutor::rows(three_clusters()));
    let pipeline = pipeline(executor.clone());
    let request = MetricRequest::new(MetricId::ClusterHealth);

    let a = Selections {
        clusters: vec!["beta".into(), "alpha".into()],
        ..msk()
    };
    let b = Selections {
        clusters: vec!["alpha".into(), "beta".into(), "alpha".into()],
        ..msk()
    };
    completed(pipeline.run(&a, &request).await);
    let second = completed(pipeline.run(&b, &request).await);

    assert_eq!(second.freshness, Freshness::Cached);
    assert_eq!(executor.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried() {
    let executor = Arc::new(MockExecutor::new(|call, _| {
        if call < 3 {
            Err(ExecutionError::Unavailable("connection reset".into()))
        } else {
            Ok(QueryResult::new(three_clusters()))
        }
    }));
    let pipeline = pipeline(executor.clone());

    let output = completed(
        pipeline
            .run(&msk(), &MetricRequest::new(MetricId::ClusterHealth))
            .await,
    );

    assert!(output.is_ok());
    assert_eq!(output.diagnostics.attempts, 3);
    assert_eq!(output.metrics.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_stale_result_served_when_upstream_fails() {
    let executor = Arc::new(MockExecutor::new(|call, _| {
        if call == 1 {
            Ok(QueryResult::new(three_clusters()))
        } else {
            Err(ExecutionError::Timeout(30))
        }
    }));
    let pipeline = pipeline(executor.clone());
    let request = MetricRequest::new(MetricId::ClusterHealth);

    completed(pipeline.run(&msk(), &request).await);
    tokio::time::advance(Duration::from_secs(61)).await;

    let stale = completed(pipeline.run(&msk(), &request).await);
    assert_eq!(stale.freshness, Freshness::Stale);
    assert_eq!(stale.metrics.len(), 3);
    assert!(matches!(
        stale.error,
        Some(PipelineError::UpstreamExecution { attempts: 3, .. })
    ));

    // The stale payload is handed back once; afterwards the failure surfaces.
    let failed = completed(pipeline.run(&msk(), &request).await);
    assert_eq!(failed.freshness, Freshness::Empty);
    assert!(failed.metrics.is_empty());
    assert!(failed.error.as_ref().is_some_and(PipelineError::is_upstream));
    assert_eq!(executor.calls(), 7);
}

#[tokio::test]
async fn test_rejected_query_is_not_retried() {
    let executor = Arc::new(MockExecutor::new(|_, _| {
        Err(ExecutionError::rejected("NRQL_SYNTAX", "unexpected token"))
    }));
    let pipeline = pipeline(executor.clone());

    let output = completed(
        pipeline
            .run(&msk(), &MetricRequest::new(MetricId::ClusterHealth))
            .await,
    );
    assert!(matches!(
        output.error,
        Some(PipelineError::UpstreamExecution { attempts: 1, .. })
    ));
    assert_eq!(executor.calls(), 1);
}

#[tokio::test]
async fn test_failing_metric_does_not_affect_others() {
    let executor = Arc::new(MockExecutor::rows(vec![json!({
        "facet": "lkc-1",
        "kafka.id": "lkc-1",
        "clusterLoadPercent": 42.0,
        "bytesInPerSec": 10.0,
        "bytesOutPerSec": 20.0,
    })]));
    let pipeline = pipeline(executor);
    let selections = Selections {
        provider: Some(Provider::ConfluentCloud),
        ..msk()
    };

    let outcomes = pipeline
        .run_many(
            &selections,
            &[
                MetricRequest::new(MetricId::BrokerHealth),
                MetricRequest::new(MetricId::ClusterHealth),
            ],
        )
        .await;
    let outputs: Vec<_> = outcomes.into_iter().map(completed).collect();

    assert_eq!(outputs[0].sequence, outputs[1].sequence);
    assert!(matches!(
        outputs[0].error,
        Some(PipelineError::Catalog(CatalogError::TemplateNotFound { .. }))
    ));
    assert!(outputs[0].nrql.is_none());

    assert!(outputs[1].is_ok());
    assert_eq!(outputs[1].metrics.len(), 1);
    assert_eq!(outputs[1].metrics[0].health_status, HealthStatus::Healthy);
}

#[tokio::test]
async fn test_missing_account_is_reported() {
    let executor = Arc::new(MockExecutor::rows(vec![]));
    let pipeline = pipeline(executor.clone());
    let selections = Selections {
        account_id: None,
        ..msk()
    };

    let output = completed(
        pipeline
            .run(&selections, &MetricRequest::new(MetricId::ClusterCount))
            .await,
    );
    assert!(matches!(
        output.error,
        Some(PipelineError::MissingSelection("accountId"))
    ));
    assert_eq!(executor.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_run_is_superseded_by_newer_run() {
    let executor = Arc::new(
        MockExecutor::rows(three_clusters()).slow_first(Duration::from_secs(5)),
    );
    let pipeline = pipeline(executor.clone());
    let request = MetricRequest::new(MetricId::ClusterHealth);
    let selections = msk();

    let (slow, fast) = tokio::join!(pipeline.run(&selections, &request), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        pipeline.run(&selections, &request).await
    });

    assert!(matches!(
        slow,
        RunOutcome::Superseded {
            sequence: 1,
            latest: 2
        }
    ));
    let fast = completed(fast);
    assert_eq!(fast.sequence, 2);
    assert_eq!(fast.metrics.len(), 3);
}

#[tokio::test]
async fn test_status_selection_filters_derived_metrics() {
    let executor = Arc::new(MockExecutor::rows(three_clusters()));
    let pipeline = pipeline(executor);
    let selections = Selections {
        status: Some("unhealthy".into()),
        ..msk()
    };

    let output = completed(
        pipeline
            .run(
                &selections,
                &MetricRequest::new(MetricId::ClusterHealth).grouped_by(GroupKey::Cluster),
            )
            .await,
    );
    let ids: Vec<_> = output.metrics.iter().map(|m| m.entity_id.as_str()).collect();
    assert_eq!(ids, vec!["beta"]);
    assert_eq!(output.data.groups.len(), 1);
    assert_eq!(output.data.groups[0].key, "beta");
    // Status never reaches the query text.
    assert!(!output.nrql.unwrap().contains("unhealthy"));
}

#[tokio::test]
async fn test_malformed_rows_are_counted() {
    let mut rows = three_clusters();
    rows.push(json!({"activeControllers": 1}));
    rows.push(json!(42));
    let executor = Arc::new(MockExecutor::rows(rows));
    let pipeline = pipeline(executor);

    let output = completed(
        pipeline
            .run(&msk(), &MetricRequest::new(MetricId::ClusterHealth))
            .await,
    );
    assert!(output.is_ok());
    assert_eq!(output.metrics.len(), 3);
    assert_eq!(output.diagnostics.skipped_rows, 2);
}

#[tokio::test]
async fn test_single_value_metric_surfaces_its_figure() {
    let executor = Arc::new(MockExecutor::rows(vec![json!({"bytesInPerSec": 1234.5})]));
    let pipeline = pipeline(executor);

    let output = completed(
        pipeline
            .run(&msk(), &MetricRequest::new(MetricId::BytesInPerSec))
            .await,
    );
    assert!(output.is_ok(), "{:?}", output.error);
    assert_eq!(output.values.get("bytesInPerSec"), Some(&1234.5));
    assert_eq!(output.diagnostics.skipped_rows, 0);
    // Unfaceted rows name no entity.
    assert!(output.metrics.is_empty());
    assert!(output.series.is_empty());
}

#[tokio::test]
async fn test_time_series_metric_surfaces_ordered_buckets() {
    let executor = Arc::new(MockExecutor::rows(vec![
        json!({"beginTimeSeconds": 1060, "endTimeSeconds": 1120, "bytesInPerSec": 20.0, "bytesOutPerSec": 40.0}),
        json!({"beginTimeSeconds": 1000, "endTimeSeconds": 1060, "bytesInPerSec": 10.0, "bytesOutPerSec": null}),
    ]));
    let pipeline = pipeline(executor);

    let output = completed(
        pipeline
            .run(&msk(), &MetricRequest::new(MetricId::ThroughputTimeseries))
            .await,
    );
    assert!(output.is_ok(), "{:?}", output.error);
    assert!(output.metrics.is_empty());

    let starts: Vec<_> = output.series.iter().map(|p| p.begin_time_seconds).collect();
    assert_eq!(starts, vec![1000, 1060]);
    assert_eq!(output.series[0].end_time_seconds, 1060);
    assert_eq!(output.series[0].values.get("bytesInPerSec"), Some(&10.0));
    assert!(!output.series[0].values.contains_key("bytesOutPerSec"));
    assert_eq!(output.series[1].values.get("bytesOutPerSec"), Some(&40.0));
}

// =============================================================================
// Filter options
// =============================================================================

fn with_lookup(lookup: Arc<MockLookup>) -> Pipeline {
    Pipeline::new(Arc::new(MockExecutor::rows(vec![])), Settings::default())
        .with_entity_lookup(lookup)
}

#[tokio::test]
async fn test_topic_options_wait_for_cluster_selection() {
    let lookup = Arc::new(MockLookup {
        searches: AtomicU32::new(0),
    });
    let pipeline = with_lookup(lookup.clone());

    let options = pipeline
        .filter_options(KindClass::Topic, &msk())
        .await
        .unwrap();
    assert!(options.is_empty());
    assert_eq!(lookup.searches.load(Ordering::SeqCst), 0);

    let clusters = pipeline
        .filter_options(KindClass::Cluster, &msk())
        .await
        .unwrap();
    let names: Vec<_> = clusters.iter().map(|o| o.value.as_str()).collect();
    assert_eq!(names, vec!["dev", "prod"]);
}

#[tokio::test]
async fn test_topic_options_follow_selected_clusters() {
    let lookup = Arc::new(MockLookup {
        searches: AtomicU32::new(0),
    });
    let pipeline = with_lookup(lookup.clone());
    let selections = Selections {
        clusters: vec!["prod".into()],
        ..msk()
    };

    let topics = pipeline
        .filter_options(KindClass::Topic, &selections)
        .await
        .unwrap();
    let names: Vec<_> = topics.iter().map(|o| o.value.as_str()).collect();
    assert_eq!(names, vec!["orders", "payments"]);

    // Entity searches are cached like topology.
    pipeline
        .filter_options(KindClass::Topic, &selections)
        .await
        .unwrap();
    assert_eq!(lookup.searches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_filter_options_need_a_lookup() {
    let pipeline = pipeline(Arc::new(MockExecutor::rows(vec![])));
    let err = pipeline
        .filter_options(KindClass::Cluster, &msk())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::NoEntityLookup));
}
