use kafkascope::grouping::{group, GroupKey, UNASSIGNED};
use kafkascope::health::{
    derive_batch, derive_health, figures, AlertSeverity, DerivedEntityMetric, HealthStatus,
    RawEntityRow, RowLayout,
};
use kafkascope::nrql::expr::attr;
use kafkascope::nrql::{EventSource, ExprExt, QueryModel};
use kafkascope::schema::{fields, EntityType, Provider};
use serde_json::json;

fn msk_cluster(id: &str) -> RawEntityRow {
    RawEntityRow::new(Provider::AwsMsk, EntityType::Cluster, id)
        .with_tag(fields::CLUSTER_TAG, id)
}

fn confluent_cluster(id: &str) -> RawEntityRow {
    RawEntityRow::new(Provider::ConfluentCloud, EntityType::Cluster, id)
        .with_tag(fields::CLUSTER_TAG, id)
}

fn healthy_msk(id: &str) -> RawEntityRow {
    msk_cluster(id)
        .with_value(fields::ACTIVE_CONTROLLERS, 1.0)
        .with_value(fields::OFFLINE_PARTITIONS, 0.0)
        .with_value(fields::UNDER_REPLICATED_PARTITIONS, 0.0)
}

#[test]
fn test_controller_count_other_than_one_is_critical() {
    for controllers in [0.0, 2.0] {
        let derived = derive_health(
            &healthy_msk("c1").with_value(fields::ACTIVE_CONTROLLERS, controllers),
        );
        assert_eq!(derived.health_status, HealthStatus::Critical);
        assert_eq!(derived.health_score, 0);
        assert_eq!(derived.alert_severity, AlertSeverity::Critical);
    }
}

#[test]
fn test_rules_apply_in_priority_order() {
    // Offline partitions outrank under-replication.
    let derived = derive_health(
        &healthy_msk("c1")
            .with_value(fields::OFFLINE_PARTITIONS, 1.0)
            .with_value(fields::UNDER_REPLICATED_PARTITIONS, 4.0),
    );
    assert_eq!((derived.health_score, derived.health_status), (25, HealthStatus::Critical));

    // A bad controller count outranks both.
    let derived = derive_health(
        &healthy_msk("c1")
            .with_value(fields::ACTIVE_CONTROLLERS, 0.0)
            .with_value(fields::OFFLINE_PARTITIONS, 1.0),
    );
    assert_eq!(derived.health_score, 0);
}

#[test]
fn test_under_replication_deducts_per_partition() {
    let three =
        derive_health(&healthy_msk("c1").with_value(fields::UNDER_REPLICATED_PARTITIONS, 3.0));
    assert_eq!((three.health_score, three.health_status), (70, HealthStatus::Warning));

    let many =
        derive_health(&healthy_msk("c1").with_value(fields::UNDER_REPLICATED_PARTITIONS, 40.0));
    assert_eq!((many.health_score, many.health_status), (0, HealthStatus::Warning));
}

#[test]
fn test_all_inputs_missing_is_neutral_unknown() {
    let msk = derive_health(
        &msk_cluster("c1")
            .with_null(fields::ACTIVE_CONTROLLERS)
            .with_null(fields::OFFLINE_PARTITIONS),
    );
    assert_eq!((msk.health_score, msk.health_status), (50, HealthStatus::Unknown));
    assert_eq!(msk.alert_severity, AlertSeverity::NotConfigured);

    let confluent = derive_health(&confluent_cluster("lkc-1"));
    assert_eq!((confluent.health_score, confluent.health_status), (50, HealthStatus::Unknown));
}

#[test]
fn test_confluent_load_thresholds() {
    let cases = [
        (95.0, 0.0, 25, HealthStatus::Critical),
        (80.0, 0.0, 60, HealthStatus::Warning),
        (40.0, 2.0, 60, HealthStatus::Warning),
        (40.0, 0.0, 100, HealthStatus::Healthy),
        // Boundaries are exclusive.
        (90.0, 0.0, 60, HealthStatus::Warning),
        (70.0, 0.0, 100, HealthStatus::Healthy),
    ];
    for (load, hot, score, status) in cases {
        let derived = derive_health(
            &confluent_cluster("lkc-1")
                .with_value(fields::CLUSTER_LOAD_PERCENT, load)
                .with_value(fields::HOT_PARTITION_COUNT, hot)
                .with_value(fields::BYTES_IN_PER_SEC, 10.0),
        );
        assert_eq!((derived.health_score, derived.health_status), (score, status), "load {load}");
        assert_eq!(derived.figure(figures::UTILIZATION), Some(load));
    }
}

#[test]
fn test_idle_confluent_cluster_is_unknown() {
    let derived = derive_health(
        &confluent_cluster("lkc-1")
            .with_value(fields::CLUSTER_LOAD_PERCENT, 10.0)
            .with_value(fields::BYTES_IN_PER_SEC, 0.0)
            .with_value(fields::BYTES_OUT_PER_SEC, 0.0),
    );
    assert_eq!(derived.health_status, HealthStatus::Unknown);
    assert_eq!(derived.figure(figures::THROUGHPUT), Some(0.0));
    assert_eq!(derived.figure(figures::FAN_OUT_RATIO), None);
}

#[test]
fn test_alert_severity_tag_overrides_status() {
    let derived = derive_health(&healthy_msk("c1").with_tag(fields::ALERT_SEVERITY, "high"));
    assert_eq!(derived.health_status, HealthStatus::Healthy);
    assert_eq!(derived.alert_severity, AlertSeverity::High);

    let garbage = derive_health(&healthy_msk("c1").with_tag(fields::ALERT_SEVERITY, "loud"));
    assert_eq!(garbage.alert_severity, AlertSeverity::NotAlerting);
}

#[test]
fn test_throughput_figures() {
    let derived = derive_health(
        &healthy_msk("c1")
            .with_value(fields::BYTES_IN_PER_SEC, 100.0)
            .with_value(fields::BYTES_OUT_PER_SEC, 250.0),
    );
    assert_eq!(derived.figure(figures::THROUGHPUT), Some(350.0));
    assert_eq!(derived.figure(figures::FAN_OUT_RATIO), Some(2.5));
}

fn cluster_layout() -> RowLayout {
    let model = QueryModel::from_event(EventSource::new(
        "AwsMskClusterSample",
        &["provider.clusterName"],
    ))
    .select(vec![attr("provider.activeControllerCount.Sum").alias(fields::ACTIVE_CONTROLLERS)])
    .facet(vec![attr("provider.clusterName")]);
    RowLayout::for_query(Provider::AwsMsk, EntityType::Cluster, &model)
}

#[test]
fn test_batch_skips_and_counts_malformed_rows() {
    let rows = vec![
        json!({"facet": "prod", "activeControllers": 1, "offlinePartitions": 0}),
        json!({"facet": "dev", "activeControllers": "one"}),
        json!("not a row"),
        json!({"activeControllers": 1}),
        json!({"facet": "stage", "activeControllers": null, "offlinePartitions": 3}),
    ];
    let batch = derive_batch(&rows, &cluster_layout());

    assert_eq!(batch.skipped, 3);
    assert_eq!(batch.problems.len(), 3);
    let ids: Vec<_> = batch.metrics.iter().map(|m| m.entity_id.as_str()).collect();
    assert_eq!(ids, vec!["prod", "stage"]);
    assert_eq!(batch.metrics[0].cluster(), Some("prod"));
    assert_eq!(batch.metrics[1].health_status, HealthStatus::Critical);
}

fn metrics() -> Vec<DerivedEntityMetric> {
    vec![
        derive_health(&healthy_msk("b")),
        derive_health(&healthy_msk("a")),
        derive_health(&healthy_msk("z").with_value(fields::OFFLINE_PARTITIONS, 2.0)),
        derive_health(&healthy_msk("m").with_value(fields::UNDER_REPLICATED_PARTITIONS, 1.0)),
        derive_health(&RawEntityRow::new(Provider::AwsMsk, EntityType::Broker, "1")),
    ]
}

#[test]
fn test_groups_are_ordered_by_severity() {
    let grouped = group(&metrics(), GroupKey::Status);
    let keys: Vec<_> = grouped.groups.iter().map(|g| g.key.as_str()).collect();
    // Unknown entities are "not configured", which outranks "not alerting".
    assert_eq!(keys, vec!["critical", "warning", "unknown", "healthy"]);

    let healthy = grouped.group("healthy").unwrap();
    let ids: Vec<_> = healthy.entities.iter().map(|m| m.entity_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);

    assert_eq!(grouped.summary.total, 5);
    assert_eq!(grouped.summary.healthy, 2);
    assert_eq!(grouped.summary.unhealthy, 2);
    assert_eq!(grouped.summary.unknown, 1);
}

#[test]
fn test_grouping_is_deterministic() {
    let mut reversed = metrics();
    reversed.reverse();
    assert_eq!(
        group(&metrics(), GroupKey::Cluster),
        group(&reversed, GroupKey::Cluster)
    );
}

#[test]
fn test_cluster_grouping_labels_untagged_entities() {
    let grouped = group(&metrics(), GroupKey::Cluster);
    let untagged = grouped.group(UNASSIGNED).unwrap();
    assert_eq!(untagged.entities.len(), 1);
    assert_eq!(untagged.entities[0].entity_type, EntityType::Broker);
    // The critical cluster leads.
    assert_eq!(grouped.groups[0].key, "z");
}
