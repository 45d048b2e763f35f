use kafkascope::builder::{build, BuildError};
use kafkascope::catalog::{Catalog, MetricId};
use kafkascope::filter::{transform, FilterRegistry, QueryPurpose, Selections};
use kafkascope::nrql::expr::attr;
use kafkascope::nrql::{ExprExt, Predicate, TimeWindow};
use kafkascope::schema::Provider;

fn build_for(
    provider: Provider,
    metric: MetricId,
    selections: &Selections,
    window: Option<TimeWindow>,
) -> Result<String, BuildError> {
    let catalog = Catalog::standard();
    let template = catalog.build_template(provider, metric).unwrap();
    let normalized = FilterRegistry::standard().normalize(&selections.to_raw());
    let predicates = transform(
        &normalized.specs,
        provider,
        template.entity_type,
        QueryPurpose::Aggregation,
    )
    .unwrap();
    build(template, &predicates, None, window).map(|built| built.nrql)
}

#[test]
fn test_msk_cluster_filter_lands_on_inner_level() {
    let selections = Selections {
        provider: Some(Provider::AwsMsk),
        clusters: vec!["prod".into()],
        ..Default::default()
    };
    let nrql = build_for(
        Provider::AwsMsk,
        MetricId::BytesOutPerSec,
        &selections,
        Some(TimeWindow::hours(1)),
    )
    .unwrap();

    insta::assert_snapshot!(nrql, @"SELECT sum(bytesOutPerSecPerBroker) AS bytesOutPerSec FROM (SELECT latest(provider.bytesOutPerSec.Average) AS bytesOutPerSecPerBroker FROM AwsMskBrokerSample WHERE provider.clusterName IN ('prod') FACET provider.clusterName, provider.brokerId LIMIT MAX) SINCE 1 hour ago");
}

#[test]
fn test_confluent_cluster_filter_uses_either_names() {
    let selections = Selections {
        provider: Some(Provider::ConfluentCloud),
        clusters: vec!["lkc-2".into(), "lkc-1".into()],
        ..Default::default()
    };
    let nrql = build_for(
        Provider::ConfluentCloud,
        MetricId::BytesInPerSec,
        &selections,
        Some(TimeWindow::minutes(30)),
    )
    .unwrap();

    insta::assert_snapshot!(nrql, @"SELECT rate(sum(confluent_kafka_server_received_bytes), 1 second) AS bytesInPerSec FROM Metric WHERE (kafka.id IN ('lkc-1', 'lkc-2') OR resource.kafka.id IN ('lkc-1', 'lkc-2')) AND metricName LIKE 'confluent_kafka_server_%' SINCE 30 minutes ago");
}

#[test]
fn test_value_order_does_not_change_query() {
    let a = Selections {
        provider: Some(Provider::AwsMsk),
        clusters: vec!["b".into(), "a".into()],
        ..Default::default()
    };
    let b = Selections {
        clusters: vec!["a".into(), "b".into()],
        ..a.clone()
    };
    assert_eq!(
        build_for(Provider::AwsMsk, MetricId::ClusterHealth, &a, None).unwrap(),
        build_for(Provider::AwsMsk, MetricId::ClusterHealth, &b, None).unwrap()
    );
}

#[test]
fn test_template_is_not_mutated() {
    let catalog = Catalog::standard();
    let template = catalog
        .build_template(Provider::AwsMsk, MetricId::ClusterHealth)
        .unwrap();
    let before = template.to_nrql();

    let predicate = Predicate::new(
        "provider.clusterName",
        attr("provider.clusterName").eq("prod"),
    );
    let built = build(template, &[predicate], None, Some(TimeWindow::minutes(5))).unwrap();

    assert_ne!(built.nrql, before);
    assert_eq!(template.to_nrql(), before);
}

#[test]
fn test_facet_override_replaces_template_facet() {
    let catalog = Catalog::standard();
    let template = catalog
        .build_template(Provider::AwsMsk, MetricId::ClusterHealth)
        .unwrap();
    let built = build(
        template,
        &[],
        Some(vec![attr("provider.awsRegion")]),
        None,
    )
    .unwrap();
    assert!(built.nrql.contains("FACET provider.awsRegion LIMIT MAX"));
    assert!(!built.nrql.contains("FACET provider.clusterName"));
}

#[test]
fn test_facet_override_must_be_visible() {
    let catalog = Catalog::standard();
    let template = catalog
        .build_template(Provider::AwsMsk, MetricId::BytesInPerSec)
        .unwrap();
    // The outer level of a broker total only sees the inner facets and aliases.
    let err = build(template, &[], Some(vec![attr("provider.awsRegion")]), None).unwrap_err();
    assert!(matches!(
        err,
        BuildError::UnresolvedFacetTarget { attribute } if attribute == "provider.awsRegion"
    ));
    assert!(build(template, &[], Some(vec![attr("provider.clusterName")]), None).is_ok());
}

#[test]
fn test_unknown_dimension_is_an_error_not_an_empty_result() {
    let catalog = Catalog::standard();
    let template = catalog
        .build_template(Provider::AwsMsk, MetricId::ClusterCount)
        .unwrap();
    let predicate = Predicate::new("provider.nope", attr("provider.nope").eq("x"));
    let err = build(template, &[predicate], None, None).unwrap_err();
    assert_eq!(
        err,
        BuildError::UnresolvedPredicateTarget {
            dimension: "provider.nope".into()
        }
    );
}
