use kafkascope::catalog::{Catalog, CatalogError, DataClass, MetricId, ResultShape};
use kafkascope::nrql::Source;
use kafkascope::schema::{EntityType, Provider};

#[test]
fn test_every_template_matches_declared_nesting() {
    let catalog = Catalog::standard();
    assert_eq!(catalog.len(), 21);

    for template in catalog.templates() {
        assert_eq!(
            template.model.depth(),
            template.nesting,
            "{}/{}",
            template.provider,
            template.metric
        );
        assert!(template.model.validate().is_ok());
    }
}

#[test]
fn test_msk_throughput_is_two_level() {
    let catalog = Catalog::standard();
    for metric in [
        MetricId::BytesInPerSec,
        MetricId::BytesOutPerSec,
        MetricId::MessagesInPerSec,
        MetricId::PartitionCount,
    ] {
        let template = catalog.build_template(Provider::AwsMsk, metric).unwrap();
        assert_eq!(template.nesting, 2, "{}", metric);

        let inner = template.model.inner().unwrap();
        assert!(matches!(inner.source, Source::Event(_)));
        assert!(!inner.group_by.is_empty());

        let nrql = template.to_nrql();
        assert!(nrql.contains("FROM (SELECT latest("), "{}", nrql);
        assert!(nrql.contains("LIMIT MAX)"), "{}", nrql);
    }
}

#[test]
fn test_confluent_templates_are_single_level() {
    let catalog = Catalog::standard();
    for template in catalog
        .templates()
        .filter(|t| t.provider == Provider::ConfluentCloud && t.metric != MetricId::PartitionCount)
    {
        assert_eq!(template.nesting, 1, "{}", template.metric);
    }
}

#[test]
fn test_confluent_cluster_facet_accepts_both_names() {
    let catalog = Catalog::standard();
    let template = catalog
        .build_template(Provider::ConfluentCloud, MetricId::ClusterHealth)
        .unwrap();
    let nrql = template.to_nrql();
    assert!(
        nrql.contains("FACET if(kafka.id IS NOT NULL, kafka.id, resource.kafka.id)"),
        "{}",
        nrql
    );
}

#[test]
fn test_confluent_has_no_broker_template() {
    let catalog = Catalog::standard();
    let err = catalog
        .build_template(Provider::ConfluentCloud, MetricId::BrokerHealth)
        .unwrap_err();
    assert_eq!(
        err,
        CatalogError::TemplateNotFound {
            provider: Provider::ConfluentCloud,
            metric: MetricId::BrokerHealth,
        }
    );
    assert!(!catalog
        .metrics(Provider::ConfluentCloud)
        .contains(&MetricId::BrokerHealth));
}

#[test]
fn test_template_metadata() {
    let catalog = Catalog::standard();

    let count = catalog
        .build_template(Provider::AwsMsk, MetricId::ClusterCount)
        .unwrap();
    assert_eq!(count.shape, ResultShape::Single);
    assert_eq!(count.data_class, DataClass::Topology);

    let health = catalog
        .build_template(Provider::AwsMsk, MetricId::UnhealthyClusters)
        .unwrap();
    assert_eq!(health.entity_type, EntityType::Cluster);
    assert_eq!(health.shape, ResultShape::Faceted);
    assert_eq!(health.data_class, DataClass::LiveMetric);

    let series = catalog
        .build_template(Provider::AwsMsk, MetricId::ThroughputTimeseries)
        .unwrap();
    assert_eq!(series.shape, ResultShape::TimeSeries);
    assert!(series.model.time_series);
    assert!(series.to_nrql().ends_with("TIMESERIES AUTO"));
}

#[test]
fn test_empty_catalog_never_defaults() {
    let catalog = Catalog::empty();
    assert!(catalog.is_empty());
    assert!(catalog
        .build_template(Provider::AwsMsk, MetricId::ClusterCount)
        .is_err());
}

#[test]
fn test_metric_id_parsing() {
    assert_eq!("cluster-health".parse::<MetricId>(), Ok(MetricId::ClusterHealth));
    assert_eq!("BYTES_IN_PER_SEC".parse::<MetricId>(), Ok(MetricId::BytesInPerSec));
    assert!("nope".parse::<MetricId>().is_err());
}
