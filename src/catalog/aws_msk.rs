//! AWS MSK templates.
//!
//! Broker-level rates are sampled per broker, so cluster totals are a
//! two-level aggregation: `latest()` per (cluster, broker), then `sum()`.

use super::{DataClass, MetricId, ResultShape, Spec, Template};
use crate::nrql::expr::{attr, average, latest, sum, unique_count};
use crate::nrql::{ExprExt, Limit, Projection, QueryModel};
use crate::schema::{entity, fields, EntitySchema, EntityType, Provider};

const CLUSTER_NAME: &str = "provider.clusterName";
const BROKER_ID: &str = "provider.brokerId";
const TOPIC: &str = "provider.topic";

fn schema(entity_type: EntityType) -> &'static EntitySchema {
    match entity(Provider::AwsMsk, entity_type) {
        Some(schema) => schema,
        None => unreachable!("AWS_MSK models every entity type"),
    }
}

fn cluster_sample() -> QueryModel {
    QueryModel::from_event(schema(EntityType::Cluster).event_source())
}

fn broker_sample() -> QueryModel {
    QueryModel::from_event(schema(EntityType::Broker).event_source())
}

fn topic_sample() -> QueryModel {
    QueryModel::from_event(schema(EntityType::Topic).event_source())
}

/// Per-cluster health inputs, one row per cluster.
fn cluster_health() -> QueryModel {
    cluster_sample()
        .select(vec![
            latest(attr("provider.activeControllerCount.Sum")).alias(fields::ACTIVE_CONTROLLERS),
            latest(attr("provider.offlinePartitionsCount.Sum")).alias(fields::OFFLINE_PARTITIONS),
            latest(attr("provider.underReplicatedPartitions.Sum"))
                .alias(fields::UNDER_REPLICATED_PARTITIONS),
            latest(attr("provider.globalPartitionCount.Average")).alias(fields::PARTITION_COUNT),
        ])
        .facet(vec![attr(CLUSTER_NAME)])
        .limit(Limit::Max)
}

/// `sum` over the latest value of each broker.
fn broker_total(source_attr: &str, alias: &str) -> QueryModel {
    let inner_alias = format!("{}PerBroker", alias);
    let inner = broker_sample()
        .select(vec![latest(attr(source_attr)).alias(&inner_alias)])
        .facet(vec![attr(CLUSTER_NAME), attr(BROKER_ID)])
        .limit(Limit::Max);
    QueryModel::from_query(inner).select(vec![sum(attr(&inner_alias)).alias(alias)])
}

fn throughput_projections(stat: &str) -> Vec<Projection> {
    let column = |name: &str| attr(&format!("provider.{}.{}", name, stat));
    vec![
        average(column("bytesInPerSec")).alias(fields::BYTES_IN_PER_SEC),
        average(column("bytesOutPerSec")).alias(fields::BYTES_OUT_PER_SEC),
        average(column("messagesInPerSec")).alias(fields::MESSAGES_IN_PER_SEC),
    ]
}

pub(super) fn templates() -> Vec<Template> {
    use DataClass::{LiveMetric, Topology};
    use EntityType::{Broker, Cluster, Topic};
    use ResultShape::{Faceted, Single, TimeSeries};

    let spec = |metric, entity_type, shape, data_class, nesting| Spec {
        metric,
        entity_type,
        shape,
        data_class,
        nesting,
    };

    let partitions = {
        let inner = cluster_sample()
            .select(vec![
                latest(attr("provider.globalPartitionCount.Average")).alias("partitionsPerCluster")
            ])
            .facet(vec![attr(CLUSTER_NAME)])
            .limit(Limit::Max);
        QueryModel::from_query(inner)
            .select(vec![sum(attr("partitionsPerCluster")).alias(fields::PARTITION_COUNT)])
    };

    let broker_health = broker_sample()
        .select(vec![
            latest(attr("provider.underReplicatedPartitions.Maximum"))
                .alias(fields::UNDER_REPLICATED_PARTITIONS),
            latest(attr("provider.bytesInPerSec.Average")).alias(fields::BYTES_IN_PER_SEC),
            latest(attr("provider.bytesOutPerSec.Average")).alias(fields::BYTES_OUT_PER_SEC),
            latest(attr("provider.messagesInPerSec.Average")).alias(fields::MESSAGES_IN_PER_SEC),
        ])
        .facet(vec![attr(CLUSTER_NAME), attr(BROKER_ID)])
        .limit(Limit::Max);

    let topic_throughput = topic_sample()
        .select(throughput_projections("Sum"))
        .facet(vec![attr(CLUSTER_NAME), attr(TOPIC)])
        .limit(Limit::Max);

    let timeseries = broker_sample()
        .select(vec![
            sum(attr("provider.bytesInPerSec.Average")).alias(fields::BYTES_IN_PER_SEC),
            sum(attr("provider.bytesOutPerSec.Average")).alias(fields::BYTES_OUT_PER_SEC),
        ])
        .timeseries();

    let entries = vec![
        (
            spec(MetricId::ClusterCount, Cluster, Single, Topology, 1),
            cluster_sample()
                .select(vec![unique_count(attr(CLUSTER_NAME)).alias(fields::CLUSTER_COUNT)]),
        ),
        (
            spec(MetricId::UnhealthyClusters, Cluster, Faceted, LiveMetric, 1),
            cluster_health(),
        ),
        (
            spec(MetricId::ClusterHealth, Cluster, Faceted, LiveMetric, 1),
            cluster_health(),
        ),
        (
            spec(MetricId::BrokerHealth, Broker, Faceted, LiveMetric, 1),
            broker_health,
        ),
        (
            spec(MetricId::TopicCount, Topic, Single, Topology, 1),
            topic_sample().select(vec![unique_count(attr(TOPIC)).alias(fields::TOPIC_COUNT)]),
        ),
        (
            spec(MetricId::PartitionCount, Cluster, Single, Topology, 2),
            partitions,
        ),
        (
            spec(MetricId::BytesInPerSec, Broker, Single, LiveMetric, 2),
            broker_total("provider.bytesInPerSec.Average", fields::BYTES_IN_PER_SEC),
        ),
        (
            spec(MetricId::BytesOutPerSec, Broker, Single, LiveMetric, 2),
            broker_total("provider.bytesOutPerSec.Average", fields::BYTES_OUT_PER_SEC),
        ),
        (
            spec(MetricId::MessagesInPerSec, Broker, Single, LiveMetric, 2),
            broker_total("provider.messagesInPerSec.Average", fields::MESSAGES_IN_PER_SEC),
        ),
        (
            spec(MetricId::TopicThroughput, Topic, Faceted, LiveMetric, 1),
            topic_throughput,
        ),
        (
            spec(MetricId::ThroughputTimeseries, Broker, TimeSeries, LiveMetric, 1),
            timeseries,
        ),
    ];

    entries
        .into_iter()
        .map(|(spec, model)| spec.into_template(Provider::AwsMsk, model))
        .collect()
}
