//! Confluent Cloud templates.
//!
//! Everything reads `Metric` events. Counters are turned into per-second
//! rates with `rate(sum(..), 1 second)`, and the cluster facet is the
//! either-attribute `kafka.id` / `resource.kafka.id`.

use super::{DataClass, MetricId, ResultShape, Spec, Template};
use crate::nrql::expr::{attr, latest, max, rate, sum, unique_count};
use crate::nrql::{Expr, ExprExt, Limit, Predicate, Projection, QueryModel, TimeUnit};
use crate::schema::{cluster_dimension, entity, fields, EntityType, Provider};

const RECEIVED_BYTES: &str = "confluent_kafka_server_received_bytes";
const SENT_BYTES: &str = "confluent_kafka_server_sent_bytes";
const RECEIVED_RECORDS: &str = "confluent_kafka_server_received_records";
const CLUSTER_LOAD: &str = "confluent_kafka_server_cluster_load_percent";
const HOT_PARTITION_INGRESS: &str = "confluent_kafka_server_hot_partition_ingress";
const PARTITION_COUNT: &str = "confluent_kafka_server_partition_count";

fn metric_events() -> QueryModel {
    let source = match entity(Provider::ConfluentCloud, EntityType::Cluster) {
        Some(schema) => schema.event_source(),
        None => unreachable!("CONFLUENT_CLOUD models clusters"),
    };
    QueryModel::from_event(source).filter(Predicate::new(
        "metricName",
        attr("metricName").like("confluent_kafka_server_%"),
    ))
}

fn topic_events() -> QueryModel {
    metric_events().filter(Predicate::new("topic", attr("topic").is_not_null()))
}

fn cluster() -> Expr {
    cluster_dimension(Provider::ConfluentCloud).expr()
}

fn per_second(counter: &str) -> Expr {
    rate(sum(attr(counter)), TimeUnit::Seconds)
}

fn throughput_projections() -> Vec<Projection> {
    vec![
        per_second(RECEIVED_BYTES).alias(fields::BYTES_IN_PER_SEC),
        per_second(SENT_BYTES).alias(fields::BYTES_OUT_PER_SEC),
        per_second(RECEIVED_RECORDS).alias(fields::MESSAGES_IN_PER_SEC),
    ]
}

/// Per-cluster health inputs. The load metric is a 0..1 fraction.
fn cluster_health() -> QueryModel {
    let mut projections = vec![
        latest(attr(CLUSTER_LOAD))
            .mul(100i64)
            .alias(fields::CLUSTER_LOAD_PERCENT),
        max(attr(HOT_PARTITION_INGRESS)).alias(fields::HOT_PARTITION_COUNT),
        latest(attr(PARTITION_COUNT)).alias(fields::PARTITION_COUNT),
    ];
    projections.extend(throughput_projections());
    metric_events()
        .select(projections)
        .facet(vec![cluster()])
        .limit(Limit::Max)
}

pub(super) fn templates() -> Vec<Template> {
    use DataClass::{LiveMetric, Topology};
    use EntityType::{Cluster, Topic};
    use ResultShape::{Faceted, Single, TimeSeries};

    let spec = |metric, entity_type, shape, data_class, nesting| Spec {
        metric,
        entity_type,
        shape,
        data_class,
        nesting,
    };

    let partitions = {
        let inner = metric_events()
            .select(vec![latest(attr(PARTITION_COUNT)).alias("partitionsPerCluster")])
            .facet(vec![cluster()])
            .limit(Limit::Max);
        QueryModel::from_query(inner)
            .select(vec![sum(attr("partitionsPerCluster")).alias(fields::PARTITION_COUNT)])
    };

    let single_rate = |counter: &str, alias: &str| {
        metric_events().select(vec![per_second(counter).alias(alias)])
    };

    let entries = vec![
        (
            spec(MetricId::ClusterCount, Cluster, Single, Topology, 1),
            metric_events().select(vec![unique_count(cluster()).alias(fields::CLUSTER_COUNT)]),
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
            spec(MetricId::TopicCount, Topic, Single, Topology, 1),
            topic_events().select(vec![unique_count(attr("topic")).alias(fields::TOPIC_COUNT)]),
        ),
        (
            spec(MetricId::PartitionCount, Cluster, Single, Topology, 2),
            partitions,
        ),
        (
            spec(MetricId::BytesInPerSec, Cluster, Single, LiveMetric, 1),
            single_rate(RECEIVED_BYTES, fields::BYTES_IN_PER_SEC),
        ),
        (
            spec(MetricId::BytesOutPerSec, Cluster, Single, LiveMetric, 1),
            single_rate(SENT_BYTES, fields::BYTES_OUT_PER_SEC),
        ),
        (
            spec(MetricId::MessagesInPerSec, Cluster, Single, LiveMetric, 1),
            single_rate(RECEIVED_RECORDS, fields::MESSAGES_IN_PER_SEC),
        ),
        (
            spec(MetricId::TopicThroughput, Topic, Faceted, LiveMetric, 1),
            topic_events()
                .select(throughput_projections())
                .facet(vec![cluster(), attr("topic")])
                .limit(Limit::Max),
        ),
        (
            spec(MetricId::ThroughputTimeseries, Cluster, TimeSeries, LiveMetric, 1),
            metric_events()
                .select(vec![
                    per_second(RECEIVED_BYTES).alias(fields::BYTES_IN_PER_SEC),
                    per_second(SENT_BYTES).alias(fields::BYTES_OUT_PER_SEC),
                ])
                .timeseries(),
        ),
    ];

    entries
        .into_iter()
        .map(|(spec, model)| spec.into_template(Provider::ConfluentCloud, model))
        .collect()
}
