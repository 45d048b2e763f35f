//! Provider schema vocabulary.
//!
//! The two telemetry providers describe the same Kafka entities with
//! different event types and attribute names. This module is the single
//! table of those names; templates, filters and the entity lookup all read
//! from it.
//!
//! | provider          | entity  | event type            | id attribute                          |
//! |-------------------|---------|-----------------------|---------------------------------------|
//! | `AWS_MSK`         | cluster | `AwsMskClusterSample` | `provider.clusterName`                |
//! | `AWS_MSK`         | broker  | `AwsMskBrokerSample`  | `provider.brokerId`                   |
//! | `AWS_MSK`         | topic   | `AwsMskTopicSample`   | `provider.topic`                      |
//! | `CONFLUENT_CLOUD` | cluster | `Metric`              | `kafka.id` or `resource.kafka.id`     |
//! | `CONFLUENT_CLOUD` | topic   | `Metric`              | `topic`                               |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::nrql::expr::{attr, either};
use crate::nrql::{EventSource, Expr};

/// Column names shared by catalog projections and row derivation.
pub mod fields {
    pub const ACTIVE_CONTROLLERS: &str = "activeControllers";
    pub const OFFLINE_PARTITIONS: &str = "offlinePartitions";
    pub const UNDER_REPLICATED_PARTITIONS: &str = "underReplicatedPartitions";
    pub const BYTES_IN_PER_SEC: &str = "bytesInPerSec";
    pub const BYTES_OUT_PER_SEC: &str = "bytesOutPerSec";
    pub const MESSAGES_IN_PER_SEC: &str = "messagesInPerSec";
    pub const CLUSTER_LOAD_PERCENT: &str = "clusterLoadPercent";
    pub const HOT_PARTITION_COUNT: &str = "hotPartitionCount";
    pub const PARTITION_COUNT: &str = "partitionCount";
    pub const CLUSTER_COUNT: &str = "clusterCount";
    pub const TOPIC_COUNT: &str = "topicCount";

    /// Every numeric column a derivation may read.
    pub const NUMERIC: &[&str] = &[
        ACTIVE_CONTROLLERS,
        OFFLINE_PARTITIONS,
        UNDER_REPLICATED_PARTITIONS,
        BYTES_IN_PER_SEC,
        BYTES_OUT_PER_SEC,
        MESSAGES_IN_PER_SEC,
        CLUSTER_LOAD_PERCENT,
        HOT_PARTITION_COUNT,
        PARTITION_COUNT,
    ];

    /// String tag carrying the host platform's alert severity.
    pub const ALERT_SEVERITY: &str = "alertSeverity";
    /// String tag carrying the owning cluster of a broker or topic row.
    pub const CLUSTER_TAG: &str = "clusterName";
}

/// A telemetry provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provider {
    /// Sampled/dimensional schema: one sample event per collection interval.
    AwsMsk,
    /// Flat counter-stream schema: `Metric` events.
    ConfluentCloud,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::AwsMsk, Provider::ConfluentCloud];

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::AwsMsk => "AWS_MSK",
            Provider::ConfluentCloud => "CONFLUENT_CLOUD",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "AWS_MSK" | "MSK" => Ok(Provider::AwsMsk),
            "CONFLUENT_CLOUD" | "CONFLUENT" => Ok(Provider::ConfluentCloud),
            _ => Err(format!("unknown provider: {}", s)),
        }
    }
}

/// A monitored Kafka entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Cluster,
    Broker,
    Topic,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Cluster => "cluster",
            EntityType::Broker => "broker",
            EntityType::Topic => "topic",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A semantic dimension and the attribute name(s) that carry it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Single(&'static str),
    /// Current name first, legacy name second.
    Either(&'static str, &'static str),
}

impl Dimension {
    /// The name predicates are tagged with.
    pub fn key(self) -> &'static str {
        match self {
            Dimension::Single(name) | Dimension::Either(name, _) => name,
        }
    }

    pub fn expr(self) -> Expr {
        match self {
            Dimension::Single(name) => attr(name),
            Dimension::Either(primary, fallback) => either(primary, fallback),
        }
    }
}

/// Where one entity type lives in one provider's schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitySchema {
    pub provider: Provider,
    pub entity_type: EntityType,
    pub event_type: &'static str,
    pub id: Dimension,
    pub dimensions: &'static [&'static str],
    /// Entity type name in the entity search vocabulary.
    pub search_type: &'static str,
}

impl EntitySchema {
    pub fn event_source(&self) -> EventSource {
        EventSource::new(self.event_type, self.dimensions)
    }

    pub fn has_dimension(&self, name: &str) -> bool {
        self.dimensions.contains(&name)
    }
}

const MSK_CLUSTER: EntitySchema = EntitySchema {
    provider: Provider::AwsMsk,
    entity_type: EntityType::Cluster,
    event_type: "AwsMskClusterSample",
    id: Dimension::Single("provider.clusterName"),
    dimensions: &[
        "provider.clusterName",
        "provider.awsRegion",
        "entityName",
        "entityGuid",
    ],
    search_type: "AWSMSKCLUSTER",
};

const MSK_BROKER: EntitySchema = EntitySchema {
    provider: Provider::AwsMsk,
    entity_type: EntityType::Broker,
    event_type: "AwsMskBrokerSample",
    id: Dimension::Single("provider.brokerId"),
    dimensions: &[
        "provider.clusterName",
        "provider.brokerId",
        "entityName",
        "entityGuid",
    ],
    search_type: "AWSMSKBROKER",
};

const MSK_TOPIC: EntitySchema = EntitySchema {
    provider: Provider::AwsMsk,
    entity_type: EntityType::Topic,
    event_type: "AwsMskTopicSample",
    id: Dimension::Single("provider.topic"),
    dimensions: &[
        "provider.clusterName",
        "provider.topic",
        "entityName",
        "entityGuid",
    ],
    search_type: "AWSMSKTOPIC",
};

const CONFLUENT_CLUSTER: EntitySchema = EntitySchema {
    provider: Provider::ConfluentCloud,
    entity_type: EntityType::Cluster,
    event_type: "Metric",
    id: Dimension::Either("kafka.id", "resource.kafka.id"),
    dimensions: &["kafka.id", "resource.kafka.id", "topic", "metricName"],
    search_type: "CONFLUENTCLOUDCLUSTER",
};

const CONFLUENT_TOPIC: EntitySchema = EntitySchema {
    provider: Provider::ConfluentCloud,
    entity_type: EntityType::Topic,
    event_type: "Metric",
    id: Dimension::Single("topic"),
    dimensions: &["kafka.id", "resource.kafka.id", "topic", "metricName"],
    search_type: "CONFLUENTCLOUDKAFKATOPIC",
};

static ALL_ENTITIES: [EntitySchema; 5] = [
    MSK_CLUSTER,
    MSK_BROKER,
    MSK_TOPIC,
    CONFLUENT_CLUSTER,
    CONFLUENT_TOPIC,
];

/// Look up where an entity type lives for a provider.
///
/// Returns `None` for combinations the provider does not model
/// (Confluent Cloud is fully managed and exposes no broker entities).
pub fn entity(provider: Provider, entity_type: EntityType) -> Option<&'static EntitySchema> {
    ALL_ENTITIES
        .iter()
        .find(|e| e.provider == provider && e.entity_type == entity_type)
}

/// All entity schemas of a provider.
pub fn entities(provider: Provider) -> impl Iterator<Item = &'static EntitySchema> {
    ALL_ENTITIES.iter().filter(move |e| e.provider == provider)
}

/// The cluster dimension of a provider.
pub fn cluster_dimension(provider: Provider) -> Dimension {
    match provider {
        Provider::AwsMsk => MSK_CLUSTER.id,
        Provider::ConfluentCloud => CONFLUENT_CLUSTER.id,
    }
}

/// The topic dimension of a provider.
pub fn topic_dimension(provider: Provider) -> Dimension {
    match provider {
        Provider::AwsMsk => MSK_TOPIC.id,
        Provider::ConfluentCloud => CONFLUENT_TOPIC.id,
    }
}
