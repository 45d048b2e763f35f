use std::num::NonZeroUsize;
use std::time::Duration;

use kafkascope::builder::build;
use kafkascope::cache::{CacheKey, Lookup, QueryCache, TtlPolicy};
use kafkascope::catalog::{Catalog, DataClass, MetricId};
use kafkascope::config::CacheSettings;
use kafkascope::filter::{
    transform, FilterKind, FilterOperator, FilterRegistry, QueryPurpose, RawSelection,
};
use kafkascope::nrql::TimeWindow;
use kafkascope::schema::Provider;

fn key_for(selections: &[RawSelection], account: &str) -> CacheKey {
    let catalog = Catalog::standard();
    let template = catalog
        .build_template(Provider::AwsMsk, MetricId::ClusterHealth)
        .unwrap();
    let normalized = FilterRegistry::standard().normalize(selections);
    let predicates = transform(
        &normalized.specs,
        Provider::AwsMsk,
        template.entity_type,
        QueryPurpose::Aggregation,
    )
    .unwrap();
    let built = build(template, &predicates, None, Some(TimeWindow::minutes(30))).unwrap();
    CacheKey::for_query(&built.model, account, template.shape).unwrap()
}

fn clusters(values: &[&str]) -> RawSelection {
    RawSelection::new(FilterKind::Cluster, FilterOperator::In, values.iter().copied())
}

#[test]
fn test_equivalent_filter_sets_share_a_key() {
    let a = key_for(&[clusters(&["b", "a"]), clusters(&["a"])], "123");
    let b = key_for(&[clusters(&["a", "b"])], "123");
    assert_eq!(a, b);
}

#[test]
fn test_pattern_order_shares_a_key() {
    let key = |topics: &[&str]| {
        let catalog = Catalog::standard();
        let template = catalog
            .build_template(Provider::AwsMsk, MetricId::TopicThroughput)
            .unwrap();
        let normalized = FilterRegistry::standard().normalize(&[
            clusters(&["prod"]),
            RawSelection::new(FilterKind::Topic, FilterOperator::Contains, topics.iter().copied()),
        ]);
        let predicates = transform(
            &normalized.specs,
            Provider::AwsMsk,
            template.entity_type,
            QueryPurpose::Aggregation,
        )
        .unwrap();
        let built = build(template, &predicates, None, Some(TimeWindow::minutes(30))).unwrap();
        let key = CacheKey::for_query(&built.model, "123", template.shape).unwrap();
        (built.nrql, key)
    };

    let (nrql, a) = key(&["ord", "pay"]);
    let (_, b) = key(&["pay", "ord"]);
    assert_eq!(a, b);
    assert!(
        nrql.contains("provider.topic LIKE '%ord%' OR provider.topic LIKE '%pay%'"),
        "{}",
        nrql
    );
}

#[test]
fn test_key_depends_on_filters_and_account() {
    let base = key_for(&[clusters(&["a"])], "123");
    assert_ne!(base, key_for(&[clusters(&["b"])], "123"));
    assert_ne!(base, key_for(&[clusters(&["a"])], "456"));
    assert_ne!(base, key_for(&[], "123"));
}

#[tokio::test(start_paused = true)]
async fn test_topology_outlives_live_metrics() {
    let mut cache: QueryCache<u32> = QueryCache::from_settings(&CacheSettings::default());
    let topology = CacheKey::for_value("test", &"count").unwrap();
    let live = CacheKey::for_value("test", &"throughput").unwrap();
    cache.set_for(topology.clone(), 3, DataClass::Topology);
    cache.set_for(live.clone(), 7, DataClass::LiveMetric);

    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(cache.lookup(&live), Lookup::Expired(7));
    assert_eq!(cache.lookup(&topology), Lookup::Fresh(3));

    tokio::time::advance(Duration::from_secs(240)).await;
    assert_eq!(cache.lookup(&topology), Lookup::Expired(3));

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.expirations, 2);
    assert_eq!(stats.entries, 0);
}

#[test]
fn test_capacity_bound_counts_evictions() {
    let mut cache: QueryCache<usize> =
        QueryCache::new(NonZeroUsize::new(3).unwrap(), TtlPolicy::default());
    for i in 0..5 {
        let key = CacheKey::for_value("test", &i).unwrap();
        cache.set(key, i, Duration::from_secs(60));
    }

    assert_eq!(cache.len(), 3);
    assert_eq!(cache.stats().evictions, 2);
    assert!(!cache.contains(&CacheKey::for_value("test", &0).unwrap()));
    assert!(cache.contains(&CacheKey::for_value("test", &4).unwrap()));
}

#[test]
fn test_zero_capacity_setting_still_caches() {
    let settings = CacheSettings {
        capacity: 0,
        ..CacheSettings::default()
    };
    let mut cache: QueryCache<&str> = QueryCache::from_settings(&settings);
    let key = CacheKey::for_value("test", &"k").unwrap();
    cache.set_for(key.clone(), "v", DataClass::LiveMetric);
    assert_eq!(cache.get(&key), Some("v"));
}
