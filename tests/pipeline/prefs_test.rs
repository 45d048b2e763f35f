use std::path::PathBuf;

use kafkascope::config::{Settings, SettingsError};
use kafkascope::filter::Selections;
use kafkascope::nrql::TimeWindow;
use kafkascope::pipeline::{load_selections, save_selections};
use kafkascope::prefs::{keys, load_json, PreferenceStore, SqlitePreferenceStore};
use kafkascope::schema::Provider;

fn scratch_db(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("kafkascope-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir.join("nested").join("preferences.db")
}

fn selections() -> Selections {
    Selections {
        provider: Some(Provider::AwsMsk),
        account_id: Some("123".into()),
        clusters: vec!["prod".into(), "dev".into()],
        topics: vec!["orders".into()],
        status: Some("critical".into()),
        search: None,
    }
}

#[test]
fn test_selections_survive_reopen() {
    let path = scratch_db("reopen");

    {
        let store = SqlitePreferenceStore::open(&path).unwrap();
        save_selections(&store, "overview", &selections()).unwrap();
    }

    let store = SqlitePreferenceStore::open(&path).unwrap();
    assert_eq!(load_selections(&store, "overview").unwrap(), selections());
    assert_eq!(load_selections(&store, "other").unwrap(), Selections::default());
    assert_eq!(store.keys().unwrap(), vec![keys::filters("overview")]);

    let _ = std::fs::remove_dir_all(path.parent().unwrap().parent().unwrap());
}

#[test]
fn test_saved_selections_use_wire_names() {
    let store = SqlitePreferenceStore::open_in_memory().unwrap();
    save_selections(&store, "overview", &selections()).unwrap();

    let raw: serde_json::Value = load_json(&store, &keys::filters("overview"))
        .unwrap()
        .unwrap();
    assert_eq!(raw["provider"], "AWS_MSK");
    assert_eq!(raw["accountId"], "123");
    assert_eq!(raw["clusters"][1], "dev");
}

#[test]
fn test_overwrite_and_remove() {
    let store = SqlitePreferenceStore::open_in_memory().unwrap();
    let key = keys::metric_filters("overview", "cluster-health");

    store.save(&key, "{}").unwrap();
    store.save(&key, "{\"clusters\":[\"prod\"]}").unwrap();
    let loaded: Selections = load_json(&store, &key).unwrap().unwrap();
    assert_eq!(loaded.clusters, vec!["prod"]);

    assert!(store.remove(&key).unwrap());
    assert!(!store.remove(&key).unwrap());
    assert_eq!(store.load(&key).unwrap(), None);
}

#[test]
fn test_corrupt_saved_value_is_an_error() {
    let store = SqlitePreferenceStore::open_in_memory().unwrap();
    store.save(&keys::filters("overview"), "not json").unwrap();
    assert!(load_selections(&store, "overview").is_err());
}

// =============================================================================
// Settings
// =============================================================================

#[test]
fn test_settings_from_toml() {
    let settings = Settings::from_toml(
        r#"
        [cache]
        capacity = 64
        metric_ttl_secs = 15

        [retry]
        max_attempts = 5

        [query]
        default_since_minutes = 60
        "#,
    )
    .unwrap();

    assert_eq!(settings.cache.capacity, 64);
    assert_eq!(settings.cache.metric_ttl_secs, 15);
    // Unset values keep their defaults.
    assert_eq!(settings.cache.topology_ttl_secs, 300);
    assert_eq!(settings.retry.max_attempts, 5);
    assert_eq!(settings.retry.initial_backoff_ms, 200);
    assert_eq!(settings.query.default_window(), TimeWindow::minutes(60));
}

#[test]
fn test_empty_settings_are_defaults() {
    assert_eq!(Settings::from_toml("").unwrap(), Settings::default());
}

#[test]
fn test_invalid_settings_are_rejected() {
    let err = Settings::from_toml("[retry]\nmax_attempts = 0\n").unwrap_err();
    assert!(matches!(err, SettingsError::InvalidConfig(_)));

    let err = Settings::from_toml("[cache]\ncapacity = \"lots\"\n").unwrap_err();
    assert!(matches!(err, SettingsError::ParseError(_)));
}

#[test]
fn test_missing_settings_file() {
    let err = Settings::from_file("/nonexistent/kafkascope.toml").unwrap_err();
    assert!(matches!(err, SettingsError::FileNotFound(_)));
}
