//! Saved filter preferences.
//!
//! A plain key-value store. Values are opaque strings; callers that keep
//! structured selections use the JSON helpers.
//!
//! # Key Format
//!
//! ```text
//! filters:{dashboard}          -> Selections JSON
//! filters:{dashboard}:{metric} -> Selections JSON
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};

/// Current store schema version. Bump this when the table layout changes.
const STORE_VERSION: i32 = 1;

/// Errors from a preference store.
#[derive(Debug, thiserror::Error)]
pub enum PrefsError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to determine data directory")]
    NoDataDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PrefsResult<T> = Result<T, PrefsError>;

/// External key-value storage for user preferences.
pub trait PreferenceStore: Send + Sync {
    fn load(&self, key: &str) -> PrefsResult<Option<String>>;

    fn save(&self, key: &str, value: &str) -> PrefsResult<()>;

    fn remove(&self, key: &str) -> PrefsResult<bool>;
}

/// Load and decode a JSON value.
pub fn load_json<T: DeserializeOwned>(
    store: &dyn PreferenceStore,
    key: &str,
) -> PrefsResult<Option<T>> {
    match store.load(key)? {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

/// Encode and save a JSON value.
pub fn save_json<T: Serialize>(store: &dyn PreferenceStore, key: &str, value: &T) -> PrefsResult<()> {
    let json = serde_json::to_string(value)?;
    store.save(key, &json)
}

/// Key helpers.
pub mod keys {
    pub fn filters(dashboard: &str) -> String {
        format!("filters:{}", dashboard)
    }

    pub fn metric_filters(dashboard: &str, metric: &str) -> String {
        format!("filters:{}:{}", dashboard, metric)
    }
}

// =============================================================================
// SQLite store
// =============================================================================

/// SQLite-backed preference store.
pub struct SqlitePreferenceStore {
    conn: Mutex<Connection>,
}

impl SqlitePreferenceStore {
    /// Open or create the store at `path`, creating parent directories.
    pub fn open(path: &Path) -> PrefsResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> PrefsResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Default location: `<data_dir>/kafkascope/preferences.db`.
    pub fn default_path() -> PrefsResult<PathBuf> {
        let base = dirs::data_dir().ok_or(PrefsError::NoDataDir)?;
        Ok(base.join("kafkascope").join("preferences.db"))
    }

    fn init(conn: Connection) -> PrefsResult<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS preferences (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;

        let stored_version: Option<i32> = conn
            .query_row("SELECT value FROM meta WHERE key = 'version'", [], |row| {
                let s: String = row.get(0)?;
                Ok(s.parse().unwrap_or(0))
            })
            .optional()?;

        if stored_version != Some(STORE_VERSION) {
            if stored_version.is_some() {
                tracing::info!(
                    from = ?stored_version,
                    to = STORE_VERSION,
                    "preference store version changed, clearing"
                );
                conn.execute("DELETE FROM preferences", [])?;
            }
            conn.execute(
                "INSERT OR REPLACE INTO meta (key, value) VALUES ('version', ?)",
                params![STORE_VERSION.to_string()],
            )?;
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> PrefsResult<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT key FROM preferences ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(keys)
    }
}

impl PreferenceStore for SqlitePreferenceStore {
    fn load(&self, key: &str) -> PrefsResult<Option<String>> {
        let value = self
            .conn
            .lock()
            .query_row(
                "SELECT value FROM preferences WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn save(&self, key: &str, value: &str) -> PrefsResult<()> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO preferences (key, value, updated_at) VALUES (?, ?, ?)",
            params![key, value, now],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> PrefsResult<bool> {
        let rows = self
            .conn
            .lock()
            .execute("DELETE FROM preferences WHERE key = ?", params![key])?;
        Ok(rows > 0)
    }
}

// =============================================================================
// In-memory store
// =============================================================================

/// Process-local store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn load(&self, key: &str) -> PrefsResult<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> PrefsResult<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> PrefsResult<bool> {
        Ok(self.values.lock().remove(key).is_some())
    }
}
