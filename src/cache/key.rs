//! Content-hash cache keys.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::catalog::ResultShape;
use crate::nrql::QueryModel;

/// Compute SHA256 hash of a serializable value.
///
/// The value is serialized to JSON before hashing, ensuring deterministic output.
/// Returns a 64-character lowercase hexadecimal string.
pub fn compute_hash<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(value)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Identity of one executed query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

#[derive(Serialize)]
struct KeyMaterial<'a> {
    model: &'a QueryModel,
    account: &'a str,
    shape: ResultShape,
}

impl CacheKey {
    /// Key of a resolved query. The model must already be canonical, which
    /// `builder::build` guarantees.
    pub fn for_query(
        model: &QueryModel,
        account: &str,
        shape: ResultShape,
    ) -> Result<Self, serde_json::Error> {
        compute_hash(&KeyMaterial {
            model,
            account,
            shape,
        })
        .map(CacheKey)
    }

    /// Key of any other cacheable lookup, namespaced to avoid collisions
    /// with query keys.
    pub fn for_value<T: Serialize>(namespace: &str, value: &T) -> Result<Self, serde_json::Error> {
        compute_hash(&(namespace, value)).map(CacheKey)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough for logs.
        f.write_str(&self.0[..self.0.len().min(12)])
    }
}
