//! Snapshot file format and content digest

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// One persisted payload revision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// When the snapshot was written
    pub timestamp: DateTime<Utc>,

    /// Opaque payload
    pub value: Value,

    /// Hex SHA-256 of the canonical encoding of `value`
    pub hash: String,

    /// Free-form metadata supplied by the writer
    #[serde(default)]
    pub metadata: Value,

    /// Data category (e.g. `languages`)
    pub category: String,

    /// Repository owner
    pub owner: String,

    /// Repository name, `None` for owner-wide data
    pub repo: Option<String>,

    /// Week or version key
    pub week: String,
}

impl Snapshot {
    /// Build a snapshot, computing the digest of `value`
    pub fn new(
        category: &str,
        owner: &str,
        repo: Option<&str>,
        week: &str,
        value: Value,
        metadata: Option<Value>,
    ) -> Self {
        let hash = content_hash(&value);
        Self {
            timestamp: Utc::now(),
            value,
            hash,
            metadata: metadata.unwrap_or_else(|| Value::Object(Default::default())),
            category: category.to_string(),
            owner: owner.to_string(),
            repo: repo.map(str::to_string),
            week: week.to_string(),
        }
    }

    /// Whether the stored hash matches the stored value
    pub fn verify(&self) -> bool {
        content_hash(&self.value) == self.hash
    }
}

/// Hex SHA-256 over the canonical encoding of a JSON value.
///
/// Object keys are emitted in sorted order with no whitespace, so two values
/// that differ only in key order hash the same.
pub fn content_hash(value: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(value, &mut canonical);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
