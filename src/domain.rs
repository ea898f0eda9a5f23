use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{MigrationError, Result};

/// A document as read from the source store. Read-only for the whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Stable per-document identifier exposed by the source adapter
    pub id: String,
    /// Arbitrary key-value payload; no two documents share a guaranteed field set
    pub payload: Map<String, Value>,
}

impl SourceRecord {
    pub fn new(id: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }

    /// Build a record from any JSON value. Non-object values become an empty payload.
    pub fn from_value(id: impl Into<String>, value: Value) -> Self {
        let payload = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::new(id, payload)
    }

    /// Resolve a dotted path such as `location.barrio` against the payload.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.payload.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// The raw form used by the export sidecar: `{id, ...payload}`, payload keys win.
    pub fn to_raw_json(&self) -> Value {
        let mut out = Map::with_capacity(self.payload.len() + 1);
        out.insert("id".to_string(), Value::String(self.id.clone()));
        for (k, v) in &self.payload {
            out.insert(k.clone(), v.clone());
        }
        Value::Object(out)
    }
}

/// Two-letter lowercase partition key attached to every migrated row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Country(String);

impl Country {
    pub fn parse(raw: &str) -> Result<Self> {
        let valid = raw.len() == 2 && raw.chars().all(|c| c.is_ascii_lowercase());
        if !valid {
            return Err(MigrationError::config(
                format!("invalid partition key {:?}: expected exactly two lowercase letters", raw),
                "define the partition key (country), e.g. country = \"pe\"",
            ));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical target row produced by the normalizer.
///
/// Absent optional fields are omitted when serialized so the target store's own
/// defaults apply; `active: false` and `rating: 0` are kept as real values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedService {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Value>,
    #[serde(serialize_with = "serialize_rating")]
    pub rating: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neighborhood: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    pub active: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    pub country: String,
}

/// Whole ratings are written as integers so a source `5` exports as `5`, not `5.0`.
fn serialize_rating<S: Serializer>(rating: &f64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    const EXACT_INT: f64 = 9_007_199_254_740_992.0;
    if rating.fract() == 0.0 && rating.abs() < EXACT_INT {
        serializer.serialize_i64(*rating as i64)
    } else {
        serializer.serialize_f64(*rating)
    }
}

/// Identity projection read from the target store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRow {
    pub name: String,
    pub slug: Option<String>,
}

/// Acknowledgment for a single row accepted by the target store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertedRow {
    pub inserted_id: String,
    pub name: String,
}
