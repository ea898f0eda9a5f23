use async_trait::async_trait;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::app::ports::{SourceStore, StoreError};
use crate::domain::SourceRecord;

/// Source store over document-store dumps on disk.
///
/// A collection `services` is read from `<root>/services.json` or, failing that,
/// `<root>/services.ndjson`. JSON dumps may be an array of documents or an object
/// keyed by document id.
pub struct JsonFileSourceStore {
    root: PathBuf,
}

impl JsonFileSourceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store that serves exactly one file as `collection`, whatever its name.
    pub fn single_file(path: impl AsRef<Path>) -> SingleFileSource {
        SingleFileSource {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn locate(&self, collection: &str) -> Option<PathBuf> {
        ["json", "ndjson"]
            .iter()
            .map(|ext| self.root.join(format!("{}.{}", collection, ext)))
            .find(|p| p.is_file())
    }
}

#[async_trait]
impl SourceStore for JsonFileSourceStore {
    async fn read_all(&self, collection: &str) -> Result<Vec<SourceRecord>, StoreError> {
        let path = self
            .locate(collection)
            .ok_or_else(|| StoreError::SchemaMissing(collection.to_string()))?;
        read_dump(&path)
    }
}

/// Serves one dump file regardless of the collection name requested.
pub struct SingleFileSource {
    path: PathBuf,
}

#[async_trait]
impl SourceStore for SingleFileSource {
    async fn read_all(&self, _collection: &str) -> Result<Vec<SourceRecord>, StoreError> {
        if !self.path.is_file() {
            return Err(StoreError::SchemaMissing(self.path.display().to_string()));
        }
        read_dump(&self.path)
    }
}

fn read_dump(path: &Path) -> Result<Vec<SourceRecord>, StoreError> {
    let text = fs::read_to_string(path)
        .map_err(|e| StoreError::Unavailable(format!("failed to read {}: {}", path.display(), e)))?;

    let is_ndjson = path.extension().and_then(|e| e.to_str()) == Some("ndjson");
    let records = if is_ndjson {
        parse_ndjson(&text)
    } else {
        parse_json(&text)
    }
    .map_err(|e| StoreError::Unavailable(format!("{}: {}", path.display(), e)))?;

    info!(path = %path.display(), records = records.len(), "Read source dump");
    Ok(records)
}

fn parse_json(text: &str) -> Result<Vec<SourceRecord>, String> {
    let value: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
    match value {
        Value::Array(items) => Ok(items
            .into_iter()
            .enumerate()
            .map(|(i, item)| record_with_id(item, None, i))
            .collect()),
        // Object keyed by document id
        Value::Object(map) => Ok(map
            .into_iter()
            .enumerate()
            .map(|(i, (key, item))| record_with_id(item, Some(key), i))
            .collect()),
        other => Err(format!("expected an array or object of documents, found {}", kind(&other))),
    }
}

fn parse_ndjson(text: &str) -> Result<Vec<SourceRecord>, String> {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .enumerate()
        .map(|(i, line)| {
            serde_json::from_str::<Value>(line)
                .map(|item| record_with_id(item, None, i))
                .map_err(|e| format!("line {}: {}", i + 1, e))
        })
        .collect()
}

fn record_with_id(item: Value, key: Option<String>, position: usize) -> SourceRecord {
    let id = key.unwrap_or_else(|| {
        ["id", "_id"]
            .iter()
            .find_map(|k| match item.get(*k) {
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            })
            .unwrap_or_else(|| position.to_string())
    });
    debug!(%id, "Loaded document");
    SourceRecord::from_value(id, item)
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
